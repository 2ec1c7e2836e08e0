use std::fmt;
use std::fs;
use std::path::Path;

use image::DynamicImage;
use log::{debug, info, warn};
use serde::Serialize;
use tensorflow::{Graph, SavedModelBundle, Session, SessionOptions, SessionRunArgs, Tensor};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::labels::{PestLabels, UNKNOWN_PEST};
use crate::preprocess::{self, InputTensor};
use crate::Timer;

/// Anything that maps an image tensor to a probability per pest class.
pub trait PestModel: Send + Sync {
    fn probabilities(&self, input: &InputTensor) -> Result<Vec<f32>>;
}

/// A Keras classifier exported as a TensorFlow SavedModel.
pub struct SavedModel {
    /// TensorFlow model graph
    graph: Graph,

    /// TensorFlow session
    session: Session,

    input_op: String,
    output_op: String,
}

impl SavedModel {
    pub fn load(export_dir: &Path, input_op: &str, output_op: &str) -> Result<Self> {
        let mut t = Timer::start("Loading session");

        let mut graph = Graph::new();
        let session =
            SavedModelBundle::load(&SessionOptions::new(), &["serve"], &mut graph, export_dir)
                .map_err(|status| Error::artifact(export_dir, status))?
                .session;

        // Fail at startup rather than on the first request.
        for op in [input_op, output_op] {
            graph
                .operation_by_name_required(op)
                .map_err(|status| Error::artifact(export_dir, status))?;
        }

        t.stop();

        Ok(SavedModel {
            graph,
            session,
            input_op: input_op.to_owned(),
            output_op: output_op.to_owned(),
        })
    }
}

impl PestModel for SavedModel {
    fn probabilities(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let tensor = Tensor::new(&input.shape).with_values(&input.data)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(
            &self.graph.operation_by_name_required(&self.input_op)?,
            0,
            &tensor,
        );
        let result = args.request_fetch(&self.graph.operation_by_name_required(&self.output_op)?, 0);

        self.session.run(&mut args)?;
        let output: Tensor<f32> = args.fetch(result)?;

        Ok(output.to_vec())
    }
}

/// Coarse urgency bucket derived from the classifier confidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.8 {
            Severity::High
        } else if confidence >= 0.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milliseconds spent in each stage of one classification.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct Timings {
    pub url_fetch: i64,
    pub image_load: i64,
    pub image_resize: i64,
    pub session_run: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Classification {
    /// Pest name, or the unknown sentinel
    pub label: String,

    /// Probability the model assigned to `label`
    pub confidence: f32,

    pub timings: Timings,
}

impl Classification {
    pub fn severity(&self) -> Severity {
        Severity::from_confidence(self.confidence)
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_PEST
    }
}

/// Picks the most probable class. Indices without a label and non-finite
/// scores collapse to the unknown sentinel with zero confidence.
pub fn best_class(probabilities: &[f32], labels: &PestLabels) -> (String, f32) {
    let best = probabilities
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    match best {
        Some((index, &p)) if p.is_finite() => match labels.get(index) {
            Some(label) => (label.to_owned(), p.clamp(0.0, 1.0)),
            None => {
                warn!("Class index {} outside of {} known labels", index, labels.len());
                (UNKNOWN_PEST.to_owned(), 0.0)
            }
        },
        _ => {
            warn!("Model returned no usable probabilities");
            (UNKNOWN_PEST.to_owned(), 0.0)
        }
    }
}

/// Identifies the pest shown in a photograph.
pub struct PestClassifier {
    model: Box<dyn PestModel>,
    labels: PestLabels,
}

impl PestClassifier {
    pub fn new(model: Box<dyn PestModel>, labels: PestLabels) -> Self {
        PestClassifier { model, labels }
    }

    /// Loads the SavedModel and label set named by `config`.
    pub fn load(config: &Config) -> Result<Self> {
        let labels = match &config.labels_path {
            Some(path) => PestLabels::from_file(path)?,
            None => PestLabels::default(),
        };

        let model = SavedModel::load(&config.model_dir, &config.input_op, &config.output_op)?;
        info!(
            "Pest classifier ready ({} classes) from {}",
            labels.len(),
            config.model_dir.display()
        );

        Ok(PestClassifier::new(Box::new(model), labels))
    }

    pub fn run(&self, input: &InputTensor) -> Result<Classification> {
        let mut t = Timer::start("Running session");
        let probabilities = self.model.probabilities(input)?;
        t.stop();

        let (label, confidence) = best_class(&probabilities, &self.labels);
        debug!("Classified as '{}' ({:.4})", label, confidence);

        Ok(Classification {
            label,
            confidence,
            timings: Timings {
                session_run: t.millis(),
                ..Default::default()
            },
        })
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<Classification> {
        let mut t = Timer::start("Resizing image");
        let input = preprocess::image_to_tensor(image);
        t.stop();

        let mut classification = self.run(&input)?;
        classification.timings.image_resize = t.millis();

        Ok(classification)
    }

    pub fn classify_from_raw(&self, data: &[u8]) -> Result<Classification> {
        let mut t = Timer::start("Load image from memory");
        let image = preprocess::decode(data)?;
        t.stop();

        let mut classification = self.classify(&image)?;
        classification.timings.image_load = t.millis();

        Ok(classification)
    }

    pub fn classify_file(&self, path: &Path) -> Result<Classification> {
        let data = fs::read(path)?;
        self.classify_from_raw(&data)
    }

    /// Fetches the image over HTTP first. Blocks the calling thread.
    pub fn classify_from_url(&self, url: &str) -> Result<Classification> {
        let mut t = Timer::start(&format!("Fetching image from {}", url));

        let resp = reqwest::blocking::get(url)?.error_for_status()?;
        let buf = resp.bytes()?;

        t.stop();

        let mut classification = self.classify_from_raw(&buf)?;
        classification.timings.url_fetch = t.millis();

        Ok(classification)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::preprocess::tests::png_bytes;

    /// Returns the same probabilities for every input.
    pub(crate) struct FixedModel(pub Vec<f32>);

    impl PestModel for FixedModel {
        fn probabilities(&self, input: &InputTensor) -> Result<Vec<f32>> {
            assert_eq!(input.shape, [1, 224, 224, 3]);
            Ok(self.0.clone())
        }
    }

    pub(crate) struct FailingModel;

    impl PestModel for FailingModel {
        fn probabilities(&self, _: &InputTensor) -> Result<Vec<f32>> {
            Err(Error::Inference("session exploded".into()))
        }
    }

    fn labels() -> PestLabels {
        PestLabels::new(vec!["aphids".into(), "locust".into(), "thrips".into()])
    }

    #[test]
    fn severity_buckets() {
        assert_eq!(Severity::from_confidence(0.81), Severity::High);
        assert_eq!(Severity::from_confidence(0.8), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.5), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.49), Severity::Low);
        assert_eq!(Severity::from_confidence(0.3), Severity::Low);
        assert_eq!(Severity::High.to_string(), "high");
    }

    #[test]
    fn picks_most_probable_label() {
        let (label, confidence) = best_class(&[0.1, 0.7, 0.2], &labels());
        assert_eq!(label, "locust");
        assert!((confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_index_is_unknown() {
        let (label, confidence) = best_class(&[0.1, 0.1, 0.1, 0.7], &labels());
        assert_eq!(label, UNKNOWN_PEST);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn empty_or_nan_output_is_unknown() {
        assert_eq!(best_class(&[], &labels()).0, UNKNOWN_PEST);
        assert_eq!(best_class(&[f32::NAN], &labels()).0, UNKNOWN_PEST);
    }

    #[test]
    fn classifies_png_bytes() {
        let classifier = PestClassifier::new(Box::new(FixedModel(vec![0.05, 0.05, 0.9])), labels());

        let result = classifier
            .classify_from_raw(&png_bytes(16, 16, [10, 200, 30]))
            .unwrap();

        assert_eq!(result.label, "thrips");
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.severity(), Severity::High);
        assert!(!result.is_unknown());

        let timings = serde_json::to_value(result.timings).unwrap();
        for stage in ["url_fetch", "image_load", "image_resize", "session_run"] {
            assert!(timings[stage].as_i64().unwrap() >= 0, "{}", stage);
        }
        assert_eq!(result.timings.url_fetch, 0);
    }

    #[test]
    fn classifies_decoded_image() {
        let classifier = PestClassifier::new(Box::new(FixedModel(vec![0.6, 0.3, 0.1])), labels());
        let image = preprocess::decode(&png_bytes(300, 200, [1, 2, 3])).unwrap();

        let result = classifier.classify(&image).unwrap();

        assert_eq!(result.label, "aphids");
        assert_eq!(result.severity(), Severity::Medium);
        assert_eq!(result.timings.image_load, 0);
    }

    #[test]
    fn propagates_model_failures() {
        let classifier = PestClassifier::new(Box::new(FailingModel), labels());

        let err = classifier
            .classify_from_raw(&png_bytes(4, 4, [0, 0, 0]))
            .unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }
}
