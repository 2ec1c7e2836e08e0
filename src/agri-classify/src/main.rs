use std::error::Error;
use std::fs;
use std::path::PathBuf;
use structopt::StructOpt;

use agri_serve::{
    FeatureEncoder, GbdtRegressor, PestClassifier, PestLabels, PesticideTable, SavedModel,
    YieldPredictor,
};
use log::info;
use serde_json::{json, Map, Value};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "agri-classify",
    about = "CLI app to identify crop pests and predict yields from local model artifacts"
)]
enum CmdArgs {
    /// Identify the pest in an image file or URL
    Classify {
        #[structopt(parse(from_os_str), help = "Export directory of the pest SavedModel")]
        export_dir: PathBuf,

        #[structopt(help = "Image path, or an http(s) URL to fetch it from")]
        image: String,

        #[structopt(long, parse(from_os_str), help = "Labels file, one pest per line")]
        labels: Option<PathBuf>,

        #[structopt(long, parse(from_os_str), help = "Pesticide reference CSV")]
        pesticides: Option<PathBuf>,

        #[structopt(long, default_value = "serving_default_input_1")]
        input_op: String,

        #[structopt(long, default_value = "StatefulPartitionedCall")]
        output_op: String,
    },

    /// Predict crop yield for the features in a JSON file
    PredictYield {
        #[structopt(long, parse(from_os_str))]
        model: PathBuf,

        #[structopt(long, parse(from_os_str))]
        scaler: PathBuf,

        #[structopt(long, parse(from_os_str))]
        encoders: PathBuf,

        #[structopt(parse(from_os_str), help = "JSON object of feature values")]
        input: PathBuf,
    },
}

fn is_url(image: &str) -> bool {
    image.starts_with("http://") || image.starts_with("https://")
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let output = match CmdArgs::from_args() {
        CmdArgs::Classify {
            export_dir,
            image,
            labels,
            pesticides,
            input_op,
            output_op,
        } => {
            let labels = match labels {
                Some(path) => PestLabels::from_file(&path)?,
                None => PestLabels::default(),
            };
            let model = SavedModel::load(&export_dir, &input_op, &output_op)?;
            let classifier = PestClassifier::new(Box::new(model), labels);

            let classification = if is_url(&image) {
                classifier.classify_from_url(&image)?
            } else {
                classifier.classify_file(&PathBuf::from(&image))?
            };
            info!("Timings: {:?}", classification.timings);

            let mut output = json!({
                "pestName": &classification.label,
                "confidence": classification.confidence,
                "severity": classification.severity(),
                "timings": classification.timings,
            });
            if let Some(path) = pesticides {
                let table = PesticideTable::load(&path)?;
                output["pesticides"] = json!(table.recommend(&classification.label));
            }
            output
        }
        CmdArgs::PredictYield {
            model,
            scaler,
            encoders,
            input,
        } => {
            let predictor = YieldPredictor::new(
                FeatureEncoder::load(&scaler, &encoders)?,
                Box::new(GbdtRegressor::load(&model)?),
            );

            let features: Map<String, Value> = serde_json::from_str(&fs::read_to_string(&input)?)?;
            let prediction = predictor.predict(&features)?;

            json!({ "prediction": prediction, "unit": agri_serve::yield_model::YIELD_UNIT })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
