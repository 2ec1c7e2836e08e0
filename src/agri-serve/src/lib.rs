//! Inference services for agricultural decision support: pest
//! identification from photographs, pesticide lookup, crop yield regression
//! and fertilizer recommendations from a generative text model.
//!
//! Every service is built once at startup from on-disk artifacts and shared
//! read-only afterwards.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

pub mod classifier;
pub mod config;
pub mod error;
pub mod fertilizer;
pub mod gemini;
pub mod labels;
pub mod pesticide;
pub mod preprocess;
pub mod tabular;
pub mod yield_model;

pub use classifier::{Classification, PestClassifier, PestModel, SavedModel, Severity};
pub use config::Config;
pub use error::{Error, Result};
pub use fertilizer::{FertilizerRecommender, FertilizerRequest, Recommendation, TextGenerator};
pub use gemini::GeminiClient;
pub use labels::PestLabels;
pub use pesticide::{PesticideRecord, PesticideTable};
pub use preprocess::InputTensor;
pub use tabular::{FeatureEncoder, LabelEncoder, StandardScaler};
pub use yield_model::{GbdtRegressor, Regressor, YieldPredictor};

/// Measures one pipeline stage and logs how long it took.
pub struct Timer {
    name: String,
    started: Option<DateTime<Utc>>,
    elapsed: Option<Duration>,
}

impl Timer {
    /// Create a timer and start it right away
    pub fn start(name: &str) -> Self {
        debug!("{}: starting", name);

        Timer {
            name: name.to_owned(),
            started: Some(Utc::now()),
            elapsed: None,
        }
    }

    /// Stop the timer, returning the elapsed milliseconds
    pub fn stop(&mut self) -> i64 {
        match self.started.take() {
            None => debug!("{}: not running!", self.name),
            Some(started) => {
                let d = Utc::now() - started;

                self.elapsed = Some(d);
                info!("{} took {} msec", self.name, d.num_milliseconds());
            }
        }

        self.millis()
    }

    /// Elapsed milliseconds of the last completed run, 0 if still running
    pub fn millis(&self) -> i64 {
        self.elapsed.map(|d| d.num_milliseconds()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;

    #[test]
    fn timer_reports_zero_until_stopped() {
        let mut t = Timer::start("test stage");
        assert_eq!(t.millis(), 0);

        let ms = t.stop();
        assert!(ms >= 0);
        assert_eq!(ms, t.millis());

        // A second stop keeps the previous measurement.
        assert_eq!(t.stop(), ms);
    }
}
