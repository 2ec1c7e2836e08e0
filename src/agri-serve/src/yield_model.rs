use std::path::Path;

use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use log::{debug, error, info};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tabular::FeatureEncoder;
use crate::Timer;

/// Unit of every yield estimate.
pub const YIELD_UNIT: &str = "kg per hectare";

/// A fitted single-output regression model.
pub trait Regressor: Send + Sync {
    fn predict(&self, row: &[f64]) -> Result<f64>;
}

/// Gradient-boosted trees saved with `GBDT::save_model`.
pub struct GbdtRegressor {
    model: GBDT,
}

impl GbdtRegressor {
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .to_str()
            .ok_or_else(|| Error::artifact(path, "path is not valid UTF-8"))?;

        let model = GBDT::load_model(name).map_err(|e| Error::artifact(path, e))?;

        Ok(GbdtRegressor { model })
    }
}

impl Regressor for GbdtRegressor {
    fn predict(&self, row: &[f64]) -> Result<f64> {
        let features = row.iter().map(|x| *x as f32).collect();
        let data: DataVec = vec![Data::new_test_data(features, None)];

        self.model
            .predict(&data)
            .first()
            .map(|y| *y as f64)
            .ok_or_else(|| Error::Inference("yield model returned no prediction".into()))
    }
}

/// Encodes, scales and regresses crop features into a yield estimate.
pub struct YieldPredictor {
    encoder: FeatureEncoder,
    model: Box<dyn Regressor>,
}

impl YieldPredictor {
    pub fn new(encoder: FeatureEncoder, model: Box<dyn Regressor>) -> Self {
        YieldPredictor { encoder, model }
    }

    pub fn load(config: &Config) -> Result<Self> {
        let mut t = Timer::start("Loading yield model");

        let encoder = FeatureEncoder::load(&config.yield_scaler, &config.yield_encoders)?;
        let model = GbdtRegressor::load(&config.yield_model)?;

        t.stop();
        info!("Yield model ready from {}", config.yield_model.display());

        Ok(YieldPredictor::new(encoder, Box::new(model)))
    }

    pub fn feature_names(&self) -> &[String] {
        self.encoder.feature_names()
    }

    pub fn predict(&self, input: &Map<String, Value>) -> Result<f64> {
        let result = self
            .encoder
            .transform(input)
            .and_then(|row| self.model.predict(&row))
            .and_then(|y| {
                if y.is_finite() {
                    Ok(y)
                } else {
                    Err(Error::Inference(format!("yield model returned {}", y)))
                }
            });

        match &result {
            Ok(y) => debug!("Predicted yield {:.2} {}", y, YIELD_UNIT),
            Err(e) => error!("Yield prediction failed: {}", e),
        }

        result
    }
}
