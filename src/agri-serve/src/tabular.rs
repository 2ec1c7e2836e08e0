//! Turns a flat JSON object of named crop features into the scaled numeric
//! row expected by the yield model.
//!
//! Both artifacts are exported from the fitted Python preprocessing objects:
//!
//! - the scaler carries `feature_names_in`, `mean` and `scale`; its feature
//!   names fix the canonical column order,
//! - the encoders map a column name to the ordered `classes` of its label
//!   encoder; a value encodes to its index in that list.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Maps the categories of one column to dense integer codes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        LabelEncoder { classes }
    }

    pub fn transform(&self, value: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == value)
    }

    pub fn inverse_transform(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Standardizes features by removing the mean and scaling to unit variance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StandardScaler {
    #[serde(alias = "feature_names_in_")]
    feature_names_in: Vec<String>,
    #[serde(alias = "mean_")]
    mean: Vec<f64>,
    #[serde(alias = "scale_")]
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(feature_names_in: Vec<String>, mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = StandardScaler {
            feature_names_in,
            mean,
            scale,
        };
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> Result<()> {
        let n = self.feature_names_in.len();
        if n == 0 {
            return Err(Error::InvalidInput("scaler has no features".into()));
        }
        if self.mean.len() != n || self.scale.len() != n {
            return Err(Error::InvalidInput(format!(
                "scaler has {} features but {} means and {} scales",
                n,
                self.mean.len(),
                self.scale.len()
            )));
        }
        Ok(())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names_in
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.mean.len() {
            return Err(Error::InvalidInput(format!(
                "expected {} features, got {}",
                self.mean.len(),
                row.len()
            )));
        }

        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // Constant columns are fitted with a zero scale.
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::artifact(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::artifact(path, e))
}

/// Encoders and scaler fitted together with the yield model.
#[derive(Clone, Debug)]
pub struct FeatureEncoder {
    scaler: StandardScaler,
    encoders: BTreeMap<String, LabelEncoder>,
}

impl FeatureEncoder {
    pub fn new(scaler: StandardScaler, encoders: BTreeMap<String, LabelEncoder>) -> Self {
        for column in encoders.keys() {
            if !scaler.feature_names().contains(column) {
                warn!("Encoder for '{}' matches no model feature", column);
            }
        }

        FeatureEncoder { scaler, encoders }
    }

    pub fn load(scaler_path: &Path, encoders_path: &Path) -> Result<Self> {
        let scaler: StandardScaler = read_json(scaler_path)?;
        scaler
            .validate()
            .map_err(|e| Error::artifact(scaler_path, e))?;

        let encoders: BTreeMap<String, LabelEncoder> = read_json(encoders_path)?;

        info!(
            "Loaded scaler with {} features and {} categorical encoders",
            scaler.feature_names().len(),
            encoders.len()
        );

        Ok(FeatureEncoder::new(scaler, encoders))
    }

    /// Canonical feature order.
    pub fn feature_names(&self) -> &[String] {
        self.scaler.feature_names()
    }

    pub fn encoder(&self, feature: &str) -> Option<&LabelEncoder> {
        self.encoders.get(feature)
    }

    /// Builds the unscaled row in canonical order. Absent (or null) features
    /// default to 0.
    pub fn encode(&self, input: &Map<String, Value>) -> Result<Vec<f64>> {
        if let Some(unknown) = input
            .keys()
            .find(|k| !self.feature_names().contains(*k))
        {
            return Err(Error::UnknownFeature(unknown.clone()));
        }

        self.feature_names()
            .iter()
            .map(|feature| match input.get(feature) {
                None | Some(Value::Null) => Ok(0.0),
                Some(value) => match self.encoders.get(feature) {
                    Some(encoder) => encode_category(feature, encoder, value),
                    None => to_number(feature, value),
                },
            })
            .collect()
    }

    /// Encodes and standardizes `input`.
    pub fn transform(&self, input: &Map<String, Value>) -> Result<Vec<f64>> {
        let row = self.encode(input)?;
        self.scaler.transform(&row)
    }
}

fn encode_category(feature: &str, encoder: &LabelEncoder, value: &Value) -> Result<f64> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => category_text(n),
        Value::Bool(b) => b.to_string(),
        other => {
            return Err(Error::InvalidInput(format!(
                "feature '{}' must be a string, got {}",
                feature, other
            )))
        }
    };

    encoder
        .transform(&text)
        .map(|code| code as f64)
        .ok_or_else(|| Error::UnseenCategory {
            feature: feature.to_owned(),
            value: text,
        })
}

/// Integral floats are written without a trailing `.0`, so `2.0` and `2`
/// name the same class.
fn category_text(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

fn to_number(feature: &str, value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| Error::NotNumeric {
            feature: feature.to_owned(),
            value: value.to_string(),
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    pub(crate) fn encoder() -> FeatureEncoder {
        let scaler = StandardScaler::new(
            vec![
                "Soil_Type".into(),
                "Rainfall_mm".into(),
                "Temperature_Celsius".into(),
            ],
            vec![1.0, 500.0, 20.0],
            vec![1.0, 100.0, 0.0],
        )
        .unwrap();

        let mut encoders = BTreeMap::new();
        encoders.insert(
            "Soil_Type".to_owned(),
            LabelEncoder::new(vec!["Clay".into(), "Loam".into(), "Sandy".into()]),
        );

        FeatureEncoder::new(scaler, encoders)
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn reindexes_into_canonical_order() {
        let a = object(json!({"Temperature_Celsius": 25, "Soil_Type": "Sandy", "Rainfall_mm": "650.5"}));
        let b = object(json!({"Rainfall_mm": 650.5, "Soil_Type": "Sandy", "Temperature_Celsius": "25"}));

        let row = encoder().encode(&a).unwrap();
        assert_eq!(row, vec![2.0, 650.5, 25.0]);
        assert_eq!(encoder().encode(&b).unwrap(), row);
    }

    #[test]
    fn scales_and_ignores_zero_scale() {
        let input = object(json!({"Soil_Type": "Loam", "Rainfall_mm": 700, "Temperature_Celsius": 23}));

        let scaled = encoder().transform(&input).unwrap();
        assert_eq!(scaled, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn absent_features_default_to_zero() {
        let row = encoder()
            .encode(&object(json!({"Rainfall_mm": 10, "Soil_Type": null})))
            .unwrap();
        assert_eq!(row, vec![0.0, 10.0, 0.0]);
    }

    #[test]
    fn unseen_category_is_an_error() {
        let err = encoder()
            .encode(&object(json!({"Soil_Type": "Lava"})))
            .unwrap_err();

        assert!(matches!(err, Error::UnseenCategory { ref value, .. } if value == "Lava"));
        assert!(err.is_client_error());
    }

    #[test]
    fn integral_float_category_matches_integer() {
        let scaler = StandardScaler::new(vec!["Crop_Code".into()], vec![0.0], vec![1.0]).unwrap();
        let mut encoders = BTreeMap::new();
        encoders.insert(
            "Crop_Code".to_owned(),
            LabelEncoder::new(vec!["1".into(), "2".into()]),
        );
        let fe = FeatureEncoder::new(scaler, encoders);

        let int = fe.encode(&object(json!({"Crop_Code": 2}))).unwrap();
        let float = fe.encode(&object(json!({"Crop_Code": 2.0}))).unwrap();
        assert_eq!(int, vec![1.0]);
        assert_eq!(float, int);

        let err = fe.encode(&object(json!({"Crop_Code": 2.5}))).unwrap_err();
        assert!(matches!(err, Error::UnseenCategory { ref value, .. } if value == "2.5"));
    }

    #[test]
    fn non_numeric_value_is_an_error() {
        let err = encoder()
            .encode(&object(json!({"Rainfall_mm": "a lot"})))
            .unwrap_err();
        assert!(matches!(err, Error::NotNumeric { ref feature, .. } if feature == "Rainfall_mm"));

        let err = encoder()
            .encode(&object(json!({"Rainfall_mm": true})))
            .unwrap_err();
        assert!(matches!(err, Error::NotNumeric { .. }));
    }

    #[test]
    fn unknown_feature_is_rejected() {
        let err = encoder()
            .encode(&object(json!({"Fertilizer_Used": true})))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFeature(ref f) if f == "Fertilizer_Used"));
    }

    #[test]
    fn label_encoder_round_trips() {
        let fe = encoder();
        let soil = fe.encoder("Soil_Type").unwrap();

        for class in soil.classes() {
            let code = soil.transform(class).unwrap();
            assert_eq!(soil.inverse_transform(code), Some(class.as_str()));
        }
        assert_eq!(soil.inverse_transform(3), None);
    }

    #[test]
    fn reads_sklearn_attribute_names() {
        let scaler: StandardScaler = serde_json::from_value(json!({
            "feature_names_in_": ["a", "b"],
            "mean_": [0.0, 1.0],
            "scale_": [2.0, 4.0]
        }))
        .unwrap();

        assert_eq!(scaler.feature_names(), ["a", "b"]);
        assert_eq!(scaler.transform(&[4.0, 9.0]).unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn mismatched_scaler_is_rejected() {
        assert!(StandardScaler::new(vec!["a".into()], vec![], vec![1.0]).is_err());
        assert!(StandardScaler::new(vec![], vec![], vec![]).is_err());
    }

    #[test]
    fn loads_artifacts_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let scaler_path = dir.path().join("scaler.json");
        let encoders_path = dir.path().join("encoders.json");

        std::fs::write(
            &scaler_path,
            r#"{"feature_names_in": ["Crop", "Rainfall_mm"], "mean": [0, 0], "scale": [1, 1]}"#,
        )
        .unwrap();
        std::fs::write(&encoders_path, r#"{"Crop": ["Maize", "Rice"]}"#).unwrap();

        let fe = FeatureEncoder::load(&scaler_path, &encoders_path).unwrap();
        let row = fe
            .transform(&object(json!({"Crop": "Rice", "Rainfall_mm": 3})))
            .unwrap();
        assert_eq!(row, vec![1.0, 3.0]);

        let missing = dir.path().join("nope.json");
        assert!(matches!(
            FeatureEncoder::load(&missing, &encoders_path),
            Err(Error::Artifact { .. })
        ));
    }
}
