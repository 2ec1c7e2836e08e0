use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Locations of every startup artifact plus the settings of the remote
/// recommendation service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Export directory of the pest classifier SavedModel
    pub model_dir: PathBuf,

    /// Optional labels file overriding the built-in pest list
    pub labels_path: Option<PathBuf>,

    /// Graph operation fed with the image tensor
    pub input_op: String,

    /// Graph operation holding the class probabilities
    pub output_op: String,

    /// Reference table mapping pests to pesticides
    pub pesticide_csv: PathBuf,

    /// Gradient-boosted yield model
    pub yield_model: PathBuf,

    /// Fitted feature scaler of the yield model
    pub yield_scaler: PathBuf,

    /// Per-column categorical encoders of the yield model
    pub yield_encoders: PathBuf,

    pub gemini_model: String,
    pub gemini_endpoint: String,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,

    /// Scratch directory for uploaded images
    pub upload_dir: PathBuf,

    pub allowed_extensions: Vec<String>,

    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model_dir: PathBuf::from("models/pest_model"),
            labels_path: None,
            input_op: "serving_default_input_1".to_owned(),
            output_op: "StatefulPartitionedCall".to_owned(),
            pesticide_csv: PathBuf::from("data/Pesticides_lowercase.csv"),
            yield_model: PathBuf::from("models/yield_model.json"),
            yield_scaler: PathBuf::from("models/yield_scaler.json"),
            yield_encoders: PathBuf::from("models/yield_encoders.json"),
            gemini_model: "gemini-1.5-pro".to_owned(),
            gemini_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            gemini_api_key: None,
            upload_dir: PathBuf::from("uploads"),
            allowed_extensions: vec!["png".to_owned(), "jpg".to_owned(), "jpeg".to_owned()],
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Whether `filename` carries one of the accepted image extensions.
    /// The comparison ignores case.
    pub fn allowed_file(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn accepts_image_extensions_in_any_case() {
        let config = Config::default();

        assert!(config.allowed_file("leaf.png"));
        assert!(config.allowed_file("leaf.JPG"));
        assert!(config.allowed_file("field photo.JpEg"));

        assert!(!config.allowed_file("leaf.gif"));
        assert!(!config.allowed_file("png"));
        assert!(!config.allowed_file("notes.txt.exe"));
        assert!(!config.allowed_file(""));
    }

    #[test]
    fn api_key_is_never_serialized() {
        let config = Config {
            gemini_api_key: Some("secret".to_owned()),
            ..Config::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
