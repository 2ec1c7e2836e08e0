use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading artifacts or serving a request.
#[derive(Error, Debug)]
pub enum Error {
    /// A model, table or encoder could not be loaded at startup
    #[error("Failed to load artifact '{path}': {reason}")]
    Artifact { path: PathBuf, reason: String },

    /// The uploaded bytes are not a decodable image
    #[error("Could not decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The model session failed or produced unusable output
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("Unseen value '{value}' for categorical feature '{feature}'")]
    UnseenCategory { feature: String, value: String },

    #[error("Feature '{feature}' is not numeric: {value}")]
    NotNumeric { feature: String, value: String },

    /// Missing or inconsistent service settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or incomplete request payload
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The generative text service failed or returned nothing usable
    #[error("Generative service error: {0}")]
    Remote(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Artifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error was caused by the caller's input rather than by
    /// the service itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownFeature(_)
                | Error::UnseenCategory { .. }
                | Error::NotNumeric { .. }
                | Error::InvalidInput(_)
        )
    }
}

impl From<tensorflow::Status> for Error {
    fn from(status: tensorflow::Status) -> Self {
        Error::Inference(status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_client_errors() {
        assert!(Error::UnknownFeature("x".into()).is_client_error());
        assert!(Error::InvalidInput("empty".into()).is_client_error());
        assert!(Error::UnseenCategory {
            feature: "Soil_Type".into(),
            value: "Lava".into()
        }
        .is_client_error());

        assert!(!Error::Inference("boom".into()).is_client_error());
        assert!(!Error::Remote("quota".into()).is_client_error());
        assert!(!Error::artifact("model.json", "missing").is_client_error());
    }

    #[test]
    fn messages_name_the_offending_field() {
        let err = Error::NotNumeric {
            feature: "Rainfall_mm".into(),
            value: "\"lots\"".into(),
        };
        assert_eq!(err.to_string(), "Feature 'Rainfall_mm' is not numeric: \"lots\"");
    }
}
