use std::io::Write;
use std::path::{Path, PathBuf};

use agri_serve::Config;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, StatusCode};
use log::{debug, warn};
use multer::{Constraints, Multipart, SizeLimit};
use tempfile::NamedTempFile;

use crate::routes::ApiError;

/// An uploaded image stored on disk for the lifetime of one request. The
/// file is removed when this value is dropped, whatever the outcome.
pub struct Upload {
    file: NamedTempFile,
    filename: String,
}

impl Upload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn close(self) {
        let path: PathBuf = self.file.path().to_owned();
        match self.file.close() {
            Ok(()) => debug!("Removed upload {}", path.display()),
            Err(e) => warn!("Could not remove upload {}: {}", path.display(), e),
        }
    }
}

/// What a file field must satisfy and how to report its absence.
pub struct FileField<'a> {
    pub name: &'a str,
    pub missing: &'a str,
    pub check_extension: bool,
}

fn multipart_error(e: multer::Error) -> ApiError {
    match e {
        multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => {
            ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "File too large")
        }
        other => ApiError::bad_request(format!("Malformed upload: {}", other)),
    }
}

/// Streams the named file field of a multipart request into a temporary
/// file inside the configured upload directory.
pub async fn receive(
    req: Request<Body>,
    field: FileField<'_>,
    config: &Config,
) -> Result<Upload, ApiError> {
    let boundary = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| ApiError::bad_request(field.missing))?;

    let constraints = Constraints::new().size_limit(
        SizeLimit::new()
            .whole_stream(config.max_upload_bytes as u64)
            .per_field(config.max_upload_bytes as u64),
    );
    let mut multipart = Multipart::with_constraints(req.into_body(), boundary, constraints);

    while let Some(mut part) = multipart.next_field().await.map_err(multipart_error)? {
        if part.name() != Some(field.name) {
            continue;
        }

        let filename = part.file_name().unwrap_or_default().trim().to_owned();
        if filename.is_empty() {
            return Err(ApiError::bad_request("No selected file"));
        }
        if field.check_extension && !config.allowed_file(&filename) {
            return Err(ApiError::bad_request("Invalid file type"));
        }

        let suffix = Path::new(&filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&config.upload_dir)
            .map_err(|e| ApiError::internal(format!("Could not store upload: {}", e)))?;

        let mut size = 0;
        while let Some(chunk) = part.chunk().await.map_err(multipart_error)? {
            size += chunk.len();
            file.write_all(&chunk)
                .map_err(|e| ApiError::internal(format!("Could not store upload: {}", e)))?;
        }

        debug!(
            "Stored upload '{}' ({} bytes) at {}",
            filename,
            size,
            file.path().display()
        );

        return Ok(Upload { file, filename });
    }

    Err(ApiError::bad_request(field.missing))
}
