use std::convert::Infallible;
use std::sync::Arc;

use agri_serve::yield_model::YIELD_UNIT;
use agri_serve::{Classification, FertilizerRequest, PesticideRecord, Recommendation, Severity};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::{body, Body, Method, Request, Response, StatusCode};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::state::AppState;
use crate::upload::{self, FileField, Upload};

/// A failed request, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn into_response(self) -> Response<Body> {
        if self.status.is_server_error() {
            error!("{}", self.message);
        } else {
            warn!("Rejected request: {}", self.message);
        }
        json_response(self.status, &json!({ "error": self.message }))
    }
}

impl From<agri_serve::Error> for ApiError {
    fn from(err: agri_serve::Error) -> Self {
        if err.is_client_error() {
            ApiError::bad_request(err.to_string())
        } else {
            ApiError::internal(err.to_string())
        }
    }
}

impl From<hyper::Error> for ApiError {
    fn from(err: hyper::Error) -> Self {
        ApiError::bad_request(format!("Could not read request body: {}", err))
    }
}

type ApiResult = Result<Response<Body>, ApiError>;

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    let (status, bytes) = match serde_json::to_vec(value) {
        Ok(bytes) => (status, bytes),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{{\"error\":\"Could not render response: {}\"}}", e).into_bytes(),
        ),
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn ok<T: Serialize>(value: &T) -> ApiResult {
    Ok(json_response(StatusCode::OK, value))
}

fn with_cors(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

const ROUTES: [&str; 5] = [
    "/health",
    "/api/analyze",
    "/api/predict-yield",
    "/api/recommend-fertilizer",
    "/predict",
];

pub async fn handle(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    info!("{} {}", method, path);
    let mut t = agri_serve::Timer::start("Handling request");

    let result = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NO_CONTENT;
            Ok(response)
        }
        (&Method::GET, "/health") => ok(&json!({ "status": "ok" })),
        (&Method::POST, "/api/analyze") => analyze(req, state).await,
        (&Method::POST, "/api/predict-yield") => predict_yield(req, state).await,
        (&Method::POST, "/api/recommend-fertilizer") => recommend_fertilizer(req, state).await,
        (&Method::POST, "/predict") => predict(req, state).await,
        (_, p) if ROUTES.contains(&p) => Err(ApiError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        )),
        _ => Err(ApiError::new(StatusCode::NOT_FOUND, "Not found")),
    };

    t.stop();

    Ok(with_cors(result.unwrap_or_else(ApiError::into_response)))
}

/// Runs the classifier on the blocking pool, then removes the upload.
async fn classify_upload(state: Arc<AppState>, upload: Upload) -> Result<Classification, ApiError> {
    info!("Classifying '{}'", upload.filename());

    let result = tokio::task::spawn_blocking(move || {
        let result = state.pests.classify_file(upload.path());
        upload.close();
        result
    })
    .await
    .map_err(|e| ApiError::internal(format!("Classification task failed: {}", e)))?;

    Ok(result?)
}

#[derive(Serialize)]
struct Recommendations {
    pesticides: Vec<PesticideRecord>,
    fertilizers: Vec<Recommendation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Analysis {
    pest_name: String,
    confidence: f32,
    severity: Severity,
    recommendations: Recommendations,
}

async fn analyze(req: Request<Body>, state: Arc<AppState>) -> ApiResult {
    let field = FileField {
        name: "image",
        missing: "No image provided",
        check_extension: true,
    };
    let upload = upload::receive(req, field, &state.config).await?;

    let classification = classify_upload(Arc::clone(&state), upload).await?;
    let pesticides = state.pesticides.recommend(&classification.label);

    ok(&Analysis {
        severity: classification.severity(),
        confidence: classification.confidence,
        pest_name: classification.label,
        recommendations: Recommendations {
            pesticides,
            fertilizers: vec![],
        },
    })
}

async fn predict(req: Request<Body>, state: Arc<AppState>) -> ApiResult {
    let field = FileField {
        name: "file",
        missing: "No file uploaded",
        check_extension: false,
    };
    let upload = upload::receive(req, field, &state.config).await?;

    let classification = classify_upload(Arc::clone(&state), upload).await?;
    let pesticide = state.pesticides.lookup(&classification.label);

    ok(&json!({
        "Identified Pest": classification.label,
        "Recommended Pesticide": pesticide,
    }))
}

/// Reads a non-empty JSON object body.
async fn json_object(req: Request<Body>) -> Result<Map<String, Value>, ApiError> {
    let bytes = body::to_bytes(req.into_body()).await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("No input data provided"));
    }

    let object: Map<String, Value> = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
    if object.is_empty() {
        return Err(ApiError::bad_request("No input data provided"));
    }

    Ok(object)
}

async fn predict_yield(req: Request<Body>, state: Arc<AppState>) -> ApiResult {
    let input = json_object(req).await?;

    let prediction = tokio::task::spawn_blocking(move || state.yields.predict(&input))
        .await
        .map_err(|e| ApiError::internal(format!("Prediction task failed: {}", e)))??;

    ok(&json!({ "prediction": prediction, "unit": YIELD_UNIT }))
}

async fn recommend_fertilizer(req: Request<Body>, state: Arc<AppState>) -> ApiResult {
    let input = json_object(req).await?;
    let request: FertilizerRequest = serde_json::from_value(Value::Object(input))
        .map_err(|e| ApiError::bad_request(format!("Invalid recommendation request: {}", e)))?;

    let recommendations = state.fertilizer.recommend(&request).await?;

    ok(&json!({ "recommendations": recommendations }))
}
