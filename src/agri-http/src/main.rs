use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use agri_serve::Config;
use log::info;

mod routes;
mod state;
mod upload;

use state::AppState;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "agri-http",
    about = "HTTP API for pest identification, yield prediction and fertilizer advice"
)]
struct CmdArgs {
    #[structopt(long, default_value = "127.0.0.1:5000", env = "AGRI_LISTEN")]
    listen: SocketAddr,

    #[structopt(long, parse(from_os_str), env = "AGRI_MODEL_DIR", help = "Export directory of the pest SavedModel")]
    model_dir: Option<PathBuf>,

    #[structopt(long, parse(from_os_str), env = "AGRI_LABELS", help = "Labels file, one pest per line")]
    labels: Option<PathBuf>,

    #[structopt(long, help = "Input operation of the pest model")]
    input_op: Option<String>,

    #[structopt(long, help = "Output operation of the pest model")]
    output_op: Option<String>,

    #[structopt(long, parse(from_os_str), env = "AGRI_PESTICIDE_CSV")]
    pesticide_csv: Option<PathBuf>,

    #[structopt(long, parse(from_os_str), env = "AGRI_YIELD_MODEL")]
    yield_model: Option<PathBuf>,

    #[structopt(long, parse(from_os_str), env = "AGRI_YIELD_SCALER")]
    yield_scaler: Option<PathBuf>,

    #[structopt(long, parse(from_os_str), env = "AGRI_YIELD_ENCODERS")]
    yield_encoders: Option<PathBuf>,

    #[structopt(long, parse(from_os_str), env = "AGRI_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    #[structopt(long, env = "AGRI_MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<usize>,

    #[structopt(long, env = "AGRI_GEMINI_MODEL")]
    gemini_model: Option<String>,

    #[structopt(long, env = "AGRI_GEMINI_ENDPOINT")]
    gemini_endpoint: Option<String>,

    #[structopt(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,
}

impl CmdArgs {
    /// Applies every given override on top of the default configuration.
    fn into_config(self) -> Config {
        let mut config = Config::default();

        if let Some(v) = self.model_dir {
            config.model_dir = v;
        }
        if self.labels.is_some() {
            config.labels_path = self.labels;
        }
        if let Some(v) = self.input_op {
            config.input_op = v;
        }
        if let Some(v) = self.output_op {
            config.output_op = v;
        }
        if let Some(v) = self.pesticide_csv {
            config.pesticide_csv = v;
        }
        if let Some(v) = self.yield_model {
            config.yield_model = v;
        }
        if let Some(v) = self.yield_scaler {
            config.yield_scaler = v;
        }
        if let Some(v) = self.yield_encoders {
            config.yield_encoders = v;
        }
        if let Some(v) = self.upload_dir {
            config.upload_dir = v;
        }
        if let Some(v) = self.max_upload_bytes {
            config.max_upload_bytes = v;
        }
        if let Some(v) = self.gemini_model {
            config.gemini_model = v;
        }
        if let Some(v) = self.gemini_endpoint {
            config.gemini_endpoint = v;
        }
        config.gemini_api_key = self.gemini_api_key;

        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let addr = args.listen;
    let config = args.into_config();

    std::fs::create_dir_all(&config.upload_dir)?;

    let state = Arc::new(AppState::load(config)?);

    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let state = Arc::clone(&state);

        let service = service_fn(move |req| routes::handle(req, Arc::clone(&state)));

        async move { Ok::<_, Infallible>(service) }
    });

    let server = Server::bind(&addr)
        .serve(make_service)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        });

    info!("Listening on http://{}", addr);

    server.await?;

    info!("Server stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = CmdArgs::from_iter_safe(&[
            "agri-http",
            "--listen",
            "0.0.0.0:8080",
            "--model-dir",
            "/opt/mobilenet",
            "--max-upload-bytes",
            "1024",
            "--gemini-api-key",
            "k",
        ])
        .unwrap();

        assert_eq!(args.listen.port(), 8080);

        let config = args.into_config();
        assert_eq!(config.model_dir, PathBuf::from("/opt/mobilenet"));
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.gemini_api_key.as_deref(), Some("k"));
        assert_eq!(config.pesticide_csv, Config::default().pesticide_csv);
    }
}
