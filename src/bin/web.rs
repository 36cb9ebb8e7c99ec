use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use argh::FromArgs;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    response::{Html, IntoResponse},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose};
use clarus::{
    RealEsrgan, SrEngine, SrEngineResult, SrEngineState, SrError, SrModel, UpscaleRequest,
    UpscaleResponse, WeightsConfig, convert, weights,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

/// Upload size cap; camera photos are comfortably below this.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

#[derive(FromArgs)]
/// Web UI for enhancing images with Real-ESRGAN x4.
struct WebArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the directory holding (or receiving) the model weights
    #[argh(option, short = 'w', default = "PathBuf::from(weights::DEFAULT_WEIGHTS_DIR)")]
    weights_dir: PathBuf,
}

// custom model that rebuilds the Real-ESRGAN session for every request, so a
// weights file swapped on disk is picked up without restarting the server
struct EnhanceModel {
    weights: WeightsConfig,
}

impl SrModel for EnhanceModel {
    type Request = UpscaleRequest;
    type Response = UpscaleResponse;
    type Error = SrError;

    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
        let mut model = RealEsrgan::new(&self.weights)?;
        model.run(request)
    }
}

#[derive(Deserialize)]
struct EnhanceParams {
    name: String,
}

/// Accepts the same upload types as the file picker.
fn allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png")
        })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn post_enhance(
    State(engine): State<Arc<SrEngine<EnhanceModel>>>,
    Query(params): Query<EnhanceParams>,
    body: Bytes,
) -> impl IntoResponse {
    if !allowed_extension(&params.name) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Only jpg, jpeg and png uploads are accepted" })),
        );
    }

    if engine.state() != SrEngineState::Idle {
        log::debug!("Engine is still processing");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Engine is still processing" })),
        );
    }

    let image = match image::load_from_memory(&body) {
        Ok(decoded) => decoded.to_rgb8(),
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Could not decode the image: {err}") })),
            );
        }
    };

    engine.schedule_inference(UpscaleRequest {
        image,
        source: params.name.clone(),
    });

    log::info!("Scheduled enhancement of {}", params.name);

    (StatusCode::OK, Json(json!({ "status": "scheduled" })))
}

async fn get_result(State(engine): State<Arc<SrEngine<EnhanceModel>>>) -> impl IntoResponse {
    match engine.try_poll_response() {
        SrEngineResult::Done(done) => match done.result {
            Ok(response) => {
                let (width, height) = response.image.dimensions();
                let png = match convert::encode_png(&response.image) {
                    Ok(png) => png,
                    Err(err) => {
                        log::error!("Failed to encode the result: {err}");
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({
                                "status": "error",
                                "message": format!("An error occurred during enhancement: {err}"),
                            })),
                        );
                    }
                };

                log::info!(
                    "Enhanced {} to {width}x{height} in {:?}",
                    done.request_metadata.source,
                    done.duration
                );

                (
                    StatusCode::OK,
                    Json(json!({
                        "status": "success",
                        "response": {
                            "source": done.request_metadata.source,
                            "width": width,
                            "height": height,
                            "duration_ms": done.duration.as_millis() as u64,
                            "image": general_purpose::STANDARD.encode(&png),
                        }
                    })),
                )
            }
            Err(err) => (
                StatusCode::OK,
                Json(json!({
                    "status": "error",
                    "message": format!("An error occurred during enhancement: {err}"),
                })),
            ),
        },
        SrEngineResult::Empty(state) => (StatusCode::OK, Json(json!({ "status": state.as_str() }))),
        SrEngineResult::Error(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": e })),
        ),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: WebArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let config = WeightsConfig {
        dir: args.weights_dir,
        ..WeightsConfig::default()
    };
    let engine = Arc::new(SrEngine::new(EnhanceModel { weights: config }));

    let app = Router::new()
        .route("/", get(index))
        .route("/api/enhance", post(post_enhance))
        .route("/api/result", get(get_result))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(engine);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {addr}");
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_supported_extensions() {
        assert!(allowed_extension("photo.jpg"));
        assert!(allowed_extension("photo.jpeg"));
        assert!(allowed_extension("photo.png"));
        assert!(allowed_extension("PHOTO.PNG"));
    }

    #[test]
    fn rejects_everything_else() {
        assert!(!allowed_extension("archive.zip"));
        assert!(!allowed_extension("photo.webp"));
        assert!(!allowed_extension("photo"));
        assert!(!allowed_extension(""));
        assert!(!allowed_extension("png"));
    }
}
