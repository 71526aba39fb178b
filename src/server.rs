//! JSON HTTP API over a [`Harness`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/generate` | Generate code; always `200`, failures are in the body |
//! | `POST` | `/ingest` | Ingest one document into the index |
//!
//! # Error Contract
//!
//! `/ingest` errors use one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "ingestion failed: empty.md: document has no text content" } }
//! ```
//!
//! Error codes: `bad_request` (400), `dimension_mismatch` (409),
//! `embedding_error` (502), `internal` (500).
//!
//! `/generate` mirrors the library contract instead: it never fails, and a
//! failed generation is an `output` starting with `"Error: "` plus
//! `is_error: true`. That includes bodies that are not valid JSON or miss
//! the `task` field.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::error::Error;
use crate::harness::Harness;
use crate::models::{
    DocumentFormat, DocumentInput, GenerationRequest, IngestionResult, Language,
    DEFAULT_CREATIVITY,
};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    harness: Harness,
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let harness = Harness::open(config).await?;
    let app = router(harness);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server started");
    println!("cgen server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router. Exposed so tests can serve it on an
/// ephemeral port.
pub fn router(harness: Harness) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/generate", post(handle_generate))
        .route("/ingest", post(handle_ingest))
        .layer(cors)
        .with_state(AppState { harness })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidRequest(_) | Error::Ingestion(_) => StatusCode::BAD_REQUEST,
            Error::DimensionMismatch { .. } => StatusCode::CONFLICT,
            Error::Embedding(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /generate ============

#[derive(Deserialize)]
struct GenerateBody {
    task: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    use_context: bool,
    #[serde(default)]
    creativity: Option<f32>,
}

#[derive(Serialize)]
struct GenerateResponse {
    output: String,
    language: String,
    /// Code-fence tag for rendering `output` (e.g. `"cpp"`).
    syntax: String,
    is_error: bool,
}

fn generate_error(message: impl std::fmt::Display, language: String) -> Json<GenerateResponse> {
    Json(GenerateResponse {
        output: format!("Error: {}", message),
        language,
        syntax: String::new(),
        is_error: true,
    })
}

async fn handle_generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Json<GenerateResponse> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return generate_error(rejection.body_text(), String::new()),
    };
    let language = match body.language.as_deref() {
        None => Language::default(),
        Some(raw) => match raw.parse::<Language>() {
            Ok(lang) => lang,
            Err(msg) => return generate_error(msg, raw.to_string()),
        },
    };

    let request = GenerationRequest::new(body.task, language)
        .with_context(body.use_context)
        .with_creativity(body.creativity.unwrap_or(DEFAULT_CREATIVITY));
    let output = state.harness.generate_request(&request).await;

    Json(GenerateResponse {
        is_error: output.starts_with("Error: "),
        output,
        language: language.display_name().to_string(),
        syntax: language.syntax().to_string(),
    })
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestBody {
    name: String,
    /// Format tag, extension or MIME type. Inferred from `name` when absent.
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    content_base64: Option<String>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<Json<IngestionResult>, AppError> {
    let Json(body) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    let format = match body.format.as_deref() {
        Some(tag) => tag.parse::<DocumentFormat>().map_err(bad_request)?,
        None => std::path::Path::new(&body.name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DocumentFormat::from_extension)
            .ok_or_else(|| {
                bad_request(format!("cannot infer format of '{}'; pass format", body.name))
            })?,
    };

    let content = match (body.content, body.content_base64) {
        (Some(text), None) => text.into_bytes(),
        (None, Some(encoded)) => base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| bad_request(format!("content_base64 is not valid base64: {}", e)))?,
        _ => {
            return Err(bad_request(
                "exactly one of content or content_base64 is required",
            ))
        }
    };

    let result = state
        .harness
        .ingest(DocumentInput::new(body.name, format, content))
        .await?;
    Ok(Json(result))
}
