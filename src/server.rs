//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer `{ "message": "..." }` from the indexed documents |
//! | `POST` | `/api/reprocess` | Reload the document directory and rebuild the index |
//! | `GET`  | `/api/messages` | Chat history, oldest first |
//! | `GET`  | `/health` | Liveness plus index state |
//!
//! # Error Contract
//!
//! Failures return a JSON body with a human-readable `detail` and a stable
//! `code` (see [`Error::code`]):
//!
//! ```json
//! { "detail": "index is not ready; build the index before asking questions", "code": "not_ready" }
//! ```
//!
//! Status codes: `400` for a blank or malformed question, `409` when a
//! rebuild is already running, `500` for everything else.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat
//! front end can be served from another origin.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::Error;
use crate::models::ChatMessage;
use crate::service::{BuildReport, QaService, ServiceState};

/// Build the application router around `service`.
pub fn router(service: Arc<QaService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/reprocess", post(handle_reprocess))
        .route("/api/messages", get(handle_messages))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

/// Serve the API on an already-bound listener until Ctrl-C.
pub async fn serve(listener: tokio::net::TcpListener, service: Arc<QaService>) -> std::io::Result<()> {
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Bind `bind_addr` and serve the API.
///
/// The caller is expected to have built the initial index already.
pub async fn run_server(bind_addr: &str, service: Arc<QaService>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    serve(listener, service).await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    detail: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::BuildInProgress => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: err.code(),
            detail: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.detail,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    /// Seconds spent in the model call.
    processing_time: f64,
    sources: Vec<SourceRef>,
}

#[derive(Serialize)]
struct SourceRef {
    rank: usize,
    source: String,
    chunk_index: usize,
    score: f32,
    text: String,
}

async fn handle_chat(
    State(service): State<Arc<QaService>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = body?;
    if request.message.trim().is_empty() {
        return Err(Error::InvalidInput("message must not be empty".into()).into());
    }

    let answer = service.ask(&request.message).await?;

    let sources = answer
        .retrieval
        .hits
        .into_iter()
        .enumerate()
        .map(|(i, hit)| SourceRef {
            rank: i + 1,
            source: hit.chunk.source,
            chunk_index: hit.chunk.chunk_index,
            score: hit.score,
            text: hit.chunk.text,
        })
        .collect();

    Ok(Json(ChatResponse {
        response: answer.text,
        processing_time: answer.processing_time.as_secs_f64(),
        sources,
    }))
}

// ============ POST /api/reprocess ============

#[derive(Serialize)]
struct ReprocessResponse {
    status: &'static str,
    message: String,
    details: String,
    report: BuildReport,
}

async fn handle_reprocess(
    State(service): State<Arc<QaService>>,
) -> Result<Json<ReprocessResponse>, AppError> {
    // Run detached so a client disconnect cannot cancel a half-finished build.
    let task = tokio::spawn(async move { service.rebuild().await });
    let report = task
        .await
        .map_err(|e| Error::Documents(format!("rebuild task failed: {}", e)))??;

    Ok(Json(ReprocessResponse {
        status: "success",
        message: format!(
            "Reprocessed {} documents into {} chunks",
            report.documents, report.chunks
        ),
        details: format!(
            "build {}: {} documents, {} chunks, digest {}, {:.2}s",
            report.build_id,
            report.documents,
            report.chunks,
            report.digest,
            report.elapsed.as_secs_f64()
        ),
        report,
    }))
}

// ============ GET /api/messages ============

async fn handle_messages(State(service): State<Arc<QaService>>) -> Json<Vec<ChatMessage>> {
    Json(service.messages())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    state: ServiceState,
    chunks: usize,
}

async fn handle_health(State(service): State<Arc<QaService>>) -> Json<HealthResponse> {
    let status = service.status();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        state: status.state,
        chunks: status.chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        let cases = [
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::BuildInProgress, StatusCode::CONFLICT),
            (Error::NotReady, StatusCode::INTERNAL_SERVER_ERROR),
            (Error::EmptyCorpus("files".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let code = err.code();
            let app: AppError = err.into();
            assert_eq!(app.status, expected);
            assert_eq!(app.code, code);
        }
    }
}
