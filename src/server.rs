//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question, optionally within a session |
//! | `GET`  | `/api/courses` | Course count and titles |
//! | `GET`  | `/` | API banner |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Errors are JSON objects with a single `detail` field:
//!
//! ```json
//! { "detail": "Database connection failed" }
//! ```
//!
//! A request body that cannot be decoded (malformed JSON, missing `query`,
//! wrong content type) is `422`. Any failure inside the RAG system is `500`
//! with the underlying message.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted, and all response headers
//! are exposed, so a browser frontend on another origin can call the API.

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

use course_rag_core::models::{CourseAnalytics, SourceInfo};

use crate::config::Config;
use crate::error::RagError;
use crate::rag::RagService;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    rag: Arc<dyn RagService>,
}

/// Build the API router over `rag`.
pub fn router(rag: Arc<dyn RagService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/api/query", post(handle_query))
        .route("/api/courses", get(handle_courses))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { rag })
}

/// Serve the API on an already bound listener until the process ends.
pub async fn serve(listener: tokio::net::TcpListener, rag: Arc<dyn RagService>) -> anyhow::Result<()> {
    axum::serve(listener, router(rag)).await?;
    Ok(())
}

/// Bind `[server].bind` and serve the API.
pub async fn run_server(config: &Config, rag: Arc<dyn RagService>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Course RAG API listening on http://{}", listener.local_addr()?);
    serve(listener, rag).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Error that converts into a `{detail}` JSON response.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: rejection.body_text(),
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        tracing::error!(kind = err.kind(), error = %err, "request failed");
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: err.to_string(),
        }
    }
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Course Materials RAG System API" }))
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

// ============ POST /api/query ============

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<SourceInfo>,
    session_id: String,
}

/// Handler for `POST /api/query`.
///
/// An empty `query` string is accepted and passed through.
async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = state
        .rag
        .query(&request.query, request.session_id.as_deref())
        .await?;

    Ok(Json(QueryResponse {
        answer: outcome.answer,
        sources: outcome.sources.into_iter().map(|s| s.into_info()).collect(),
        session_id: outcome.session_id,
    }))
}

// ============ GET /api/courses ============

async fn handle_courses(State(state): State<AppState>) -> Result<Json<CourseAnalytics>, ApiError> {
    Ok(Json(state.rag.course_analytics().await?))
}
