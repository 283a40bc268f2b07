//! JSON HTTP API for presentation-layer consumers (chat bots, web hooks).
//!
//! # Endpoints
//!
//! | Method | Path | Body | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/api/search` | `{title, description?, source?, only_public?, exclude?}` | Duplicates of a new issue |
//! | `POST` | `/api/search-id` | `{id}` | Duplicates of an indexed document |
//! | `POST` | `/api/index` | GitHub `issues` event | Index one issue, recommend duplicates when opened |
//! | `GET`  | `/health` | | Health check (returns version) |
//!
//! Issue bodies can be tens of kilobytes, so all input travels in JSON
//! request bodies rather than the query string.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "title must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Engine failures are logged and answered with a generic `internal` error;
//! the raw engine response never reaches the client. Zero hits is a success
//! with `"found": false`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use issue_dedupe_core::engine::SearchEngine;
use issue_dedupe_core::error::SearchError;
use issue_dedupe_core::gateway::Gateway;
use issue_dedupe_core::models::SearchFilter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::connector_github::GithubIssueEvent;
use crate::opensearch::connect;
use crate::search::SearchResponse;

struct AppState<E> {
    gateway: Arc<Gateway<E>>,
}

impl<E> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

/// Builds the API router around a gateway.
pub fn router<E: SearchEngine + 'static>(gateway: Arc<Gateway<E>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/search", post(handle_search::<E>))
        .route("/api/search-id", post(handle_search_id::<E>))
        .route("/api/index", post(handle_index::<E>))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { gateway })
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let gateway = connect(config).await?;
    let app = router(gateway);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::NotFound(id) => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: format!("document not found: {}", id),
            },
            other => {
                error!(error = %other, "search failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: "Search failed, please try again later.".to_string(),
                }
            }
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

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    only_public: bool,
    /// Document id to leave out, e.g. the issue being submitted.
    #[serde(default)]
    exclude: Option<String>,
}

async fn handle_search<E: SearchEngine + 'static>(
    State(state): State<AppState<E>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.title.trim().is_empty() {
        return Err(bad_request("title must not be empty"));
    }

    let filter = SearchFilter {
        excluded_document_id: req.exclude.filter(|s| !s.is_empty()),
        source: req.source.filter(|s| !s.is_empty()),
        only_public: req.only_public,
    };

    let result = state
        .gateway
        .search(&req.title, &req.description, &filter)
        .await?;
    Ok(Json(result.into()))
}

// ============ POST /api/search-id ============

#[derive(Deserialize)]
struct SearchIdRequest {
    #[serde(default)]
    id: String,
}

async fn handle_search_id<E: SearchEngine + 'static>(
    State(state): State<AppState<E>>,
    Json(req): Json<SearchIdRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.id.trim().is_empty() {
        return Err(bad_request("id must not be empty"));
    }

    let result = state
        .gateway
        .search_by_id(&req.id, &SearchFilter::default())
        .await?;
    Ok(Json(result.into()))
}

// ============ POST /api/index ============

#[derive(Serialize)]
struct IndexResponse {
    id: String,
    /// Public duplicates of a newly opened issue; absent for other actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    recommendations: Option<SearchResponse>,
}

/// Upserts the issue of a webhook delivery. For `opened` events the issue
/// is then matched against the public documents, excluding itself.
async fn handle_index<E: SearchEngine + 'static>(
    State(state): State<AppState<E>>,
    Json(event): Json<GithubIssueEvent>,
) -> Result<Json<IndexResponse>, AppError> {
    let id = event.issue.document_id();
    let document = event.issue.to_document();

    state.gateway.index(&id, document.clone()).await?;
    info!(id = %id, action = %event.action, "indexed issue");

    if !event.is_opened() {
        return Ok(Json(IndexResponse {
            id,
            recommendations: None,
        }));
    }

    let filter = SearchFilter::excluding(id.clone()).only_public();
    let result = state
        .gateway
        .search(&document.title, &document.description, &filter)
        .await?;

    Ok(Json(IndexResponse {
        id,
        recommendations: Some(result.into()),
    }))
}
