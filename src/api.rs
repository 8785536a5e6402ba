//! REST endpoints for the dashboard: records, stats, and batch runs.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::connector::MailConnector;
use crate::pipeline::{Category, FetchFilter, FetchWindow, InboxStats, Orchestrator, filter_records};

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    /// `None` when no mailbox is configured; batch runs then return 503.
    pub connector: Option<Arc<dyn MailConnector>>,
    /// Serializes batch runs.
    pub batch_lock: Arc<Mutex<()>>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, connector: Option<Arc<dyn MailConnector>>) -> Self {
        Self {
            orchestrator,
            connector,
            batch_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    pub category: Option<String>,
    pub window: Option<FetchWindow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub window: FetchWindow,
    pub max_results: Option<usize>,
    #[serde(default)]
    pub unread_only: bool,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/records?category=&window=
///
/// Stored records, newest first, optionally filtered.
async fn list_records(
    State(state): State<ApiState>,
    Query(query): Query<RecordQuery>,
) -> Response {
    let category = match query.category.as_deref().filter(|c| !c.is_empty()) {
        Some(label) => match Category::from_label(label) {
            Some(c) => Some(c),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unknown category: {label}"),
                );
            }
        },
        None => None,
    };
    let since = query
        .window
        .and_then(|w| w.since(Utc::now().date_naive()));

    match state.orchestrator.store().list_all().await {
        Ok(records) => {
            let filtered: Vec<_> = filter_records(&records, category, since);
            Json(serde_json::json!({ "count": filtered.len(), "records": filtered }))
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list records");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/stats
async fn stats(State(state): State<ApiState>) -> Response {
    match state.orchestrator.store().list_all().await {
        Ok(records) => Json(InboxStats::from_records(&records)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to compute stats");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /api/batch
///
/// Runs one batch to completion and returns its report. Concurrent requests
/// wait for the running batch to finish.
async fn run_batch(State(state): State<ApiState>, Json(req): Json<BatchRequest>) -> Response {
    let Some(connector) = state.connector.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "no mailbox configured");
    };

    let mut filter = FetchFilter::for_window(req.window, Utc::now().date_naive());
    if let Some(max) = req.max_results {
        filter.max_results = max;
    }
    filter.unread_only = req.unread_only;

    let _guard = state.batch_lock.lock().await;
    let result = state
        .orchestrator
        .run_batch(connector.as_ref(), &filter, |p| {
            tracing::debug!(index = p.index, total = p.total, status = ?p.status, "Batch progress");
        })
        .await;

    match result {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Batch failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// Build the API routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/records", get(list_records))
        .route("/api/stats", get(stats))
        .route("/api/batch", post(run_batch))
        .with_state(state)
}
