//! Queue, batch, backend, and activity API routes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use pixelforge_common::Error;
use pixelforge_db::models::JobStatus;
use pixelforge_db::queries::{activity, queue};
use serde::Deserialize;

use super::AppContext;
use crate::convert::{process_single, ConversionOptions, OptionOverrides};

/// Create the /api routes.
pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/queue", post(enqueue_item).get(list_queue))
        .route("/queue/status", get(queue_status))
        .route("/queue/cleanup", post(cleanup_queue))
        .route("/queue/failed", delete(clear_failed))
        .route("/batch/run", post(run_batch))
        .route("/batch/stop", post(stop_batch))
        .route("/batch/progress", get(batch_progress))
        .route("/backends", get(list_backends))
        .route("/backends/refresh", post(refresh_backends))
        .route("/convert", post(convert_single))
        .route("/activity", get(recent_activity))
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub source_ref: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub options: Option<OptionOverrides>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CleanupRequest {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RunRequest {
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub source_ref: String,
    #[serde(flatten)]
    pub overrides: OptionOverrides,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

fn error_response(e: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::SecurityRejected(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"error": e.to_string()})))
}

// ============================================================================
// Queue handlers
// ============================================================================

/// Enqueue a conversion job.
///
/// Returns 201 for a new item; a live duplicate returns 200 with the
/// existing id and no new row.
async fn enqueue_item(
    State(ctx): State<AppContext>,
    Json(req): Json<EnqueueRequest>,
) -> impl IntoResponse {
    if let Err(e) = ctx.resolver.resolve(&req.source_ref) {
        return error_response(&e).into_response();
    }

    let options_json = match &req.options {
        Some(overrides) => match serde_json::to_string(overrides) {
            Ok(json) => Some(json),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": e.to_string()})),
                )
                    .into_response()
            }
        },
        None => None,
    };

    let conn = match ctx.db.get() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    match queue::enqueue(&conn, &req.source_ref, options_json.as_deref(), req.priority) {
        Ok(outcome) => {
            let status = if outcome.is_duplicate() {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (
                status,
                Json(serde_json::json!({
                    "id": outcome.id(),
                    "status": if outcome.is_duplicate() { "duplicate" } else { "queued" },
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e).into_response(),
    }
}

/// List queue items, optionally filtered by status.
async fn list_queue(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<JobStatus>() {
            Ok(status) => Some(status),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": e})),
                )
                    .into_response()
            }
        },
    };

    let conn = match ctx.db.get() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    match queue::list_items(&conn, status, query.limit.unwrap_or(100)) {
        Ok(items) => Json(items).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// Aggregate queue counts.
async fn queue_status(State(ctx): State<AppContext>) -> impl IntoResponse {
    let conn = match ctx.db.get() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    match queue::status_counts(&conn) {
        Ok(counts) => Json(counts).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// Delete old Completed rows (Failed rows are kept).
async fn cleanup_queue(
    State(ctx): State<AppContext>,
    Json(req): Json<CleanupRequest>,
) -> impl IntoResponse {
    let days = req.days.unwrap_or(ctx.config.queue.cleanup_days);

    let conn = match ctx.db.get() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    match queue::cleanup_completed(&conn, days) {
        Ok(deleted) => Json(serde_json::json!({"deleted": deleted})).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// Drop all Failed rows.
async fn clear_failed(State(ctx): State<AppContext>) -> impl IntoResponse {
    let conn = match ctx.db.get() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    match queue::clear_failed(&conn) {
        Ok(deleted) => Json(serde_json::json!({"deleted": deleted})).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

// ============================================================================
// Batch handlers
// ============================================================================

/// Run one batch synchronously and return its report.
async fn run_batch(
    State(ctx): State<AppContext>,
    Json(req): Json<RunRequest>,
) -> impl IntoResponse {
    let size = req.size.unwrap_or(ctx.config.queue.batch_size);
    let runner = ctx.runner.clone();

    let report = tokio::task::spawn_blocking(move || runner.run_batch(size)).await;

    match report {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(e)) => error_response(&e).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Batch task panicked: {e}")})),
        )
            .into_response(),
    }
}

/// Prevent future batch runs and clear the progress snapshot.
async fn stop_batch(State(ctx): State<AppContext>) -> impl IntoResponse {
    ctx.runner.request_stop();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"status": "stopping"})),
    )
}

/// Current progress snapshot (Idle once expired).
async fn batch_progress(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.progress.get())
}

// ============================================================================
// Backend handlers
// ============================================================================

/// Current capability table.
async fn list_backends(State(ctx): State<AppContext>) -> impl IntoResponse {
    let registry = ctx.registry.clone();
    match tokio::task::spawn_blocking(move || registry.detect()).await {
        Ok(table) => Json(table).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Detection task panicked: {e}")})),
        )
            .into_response(),
    }
}

/// Drop the detection cache and re-probe.
async fn refresh_backends(State(ctx): State<AppContext>) -> impl IntoResponse {
    ctx.registry.invalidate();
    let registry = ctx.registry.clone();
    match tokio::task::spawn_blocking(move || registry.detect()).await {
        Ok(table) => Json(table).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Detection task panicked: {e}")})),
        )
            .into_response(),
    }
}

// ============================================================================
// Conversion + activity handlers
// ============================================================================

/// Convert one source ref immediately, bypassing the queue.
async fn convert_single(
    State(ctx): State<AppContext>,
    Json(req): Json<ConvertRequest>,
) -> impl IntoResponse {
    let converter = ctx.converter.clone();
    let resolver = ctx.resolver.clone();
    let options = ConversionOptions::merged(&ctx.config.conversion, &req.overrides);
    let source_ref = req.source_ref.clone();

    let result = tokio::task::spawn_blocking(move || {
        process_single(&converter, resolver.as_ref(), &source_ref, &options)
    })
    .await;

    match result {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(e)) => error_response(&e).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Conversion task panicked: {e}")})),
        )
            .into_response(),
    }
}

/// Most recent activity entries.
async fn recent_activity(
    State(ctx): State<AppContext>,
    Query(query): Query<ActivityQuery>,
) -> impl IntoResponse {
    let conn = match ctx.db.get() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    };

    match activity::recent(&conn, query.limit.unwrap_or(50)) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}
