//! REST API handlers for segment management and history reporting.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use segmentator_core::types::{
    CreateSegmentRequest, DeleteSegmentRequest, ReportResponse, UpdateUserSegmentsRequest,
    UserHistoryQuery, UserSegments, UserSegmentsQuery,
};
use segmentator_core::SegmentatorError;
use segmentator_history::HistoryReporter;
use segmentator_segments::{AssignmentEngine, RolloutSampler, SegmentCatalog};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: SegmentCatalog,
    pub engine: AssignmentEngine,
    pub sampler: RolloutSampler,
    pub reporter: HistoryReporter,
    pub service_name: String,
    pub start_time: Instant,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub uptime_secs: u64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a domain error to an HTTP response, logging it on the way out.
/// Client errors (bad input, unknown slug) get 400; everything else 500.
fn error_response(err: SegmentatorError) -> ApiError {
    if err.is_client_error() {
        warn!(error = %err, "request rejected");
        metrics::counter!("api.client_errors").increment(1);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "bad_request".to_string(),
                message: err.to_string(),
            }),
        )
    } else {
        error!(error = %err, "request failed");
        metrics::counter!("api.server_errors").increment(1);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "internal_error".to_string(),
                message: err.to_string(),
            }),
        )
    }
}

/// POST /api/create_segment — create (or reactivate) a segment; a nonzero
/// `fraction` additionally rolls the segment out to that percentage of the
/// active user population.
pub async fn create_segment(
    State(state): State<AppState>,
    Json(req): Json<CreateSegmentRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .catalog
        .create_or_reactivate(&req.segment_slug)
        .map_err(error_response)?;

    if req.fraction != 0 {
        state
            .sampler
            .auto_assign(req.fraction, &req.segment_slug, req.ttl)
            .map_err(error_response)?;
    }

    Ok(StatusCode::CREATED)
}

/// DELETE /api/delete_segment — soft-delete a segment and unassign all its
/// active relations in one transaction.
pub async fn delete_segment(
    State(state): State<AppState>,
    Json(req): Json<DeleteSegmentRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .catalog
        .deactivate(&req.segment_slug)
        .map_err(error_response)?;
    Ok(StatusCode::OK)
}

/// POST /api/update_user_segments — assign then unassign segments for one
/// user. Either list may be empty.
pub async fn update_user_segments(
    State(state): State<AppState>,
    Json(req): Json<UpdateUserSegmentsRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .assign(&[req.user_id], &req.assign_segments, req.ttl)
        .map_err(error_response)?;
    state
        .engine
        .unassign(&[req.user_id], &req.unassign_segments)
        .map_err(error_response)?;
    Ok(StatusCode::OK)
}

/// GET /api/get_user_segments?user_id= — segments the user actively holds.
pub async fn get_user_segments(
    State(state): State<AppState>,
    Query(query): Query<UserSegmentsQuery>,
) -> Result<Json<UserSegments>, ApiError> {
    state
        .engine
        .user_segments(query.user_id)
        .map(Json)
        .map_err(error_response)
}

/// GET /api/get_user_history?user_id=&start_date=&end_date= — CSV export of
/// the user's assignment history over a month range.
pub async fn get_user_history(
    State(state): State<AppState>,
    Query(query): Query<UserHistoryQuery>,
) -> Result<Json<ReportResponse>, ApiError> {
    let range = HistoryReporter::parse_month_range(&query.start_date, &query.end_date)
        .map_err(error_response)?;
    let history = state
        .reporter
        .user_history(query.user_id, range)
        .map_err(error_response)?;
    let csv_url = state
        .reporter
        .write_csv(&history)
        .map_err(error_response)?;
    Ok(Json(ReportResponse { csv_url }))
}

/// GET /health — health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service_name.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
