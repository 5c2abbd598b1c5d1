use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::app_state::AppState;
use crate::models::queue::{QueueStatus, UserQueueStatus};
use crate::routes::uploads::submitter_from_headers;

/// GET /api/v1/queue/status — global recognition queue snapshot.
///
/// Computed from live queue state on every call, so arbitrary polling is
/// fine.
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.queue.status())
}

/// GET /api/v1/queue/status/me — queue snapshot for the calling submitter,
/// including backlog position so "slow" is distinguishable from "broken".
pub async fn my_queue_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserQueueStatus>, StatusCode> {
    let submitter_id = submitter_from_headers(&headers)?;
    Ok(Json(state.queue.user_status(&submitter_id)))
}
