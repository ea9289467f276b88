//! Value endpoints
//!
//! Request/response access to the shared value: read it, write it, or
//! long-poll until it differs from what the caller last saw.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::get,
    Json, Router,
};
use tracing::debug;

use crate::http::{AppError, AppResult, AppState};
use crate::protocol::{AwaitQuery, ValueMessage, WriteRequest};

pub fn create_value_router() -> Router<AppState> {
    Router::new()
        .route("/api/value", get(get_value).post(update_value))
        .route("/api/value/await", get(await_value))
}

/// Current value
pub async fn get_value(State(state): State<AppState>) -> Json<ValueMessage> {
    Json(state.hub.snapshot().into())
}

/// Apply a client write and return the resulting value
pub async fn update_value(
    State(state): State<AppState>,
    payload: Result<Json<WriteRequest>, JsonRejection>,
) -> AppResult<Json<ValueMessage>> {
    let Json(request) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;
    let value = state.hub.on_client_write(request.content);
    Ok(Json(value.into()))
}

/// Long poll: resolve once the content differs from `last_seen`
///
/// After the configured timeout the current value is returned as is and
/// the client is expected to poll again.
pub async fn await_value(
    State(state): State<AppState>,
    Query(query): Query<AwaitQuery>,
) -> Json<ValueMessage> {
    let wait = state.hub.wait_for_change(&query.last_seen);
    match tokio::time::timeout(state.long_poll_timeout, wait).await {
        Ok(value) => Json(value.into()),
        Err(_) => {
            debug!(timeout = ?state.long_poll_timeout, "Long poll timed out without a change");
            Json(state.hub.snapshot().into())
        }
    }
}
