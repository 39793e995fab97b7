//! Request admission middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HeaderValue, CONNECTION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::error::ApiError;
use super::state::AppState;

/// Count every request against the worker's lifecycle.
///
/// A worker that is not serving, or is at its concurrency limit, answers
/// 503 and asks the client to reconnect so the next attempt lands on
/// another worker.
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.lifecycle.try_begin_request() {
        Ok(guard) => {
            let response = next.run(request).await;
            drop(guard);
            response
        }
        Err(rejection) => {
            debug!(
                worker = %state.lifecycle.id(),
                path = %request.uri().path(),
                reason = %rejection,
                "Request rejected"
            );
            let mut response = ApiError::ServiceUnavailable(rejection.to_string()).into_response();
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}
