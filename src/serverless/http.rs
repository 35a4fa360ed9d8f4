//! axum front end for the on-demand handler

use super::{HandlerError, SharedHandler};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use slog::error;
use std::sync::Arc;

/// Router serving the handler on `POST /`
pub fn router(handler: Arc<SharedHandler>) -> Router {
    Router::new()
        .route("/", post(handle_invocation))
        .with_state(handler)
}

async fn handle_invocation(State(shared): State<Arc<SharedHandler>>, body: Bytes) -> Response {
    let handler = match shared.get().await {
        Ok(handler) => handler,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed creating handler: {}", e),
            )
                .into_response()
        }
    };

    match handler.handle_request(&body).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e @ HandlerError::InvalidCapabilities(_)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(HandlerError::Worker(e)) => {
            error!(handler.worker().logger(), "On-demand run failed"; "error" => %e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}
