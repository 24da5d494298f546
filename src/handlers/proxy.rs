//! Chat completion and retrieval endpoints
//!
//! All five POST routes (and any unknown path) land here; the gateway
//! pipeline does the routing so every path gets the same body checks and
//! error envelope.

use crate::error::AppError;
use crate::gateway::{Event, unrouted};
use crate::handlers::AppState;
use crate::handlers::openai::response::json_response;
use crate::middleware::RequestId;
use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header::ALLOW},
    response::{IntoResponse, Response},
};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

pub async fn handler(State(state): State<AppState>, request: Request) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .copied()
        .unwrap_or_default();
    let path = request.uri().path().to_string();

    let bytes = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            let err = AppError::Validation(format!("Unable to read request body: {}", e));
            return unrouted(err, state.metrics()).into_response();
        }
    };

    let body = if bytes.is_empty() {
        None
    } else {
        match String::from_utf8(bytes.to_vec()) {
            Ok(body) => Some(body),
            Err(_) => {
                let err = AppError::Validation(
                    crate::handlers::openai::request::INVALID_JSON.to_string(),
                );
                return unrouted(err, state.metrics()).into_response();
            }
        }
    };

    let event = Event::new(path, body);
    match state.gateway().handle(&event, request_id).await {
        Ok(reply) => json_response(StatusCode::OK, &reply),
        Err(e) => e.into_response(),
    }
}

/// Non-POST call to a gateway route
pub async fn method_not_allowed(State(state): State<AppState>, method: Method) -> Response {
    let err = AppError::MethodNotAllowed(method.to_string());
    let mut response = unrouted(err, state.metrics()).into_response();
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("POST"));
    response
}
