//! Response composition
//!
//! Every response, success or error, is a JSON body with the same headers.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// `{error, message?}` body of every failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }
}

/// Serialize `body` with the gateway's standard headers
///
/// Serialization failure degrades to a 500 envelope rather than panicking.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let (status, payload) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            let fallback = format!(
                r#"{{"error":"Internal server error","message":"Failed to serialize response: {}"}}"#,
                e.to_string().replace('"', "'")
            );
            (StatusCode::INTERNAL_SERVER_ERROR, fallback.into_bytes())
        }
    };

    (
        status,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ),
        ],
        payload,
    )
        .into_response()
}
