//! Error types for the gateway
//!
//! All errors implement `IntoResponse` for Axum handlers and render as the
//! `{error, message}` envelope.

use crate::handlers::openai::response::{ErrorEnvelope, json_response};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    /// Malformed or missing input, detected before any network call
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Path does not name a supported endpoint
    #[error("Unsupported endpoint: {0}")]
    Route(String),

    /// Known endpoint called with a method other than POST
    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    /// Bedrock rejected or failed the call
    #[error("Bedrock API error: {code} - {message}")]
    Provider { code: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error is surfaced with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Route(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Provider { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the client-facing error envelope
    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            Self::Validation(msg) => ErrorEnvelope::new(msg.clone()),
            Self::Route(_) | Self::MethodNotAllowed(_) => ErrorEnvelope::new(self.to_string()),
            Self::Provider { code, message } => {
                ErrorEnvelope::with_message(format!("Bedrock API error: {}", code), message.clone())
            }
            Self::Internal(msg) => ErrorEnvelope::with_message("Internal server error", msg.clone()),
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => {
                ErrorEnvelope::with_message("Internal server error", self.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        json_response(self.status_code(), &self.envelope())
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_creates() {
        let err = AppError::Validation("invalid input".to_string());
        assert_eq!(err.to_string(), "Invalid request: invalid input");
    }

    #[test]
    fn test_route_error_creates() {
        let err = AppError::Route("/v3/chat".to_string());
        assert_eq!(err.to_string(), "Unsupported endpoint: /v3/chat");
    }

    #[test]
    fn test_provider_error_creates() {
        let err = AppError::Provider {
            code: "ThrottlingException".to_string(),
            message: "Too many requests".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Bedrock API error: ThrottlingException - Too many requests"
        );
    }

    #[test]
    fn test_validation_error_response_status() {
        let response = AppError::Validation("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_route_error_response_status() {
        let response = AppError::Route("/nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_method_not_allowed_response() {
        let err = AppError::MethodNotAllowed("GET".to_string());
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        let json = serde_json::to_value(err.envelope()).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Method GET not allowed"}));
    }

    #[test]
    fn test_provider_and_internal_errors_are_500() {
        let provider = AppError::Provider {
            code: "ValidationException".to_string(),
            message: "bad model".to_string(),
        };
        assert_eq!(provider.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_envelope_has_no_detail() {
        let envelope = AppError::Validation("Missing request body".to_string()).envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"], "Missing request body");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_provider_envelope_embeds_code_and_message() {
        let envelope = AppError::Provider {
            code: "ThrottlingException".to_string(),
            message: "Rate exceeded".to_string(),
        }
        .envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"], "Bedrock API error: ThrottlingException");
        assert_eq!(json["message"], "Rate exceeded");
    }

    #[test]
    fn test_internal_envelope_is_generic_with_detail() {
        let envelope = AppError::Internal("expected value at line 1".to_string()).envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["message"], "expected value at line 1");
    }
}
