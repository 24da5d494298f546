//! Errors raised by the Bedrock client layer

use crate::error::AppError;
use thiserror::Error;

/// Failure of a single Bedrock call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Bedrock answered with an error code (throttling, validation, access...)
    #[error("{code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    /// The call never produced a response (connect, TLS, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// No AWS credentials could be resolved or the request could not be signed
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// The response body did not match the protocol's shape
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Metric label for the failure
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service { .. } => "service",
            Self::Transport(_) => "transport",
            Self::Credentials(_) => "credentials",
            Self::Decode(_) => "decode",
        }
    }

    /// Vendor error code, if Bedrock reported one
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Service { code, message, .. } => AppError::Provider { code, message },
            other => AppError::Internal(other.to_string()),
        }
    }
}
