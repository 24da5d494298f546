//! Bedrock invocation
//!
//! [`BedrockClient`] is the seam to the three Bedrock endpoints; one client is
//! built at startup and shared by every request. [`Invoker`] issues exactly
//! one call per request, times it and classifies its failure.

pub mod error;
pub mod http;

pub use error::ProviderError;
pub use http::HttpBedrockClient;

use crate::error::AppResult;
use crate::metrics::Metrics;
use crate::translate::{
    ConversePayload, ConverseResponse, InvokeModelPayload, InvokeModelResponse,
    NativeRetrieveRequest, NativeRetrieveResponse, ProviderPayload, ProviderResponse,
    RetrieveAndGeneratePayload, RetrieveAndGenerateResponse,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Protocol label of the `/retrieveAndGenerate` pass-through
pub const NATIVE_PROTOCOL: &str = "native";

/// Bedrock operations used by the gateway
///
/// Allows injecting a mock client in tests so no network call is made.
#[async_trait]
pub trait BedrockClient: Send + Sync {
    /// `POST /model/{modelId}/invoke`
    async fn invoke_model(
        &self,
        payload: &InvokeModelPayload,
    ) -> Result<InvokeModelResponse, ProviderError>;

    /// `POST /model/{modelId}/converse`
    async fn converse(&self, payload: &ConversePayload) -> Result<ConverseResponse, ProviderError>;

    /// `POST /retrieveAndGenerate` with a translated payload
    async fn retrieve_and_generate(
        &self,
        payload: &RetrieveAndGeneratePayload,
    ) -> Result<RetrieveAndGenerateResponse, ProviderError>;

    /// `POST /retrieveAndGenerate` with the caller's body, untouched
    async fn retrieve_and_generate_native(
        &self,
        request: &NativeRetrieveRequest,
    ) -> Result<NativeRetrieveResponse, ProviderError>;
}

/// Issues Bedrock calls and records their outcome
#[derive(Clone)]
pub struct Invoker {
    client: Arc<dyn BedrockClient>,
    metrics: Arc<Metrics>,
}

impl Invoker {
    pub fn new(client: Arc<dyn BedrockClient>, metrics: Arc<Metrics>) -> Self {
        Self { client, metrics }
    }

    /// Dispatch a translated payload to its Bedrock operation
    ///
    /// # Errors
    ///
    /// Vendor-reported failures become `AppError::Provider`; transport and
    /// decode failures become `AppError::Internal`. Nothing is retried.
    pub async fn invoke(&self, payload: &ProviderPayload) -> AppResult<ProviderResponse> {
        let protocol = payload.protocol();
        let start = Instant::now();

        let result = match payload {
            ProviderPayload::Direct(p) => self
                .client
                .invoke_model(p)
                .await
                .map(ProviderResponse::Direct),
            ProviderPayload::Converse(p) => {
                self.client.converse(p).await.map(ProviderResponse::Converse)
            }
            ProviderPayload::KnowledgeBase(p) => self
                .client
                .retrieve_and_generate(p)
                .await
                .map(ProviderResponse::KnowledgeBase),
        };

        Ok(self.observe(protocol, start, result)?)
    }

    /// Forward a native `RetrieveAndGenerate` body
    ///
    /// # Errors
    ///
    /// Same classification as [`Invoker::invoke`].
    pub async fn retrieve_and_generate_native(
        &self,
        request: &NativeRetrieveRequest,
    ) -> AppResult<NativeRetrieveResponse> {
        let start = Instant::now();
        let result = self.client.retrieve_and_generate_native(request).await;
        Ok(self.observe(NATIVE_PROTOCOL, start, result)?)
    }

    fn observe<T>(
        &self,
        protocol: &'static str,
        start: Instant,
        result: Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = self.metrics.record_provider_duration(protocol, duration_ms) {
            tracing::error!(
                error = %e,
                protocol = protocol,
                "Metrics recording failed (non-fatal)"
            );
        }

        match &result {
            Ok(_) => {
                tracing::debug!(
                    protocol = protocol,
                    duration_ms = %duration_ms,
                    "Bedrock call succeeded"
                );
            }
            Err(err) => {
                self.metrics.provider_error(protocol, err.kind());
                tracing::warn!(
                    protocol = protocol,
                    error_kind = err.kind(),
                    error_code = err.code().unwrap_or("-"),
                    duration_ms = %duration_ms,
                    error = %err,
                    "Bedrock call failed"
                );
            }
        }

        result
    }
}
