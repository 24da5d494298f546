//! Schema translation between the OpenAI chat format and Bedrock protocols
//!
//! Each protocol has a [`Translator`] with two pure functions:
//! - `to_provider`: [`ChatRequest`] → [`ProviderPayload`]
//! - `from_provider`: [`ProviderResponse`] → [`ChatResponse`]
//!
//! Supported protocols:
//! - **Direct**: `InvokeModel` with an Anthropic messages body (no system role)
//! - **Converse**: structured system/messages/content-block protocol
//! - **Knowledge base**: `RetrieveAndGenerate` against a managed retrieval index

pub mod converse;
pub mod direct;
pub mod knowledge_base;

pub use converse::{ConversePayload, ConverseResponse, ConverseTranslator};
pub use direct::{DirectTranslator, InvokeModelPayload, InvokeModelResponse};
pub use knowledge_base::{
    KnowledgeBaseTranslator, NativeRetrieveRequest, NativeRetrieveResponse,
    RetrieveAndGeneratePayload, RetrieveAndGenerateResponse,
};

use crate::error::{AppError, AppResult};
use crate::handlers::openai::types::{ChatRequest, ChatResponse};
use serde::Serialize;

/// Number of retrieved chunks requested from a knowledge base
pub const KB_NUMBER_OF_RESULTS: u32 = 10;

/// Sampling defaults applied once while normalizing a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceDefaults {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl InferenceDefaults {
    /// Direct and Converse protocols
    pub const CHAT: Self = Self {
        temperature: 0.7,
        top_p: 0.9,
        max_tokens: 4096,
    };

    /// RetrieveAndGenerate
    pub const KNOWLEDGE_BASE: Self = Self {
        temperature: 0.7,
        top_p: 0.9,
        max_tokens: 4000,
    };
}

/// `{numberOfResults}` block shared by the Converse and knowledge base payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearch {
    pub number_of_results: u32,
}

impl Default for VectorSearch {
    fn default() -> Self {
        Self {
            number_of_results: KB_NUMBER_OF_RESULTS,
        }
    }
}

/// Outbound payload, tagged by protocol
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPayload {
    Direct(InvokeModelPayload),
    Converse(ConversePayload),
    KnowledgeBase(RetrieveAndGeneratePayload),
}

impl ProviderPayload {
    /// Protocol label for logs and metrics
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Direct(_) => direct::PROTOCOL,
            Self::Converse(_) => converse::PROTOCOL,
            Self::KnowledgeBase(_) => knowledge_base::PROTOCOL,
        }
    }
}

/// Raw Bedrock reply, tagged by protocol
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    Direct(InvokeModelResponse),
    Converse(ConverseResponse),
    KnowledgeBase(RetrieveAndGenerateResponse),
}

impl ProviderResponse {
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Direct(_) => direct::PROTOCOL,
            Self::Converse(_) => converse::PROTOCOL,
            Self::KnowledgeBase(_) => knowledge_base::PROTOCOL,
        }
    }
}

/// Bidirectional translation for one Bedrock protocol
pub trait Translator: Send + Sync {
    /// Map a normalized request onto the protocol's payload
    fn to_provider(&self, request: &ChatRequest) -> AppResult<ProviderPayload>;

    /// Map the protocol's reply onto an OpenAI chat completion
    fn from_provider(
        &self,
        request: &ChatRequest,
        response: ProviderResponse,
    ) -> AppResult<ChatResponse>;
}

/// Error for a reply whose variant does not belong to the translator
pub(crate) fn mismatched_response(expected: &str, response: &ProviderResponse) -> AppError {
    AppError::Internal(format!(
        "Expected a {} response from Bedrock but received a {} response",
        expected,
        response.protocol()
    ))
}

/// The Direct and Converse protocols address a model in the URL
pub(crate) fn require_model(request: &ChatRequest) -> AppResult<&str> {
    let model = request.model().trim();
    if model.is_empty() {
        return Err(AppError::Validation(
            "model is required (set it in the request or bedrock.default_model_id)".to_string(),
        ));
    }
    Ok(model)
}
