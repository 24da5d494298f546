//! Converse protocol (v2 chat and knowledge base completions)
//!
//! System instructions travel in a dedicated `system` field and every turn
//! carries a list of content blocks. Only the first system message is
//! honored; later ones are dropped.

use super::{
    ProviderPayload, ProviderResponse, Translator, VectorSearch, mismatched_response,
    require_model,
};
use crate::error::{AppError, AppResult};
use crate::handlers::openai::types::{ChatRequest, ChatResponse, MessageRole, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL: &str = "converse";

/// `Converse` call: model id (URL) plus JSON body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversePayload {
    #[serde(skip)]
    pub model_id: String,
    pub messages: Vec<ConverseMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<TextBlock>>,
    pub inference_config: InferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base_config: Option<KnowledgeBaseConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConverseMessage {
    pub role: MessageRole,
    pub content: Vec<TextBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Fixed retrieval attachment for knowledge base completions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseConfig {
    pub knowledge_base_id: String,
    pub retrieval_config: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    pub vector_search_config: VectorSearch,
}

/// `Converse` reply
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    #[serde(default)]
    pub output: Option<ConverseOutput>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: ConverseUsage,
    #[serde(default)]
    pub citations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverseOutput {
    #[serde(default)]
    pub message: Option<ConverseOutputMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverseOutputMessage {
    #[serde(default)]
    pub content: Vec<ConverseContentBlock>,
}

/// Reply content block; non-text blocks (tool use, reasoning) have no `text`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverseContentBlock {
    #[serde(default)]
    pub text: Option<String>,
}

/// camelCase usage counters (`inputTokens`, or `inputTokenCount`)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseUsage {
    #[serde(default, alias = "inputTokenCount")]
    pub input_tokens: u64,
    #[serde(default, alias = "outputTokenCount")]
    pub output_tokens: u64,
}

impl From<ConverseUsage> for Usage {
    fn from(usage: ConverseUsage) -> Self {
        Usage::from_counts(usage.input_tokens, usage.output_tokens)
    }
}

impl ConverseOutputMessage {
    /// Concatenation of every text block, in order
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

/// Split the conversation into the first system prompt and the remaining turns
pub fn split_system(request: &ChatRequest) -> (Option<&str>, Vec<ConverseMessage>) {
    let mut system = None;
    let mut messages = Vec::with_capacity(request.messages().len());

    for message in request.messages() {
        match message.role() {
            MessageRole::System if system.is_none() => system = Some(message.content()),
            MessageRole::System => {
                tracing::debug!(
                    dropped_length = message.content().len(),
                    "Ignoring additional system message for Converse request"
                );
            }
            role @ (MessageRole::User | MessageRole::Assistant) => {
                messages.push(ConverseMessage {
                    role,
                    content: vec![TextBlock::new(message.content())],
                });
            }
        }
    }

    (system, messages)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConverseTranslator;

impl Translator for ConverseTranslator {
    fn to_provider(&self, request: &ChatRequest) -> AppResult<ProviderPayload> {
        let model_id = require_model(request)?.to_string();
        let (system, messages) = split_system(request);

        let knowledge_base_config =
            request
                .knowledge_base_id()
                .map(|knowledge_base_id| KnowledgeBaseConfig {
                    knowledge_base_id: knowledge_base_id.to_string(),
                    retrieval_config: RetrievalConfig::default(),
                });

        Ok(ProviderPayload::Converse(ConversePayload {
            model_id,
            messages,
            system: system
                .filter(|s| !s.is_empty())
                .map(|s| vec![TextBlock::new(s)]),
            inference_config: InferenceConfig {
                temperature: request.temperature(),
                top_p: request.top_p(),
                max_tokens: request.max_tokens(),
                stop_sequences: request.stop().map(<[String]>::to_vec),
            },
            knowledge_base_config,
        }))
    }

    fn from_provider(
        &self,
        request: &ChatRequest,
        response: ProviderResponse,
    ) -> AppResult<ChatResponse> {
        let body = match response {
            ProviderResponse::Converse(body) => body,
            other => return Err(mismatched_response(PROTOCOL, &other)),
        };

        let Some(output) = body.output else {
            return Err(AppError::Internal(
                "Unexpected response format from Bedrock Converse API: missing output".to_string(),
            ));
        };

        let content = output
            .message
            .as_ref()
            .map(ConverseOutputMessage::text)
            .unwrap_or_default();

        Ok(ChatResponse::new(
            request.model(),
            content,
            body.stop_reason.unwrap_or_else(|| "stop".to_string()),
            body.usage.into(),
            body.citations.unwrap_or_default(),
        ))
    }
}
