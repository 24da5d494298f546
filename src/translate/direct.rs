//! Direct model invocation (`InvokeModel`, v1 chat completions)
//!
//! The Anthropic messages body has no system role, so every system message
//! becomes a user turn followed by a synthetic assistant acknowledgement.

use super::{ProviderPayload, ProviderResponse, Translator, mismatched_response, require_model};
use crate::error::AppResult;
use crate::handlers::openai::types::{ChatRequest, ChatResponse, MessageRole, Usage};
use serde::{Deserialize, Serialize};

pub const PROTOCOL: &str = "direct";

/// Body version marker required by Anthropic models on Bedrock
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Assistant turn inserted after each system message
pub const SYSTEM_ACKNOWLEDGEMENT: &str = "I'll follow these instructions carefully.";

/// `InvokeModel` call: model id (URL) plus JSON body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvokeModelPayload {
    #[serde(skip)]
    pub model_id: String,
    #[serde(flatten)]
    pub body: InvokeModelBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvokeModelBody {
    pub anthropic_version: &'static str,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub messages: Vec<DirectMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Role + plain-text content pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectMessage {
    pub role: MessageRole,
    pub content: String,
}

impl DirectMessage {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// `InvokeModel` reply body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvokeModelResponse {
    #[serde(default)]
    pub content: Vec<DirectContentBlock>,
    /// Legacy text-completions field
    #[serde(default)]
    pub completion: Option<String>,
    #[serde(default)]
    pub usage: DirectUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectContentBlock {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// snake_case usage counters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DirectUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl From<DirectUsage> for Usage {
    fn from(usage: DirectUsage) -> Self {
        Usage::from_counts(usage.input_tokens, usage.output_tokens)
    }
}

impl InvokeModelResponse {
    /// First text block, else the legacy completion, else empty
    pub fn text(&self) -> &str {
        self.content
            .iter()
            .find_map(|block| block.text.as_deref())
            .or(self.completion.as_deref())
            .unwrap_or_default()
    }
}

/// Map OpenAI messages onto alternating user/assistant turns
pub fn to_direct_messages(request: &ChatRequest) -> Vec<DirectMessage> {
    let mut messages = Vec::with_capacity(request.messages().len() + 1);
    for message in request.messages() {
        match message.role() {
            MessageRole::System => {
                messages.push(DirectMessage::new(MessageRole::User, message.content()));
                messages.push(DirectMessage::new(
                    MessageRole::Assistant,
                    SYSTEM_ACKNOWLEDGEMENT,
                ));
            }
            role @ (MessageRole::User | MessageRole::Assistant) => {
                messages.push(DirectMessage::new(role, message.content()));
            }
        }
    }
    messages
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectTranslator;

impl Translator for DirectTranslator {
    fn to_provider(&self, request: &ChatRequest) -> AppResult<ProviderPayload> {
        let model_id = require_model(request)?.to_string();

        Ok(ProviderPayload::Direct(InvokeModelPayload {
            model_id,
            body: InvokeModelBody {
                anthropic_version: ANTHROPIC_VERSION,
                max_tokens: request.max_tokens(),
                temperature: request.temperature(),
                top_p: request.top_p(),
                messages: to_direct_messages(request),
                stop_sequences: request.stop().map(<[String]>::to_vec),
            },
        }))
    }

    fn from_provider(
        &self,
        request: &ChatRequest,
        response: ProviderResponse,
    ) -> AppResult<ChatResponse> {
        let body = match response {
            ProviderResponse::Direct(body) => body,
            other => return Err(mismatched_response(PROTOCOL, &other)),
        };

        // InvokeModel exposes no finish reason the gateway maps
        Ok(ChatResponse::new(
            request.model(),
            body.text(),
            "stop",
            body.usage.into(),
            Vec::new(),
        ))
    }
}
