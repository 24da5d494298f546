//! OpenAI-compatible request and response types
//!
//! `ChatRequestBody` is the raw wire shape; `ChatRequest` is the normalized,
//! immutable form with every default applied. `ChatResponse` is built exactly
//! once per successful Bedrock call.

use crate::error::{AppError, AppResult};
use crate::translate::InferenceDefaults;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Object type for non-streaming chat completion responses
pub const OBJECT_CHAT_COMPLETION: &str = "chat.completion";

/// Prefix of generated completion ids
const COMPLETION_ID_PREFIX: &str = "chatcmpl-";
/// Number of hex characters taken from the UUID
const COMPLETION_ID_HEX_LEN: usize = 24;

// =============================================================================
// Message Types
// =============================================================================

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    role: MessageRole,
    #[serde(default, deserialize_with = "null_as_empty")]
    content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Get the role
    pub fn role(&self) -> MessageRole {
        self.role
    }

    /// Get the content
    pub fn content(&self) -> &str {
        &self.content
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// `stop` accepts a single string or a list, as the OpenAI API does
fn string_or_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stop {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Stop>::deserialize(deserializer)? {
        None => None,
        Some(Stop::One(s)) => Some(vec![s]),
        Some(Stop::Many(list)) => Some(list),
    })
}

// =============================================================================
// Chat Completion Request
// =============================================================================

/// Inbound body of the OpenAI-compatible endpoints, before normalization
///
/// Fields the gateway does not use (`stream`, `user`, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub model_arn: Option<String>,
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
}

/// Normalized chat request
///
/// Immutable once built: defaults are applied by [`ChatRequestBuilder::build`]
/// and never re-derived by the translators.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    stop: Option<Vec<String>>,
    model_arn: Option<String>,
    knowledge_base_id: Option<String>,
}

impl ChatRequest {
    /// Create a builder for programmatic construction
    ///
    /// # Examples
    ///
    /// ```
    /// use bedrock_gateway::handlers::openai::types::ChatRequest;
    /// use bedrock_gateway::translate::InferenceDefaults;
    ///
    /// let request = ChatRequest::builder()
    ///     .model("anthropic.claude-3-haiku-20240307-v1:0")
    ///     .system_message("You are helpful.")
    ///     .user_message("Hello!")
    ///     .build(InferenceDefaults::CHAT)
    ///     .expect("valid request");
    /// assert_eq!(request.max_tokens(), 4096);
    /// ```
    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn top_p(&self) -> f64 {
        self.top_p
    }

    /// Stop sequences; `None` when the caller sent none or an empty list
    pub fn stop(&self) -> Option<&[String]> {
        self.stop.as_deref()
    }

    pub fn model_arn(&self) -> Option<&str> {
        self.model_arn.as_deref()
    }

    /// Knowledge base the request is served against, if any
    pub fn knowledge_base_id(&self) -> Option<&str> {
        self.knowledge_base_id.as_deref()
    }
}

/// Builder for [`ChatRequest`]
///
/// Used by the request normalizer and by tests. Unset sampling parameters
/// take the values of the `InferenceDefaults` passed to [`build`](Self::build).
#[derive(Debug, Default)]
pub struct ChatRequestBuilder {
    model: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    top_p: Option<f64>,
    stop: Option<Vec<String>>,
    model_arn: Option<String>,
    knowledge_base_id: Option<String>,
}

impl ChatRequestBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn system_message(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::system(content))
    }

    pub fn user_message(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::user(content))
    }

    pub fn assistant_message(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::assistant(content))
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn model_arn(mut self, model_arn: impl Into<String>) -> Self {
        self.model_arn = Some(model_arn.into());
        self
    }

    pub fn knowledge_base_id(mut self, knowledge_base_id: impl Into<String>) -> Self {
        self.knowledge_base_id = Some(knowledge_base_id.into());
        self
    }

    /// Apply defaults, validate and produce the immutable request
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the message list is empty, a sampling
    /// parameter is not a finite non-negative number, or `max_tokens` is zero.
    pub fn build(self, defaults: InferenceDefaults) -> AppResult<ChatRequest> {
        if self.messages.is_empty() {
            return Err(AppError::Validation(
                "messages array cannot be empty".to_string(),
            ));
        }

        for (name, value) in [("temperature", self.temperature), ("top_p", self.top_p)] {
            if let Some(v) = value
                && (!v.is_finite() || v < 0.0)
            {
                return Err(AppError::Validation(format!(
                    "{} must be a finite non-negative number",
                    name
                )));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(AppError::Validation(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        Ok(ChatRequest {
            model: self.model.unwrap_or_default(),
            messages: self.messages,
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            stop: self.stop.filter(|s| !s.is_empty()),
            model_arn: self.model_arn.filter(|s| !s.trim().is_empty()),
            knowledge_base_id: self.knowledge_base_id.filter(|s| !s.trim().is_empty()),
        })
    }
}

// =============================================================================
// Chat Completion Response
// =============================================================================

/// Token usage; `total_tokens` is always the sum of the other two
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl Usage {
    pub fn from_counts(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> u64 {
        self.completion_tokens
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }
}

/// Retrieval citations attached to the assistant message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageMetadata {
    pub citations: Vec<Value>,
}

/// Assistant message in a completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatResponse {
    /// Build the single-choice response with a fresh id and timestamp
    ///
    /// Empty `citations` leave the message without metadata.
    pub fn new(
        model: impl Into<String>,
        content: impl Into<String>,
        finish_reason: impl Into<String>,
        usage: Usage,
        citations: Vec<Value>,
    ) -> Self {
        let metadata = (!citations.is_empty()).then_some(MessageMetadata { citations });

        Self {
            id: generate_completion_id(),
            object: OBJECT_CHAT_COMPLETION,
            created: current_timestamp(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: MessageRole::Assistant,
                    content: content.into(),
                    metadata,
                },
                finish_reason: finish_reason.into(),
            }],
            usage,
        }
    }

    /// Content of the single choice
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default()
    }
}

/// `chatcmpl-` followed by 24 hex characters of a fresh UUIDv4
pub fn generate_completion_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", COMPLETION_ID_PREFIX, &hex[..COMPLETION_ID_HEX_LEN])
}

/// Current Unix timestamp in seconds
///
/// Falls back to 0 (with a warning) if the system clock is before the epoch.
pub fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                "System clock appears to be before UNIX epoch - using 0 as timestamp"
            );
            0
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_accepts_minimal_request() {
        let body: ChatRequestBody =
            serde_json::from_str(r#"{"messages": [{"role": "user", "content": "Hi"}]}"#).unwrap();
        assert_eq!(body.model, None);
        assert_eq!(body.messages, vec![ChatMessage::user("Hi")]);
        assert_eq!(body.temperature, None);
    }

    #[test]
    fn test_body_ignores_unknown_fields() {
        let body: ChatRequestBody = serde_json::from_str(
            r#"{"model": "m", "messages": [], "stream": false, "user": "abc"}"#,
        )
        .unwrap();
        assert_eq!(body.model.as_deref(), Some("m"));
    }

    #[test]
    fn test_body_rejects_unknown_role() {
        let result: Result<ChatRequestBody, _> =
            serde_json::from_str(r#"{"messages": [{"role": "tool", "content": "x"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_null_content_becomes_empty() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role": "assistant", "content": null}"#).unwrap();
        assert_eq!(msg.content(), "");
    }

    #[test]
    fn test_stop_accepts_string_or_list() {
        let one: ChatRequestBody = serde_json::from_str(r#"{"stop": "END"}"#).unwrap();
        assert_eq!(one.stop, Some(vec!["END".to_string()]));

        let many: ChatRequestBody = serde_json::from_str(r#"{"stop": ["A", "B"]}"#).unwrap();
        assert_eq!(many.stop, Some(vec!["A".to_string(), "B".to_string()]));

        let none: ChatRequestBody = serde_json::from_str(r#"{"stop": null}"#).unwrap();
        assert_eq!(none.stop, None);
    }

    #[test]
    fn test_builder_applies_chat_defaults() {
        let request = ChatRequest::builder()
            .user_message("Hi")
            .build(InferenceDefaults::CHAT)
            .unwrap();
        assert_eq!(request.temperature(), 0.7);
        assert_eq!(request.top_p(), 0.9);
        assert_eq!(request.max_tokens(), 4096);
        assert_eq!(request.stop(), None);
    }

    #[test]
    fn test_builder_applies_knowledge_base_defaults() {
        let request = ChatRequest::builder()
            .user_message("Hi")
            .build(InferenceDefaults::KNOWLEDGE_BASE)
            .unwrap();
        assert_eq!(request.max_tokens(), 4000);
    }

    #[test]
    fn test_builder_keeps_explicit_values() {
        let request = ChatRequest::builder()
            .user_message("Hi")
            .temperature(0.2)
            .top_p(0.5)
            .max_tokens(100)
            .stop(vec!["\n\nHuman:".to_string()])
            .build(InferenceDefaults::CHAT)
            .unwrap();
        assert_eq!(request.temperature(), 0.2);
        assert_eq!(request.top_p(), 0.5);
        assert_eq!(request.max_tokens(), 100);
        assert_eq!(request.stop(), Some(&["\n\nHuman:".to_string()][..]));
    }

    #[test]
    fn test_builder_drops_empty_optionals() {
        let request = ChatRequest::builder()
            .user_message("Hi")
            .stop(vec![])
            .model_arn("  ")
            .knowledge_base_id("")
            .build(InferenceDefaults::CHAT)
            .unwrap();
        assert_eq!(request.stop(), None);
        assert_eq!(request.model_arn(), None);
        assert_eq!(request.knowledge_base_id(), None);
    }

    #[test]
    fn test_builder_rejects_empty_messages() {
        let err = ChatRequest::builder()
            .build(InferenceDefaults::CHAT)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("empty")));
    }

    #[test]
    fn test_builder_rejects_zero_max_tokens() {
        let result = ChatRequest::builder()
            .user_message("Hi")
            .max_tokens(0)
            .build(InferenceDefaults::CHAT);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_builder_rejects_nan_temperature() {
        let result = ChatRequest::builder()
            .user_message("Hi")
            .temperature(f64::NAN)
            .build(InferenceDefaults::CHAT);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_usage_total_is_recomputed() {
        let usage = Usage::from_counts(50, 20);
        assert_eq!(usage.total_tokens(), 70);
    }

    #[test]
    fn test_completion_id_format() {
        let id = generate_completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), "chatcmpl-".len() + 24);
        assert!(id["chatcmpl-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_completion_ids_are_unique() {
        let a = ChatResponse::new("m", "x", "stop", Usage::default(), vec![]);
        let b = ChatResponse::new("m", "x", "stop", Usage::default(), vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_response_serializes_openai_shape() {
        let response = ChatResponse::new(
            "anthropic.claude-v2",
            "Hello",
            "stop",
            Usage::from_counts(3, 2),
            vec![],
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["model"], "anthropic.claude-v2");
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["message"]["role"], "assistant");
        assert_eq!(json["choices"][0]["message"]["content"], "Hello");
        assert!(json["choices"][0]["message"].get("metadata").is_none());
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(json["usage"]["prompt_tokens"], 3);
        assert_eq!(json["usage"]["completion_tokens"], 2);
        assert_eq!(json["usage"]["total_tokens"], 5);
        assert!(json["created"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_response_attaches_citations_as_metadata() {
        let citation = serde_json::json!({"retrievedReferences": []});
        let response = ChatResponse::new(
            "m",
            "x",
            "stop",
            Usage::default(),
            vec![citation.clone()],
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json["choices"][0]["message"]["metadata"]["citations"][0],
            citation
        );
    }
}
