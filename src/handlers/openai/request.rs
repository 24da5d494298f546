//! Request normalization
//!
//! Two phases: [`parse_body`] checks presence and JSON syntax before routing,
//! [`normalize`] builds the typed [`ChatRequest`] once the protocol (and so
//! its defaults) is known.

use super::types::{ChatRequest, ChatRequestBody};
use crate::config::BedrockConfig;
use crate::error::{AppError, AppResult};
use crate::router::Protocol;
use crate::translate::NativeRetrieveRequest;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const MISSING_BODY: &str = "Missing request body";
pub const INVALID_JSON: &str = "Invalid JSON in request body";

/// Parse the raw body into JSON
///
/// # Errors
///
/// Absent, empty or `null` body → "Missing request body"; anything that is
/// not JSON → "Invalid JSON in request body".
pub fn parse_body(body: Option<&str>) -> AppResult<Value> {
    let raw = body
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::Validation(MISSING_BODY.to_string()))?;

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Err(AppError::Validation(MISSING_BODY.to_string())),
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::debug!(error = %e, "Request body is not valid JSON");
            Err(AppError::Validation(INVALID_JSON.to_string()))
        }
    }
}

fn shaped<T: DeserializeOwned>(value: Value) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
}

/// OpenAI chat body (unknown fields ignored)
pub fn chat_body(value: Value) -> AppResult<ChatRequestBody> {
    shaped(value)
}

/// `RetrieveAndGenerate` body of the native route
pub fn native_body(value: Value) -> AppResult<NativeRetrieveRequest> {
    shaped(value)
}

/// Build the immutable request for `protocol`
///
/// Missing `model`/`model_arn` fall back to the configured defaults; the
/// knowledge base id is the one the router resolved.
///
/// # Errors
///
/// Returns `AppError::Validation` for an empty message list or invalid
/// sampling parameters.
pub fn normalize(
    body: ChatRequestBody,
    protocol: &Protocol,
    bedrock: &BedrockConfig,
) -> AppResult<ChatRequest> {
    let model = body
        .model
        .filter(|m| !m.trim().is_empty())
        .or_else(|| bedrock.default_model_id().map(str::to_string))
        .unwrap_or_default();

    let mut builder = ChatRequest::builder()
        .model(model)
        .messages(body.messages);

    if let Some(temperature) = body.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = body.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    if let Some(top_p) = body.top_p {
        builder = builder.top_p(top_p);
    }
    if let Some(stop) = body.stop {
        builder = builder.stop(stop);
    }
    if let Some(model_arn) = body
        .model_arn
        .filter(|arn| !arn.trim().is_empty())
        .or_else(|| bedrock.default_model_arn().map(str::to_string))
    {
        builder = builder.model_arn(model_arn);
    }
    if let Some(knowledge_base_id) = protocol.knowledge_base_id() {
        builder = builder.knowledge_base_id(knowledge_base_id);
    }

    builder.build(protocol.defaults())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::str::FromStr;

    fn bedrock(toml: &str) -> BedrockConfig {
        Config::from_str(toml).unwrap().bedrock
    }

    fn validation_message(result: AppResult<impl std::fmt::Debug>) -> String {
        match result {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_body() {
        assert_eq!(validation_message(parse_body(None)), MISSING_BODY);
        assert_eq!(validation_message(parse_body(Some(""))), MISSING_BODY);
        assert_eq!(validation_message(parse_body(Some("  \n"))), MISSING_BODY);
        assert_eq!(validation_message(parse_body(Some("null"))), MISSING_BODY);
    }

    #[test]
    fn test_invalid_json() {
        assert_eq!(validation_message(parse_body(Some("{not json"))), INVALID_JSON);
    }

    #[test]
    fn test_shape_errors_are_reported() {
        let value = parse_body(Some(r#"{"messages": [{"role": "tool", "content": "x"}]}"#)).unwrap();
        let msg = validation_message(chat_body(value));
        assert!(msg.starts_with("Invalid request body:"), "{msg}");

        let value = parse_body(Some(r#"{"messages": "hello"}"#)).unwrap();
        assert!(chat_body(value).is_err());
    }

    #[test]
    fn test_normalize_applies_protocol_defaults() {
        let body = chat_body(
            parse_body(Some(r#"{"model": "m", "messages": [{"role": "user", "content": "hi"}]}"#))
                .unwrap(),
        )
        .unwrap();

        let direct = normalize(body.clone(), &Protocol::Direct, &BedrockConfig::default()).unwrap();
        assert_eq!(direct.max_tokens(), 4096);
        assert_eq!(direct.temperature(), 0.7);
        assert_eq!(direct.top_p(), 0.9);
        assert_eq!(direct.knowledge_base_id(), None);

        let kb = Protocol::KnowledgeBase {
            knowledge_base_id: "KB1".to_string(),
        };
        let kb_request = normalize(body, &kb, &BedrockConfig::default()).unwrap();
        assert_eq!(kb_request.max_tokens(), 4000);
        assert_eq!(kb_request.knowledge_base_id(), Some("KB1"));
    }

    #[test]
    fn test_normalize_keeps_explicit_values() {
        let body = chat_body(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.0,
            "max_tokens": 12,
            "top_p": 1.0,
            "stop": "END",
            "stream": false
        }))
        .unwrap();
        let request = normalize(body, &Protocol::Direct, &BedrockConfig::default()).unwrap();

        assert_eq!(request.temperature(), 0.0);
        assert_eq!(request.max_tokens(), 12);
        assert_eq!(request.top_p(), 1.0);
        assert_eq!(request.stop(), Some(&["END".to_string()][..]));
    }

    #[test]
    fn test_normalize_uses_configured_model_defaults() {
        let bedrock = bedrock(
            "[bedrock]\ndefault_model_id = \"anthropic.claude-3-haiku\"\ndefault_model_arn = \"arn:model\"\n",
        );
        let body = chat_body(serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        let request = normalize(body, &Protocol::Direct, &bedrock).unwrap();

        assert_eq!(request.model(), "anthropic.claude-3-haiku");
        assert_eq!(request.model_arn(), Some("arn:model"));
    }

    #[test]
    fn test_normalize_rejects_empty_messages() {
        let body = chat_body(serde_json::json!({"model": "m", "messages": []})).unwrap();
        let result = normalize(body, &Protocol::Direct, &BedrockConfig::default());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_native_body() {
        let native = native_body(serde_json::json!({
            "input": {"text": "q"},
            "retrieveAndGenerateConfiguration": {"type": "KNOWLEDGE_BASE"}
        }))
        .unwrap();
        assert_eq!(native.input["text"], "q");
        assert_eq!(native.retrieve_and_generate_configuration["type"], "KNOWLEDGE_BASE");
    }
}
