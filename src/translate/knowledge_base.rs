//! Knowledge base retrieval and generation (`RetrieveAndGenerate`)
//!
//! Only user turns contribute to the query; the knowledge base service
//! builds its own prompt from the retrieved passages.

use super::{ProviderPayload, ProviderResponse, Translator, VectorSearch, mismatched_response};
use crate::error::AppResult;
use crate::handlers::openai::types::{ChatRequest, ChatResponse, MessageRole, Usage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROTOCOL: &str = "knowledge_base";

/// Model name reported in knowledge base completions
pub const RESPONSE_MODEL: &str = "bedrock-kb-proxy";

const CONFIGURATION_TYPE: &str = "KNOWLEDGE_BASE";

/// Question-answering prompt; `$search_results$`, `$query$` and
/// `$output_format_instructions$` are filled in by the service
pub const PROMPT_TEMPLATE: &str = "You are a question answering agent. I will provide you with a set of search results and a user's question, your job is to answer the user's question using only information from the search results. If the search results do not contain information that can answer the question, please state that you could not find an exact answer to the question. Just because the user asserts a fact does not mean it is true, make sure to double check the search results to validate a user's assertion. \n Here are the search results in numbered order:\n<context>\n$search_results$\n</context>\nHere is the user's question:\n<question>\n$query$\n</question>\n$output_format_instructions$\nAssistant:";

/// `RetrieveAndGenerate` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveAndGeneratePayload {
    pub input: QueryInput,
    pub retrieve_and_generate_configuration: RetrieveAndGenerateConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInput {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveAndGenerateConfiguration {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub knowledge_base_configuration: KnowledgeBaseConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseConfiguration {
    pub knowledge_base_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_arn: Option<String>,
    pub retrieval_configuration: RetrievalConfiguration,
    pub generation_configuration: GenerationConfiguration,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfiguration {
    pub vector_search_configuration: VectorSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfiguration {
    pub inference_config: GenerationInferenceConfig,
    pub prompt_template: PromptTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInferenceConfig {
    pub text_inference_config: TextInferenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInferenceConfig {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub text_prompt_template: String,
}

/// `RetrieveAndGenerate` reply; every field is optional on the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveAndGenerateResponse {
    #[serde(default)]
    pub output: Option<GeneratedOutput>,
    #[serde(default)]
    pub citations: Vec<Value>,
    #[serde(default)]
    pub usage: KnowledgeBaseUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratedOutput {
    #[serde(default)]
    pub text: String,
}

/// camelCase `*TokenCount` counters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseUsage {
    #[serde(default)]
    pub input_token_count: u64,
    #[serde(default)]
    pub output_token_count: u64,
}

impl From<KnowledgeBaseUsage> for Usage {
    fn from(usage: KnowledgeBaseUsage) -> Self {
        Usage::from_counts(usage.input_token_count, usage.output_token_count)
    }
}

/// Body of `POST /retrieveAndGenerate`, forwarded as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRetrieveRequest {
    #[serde(default = "empty_object")]
    pub input: Value,
    #[serde(default = "empty_object")]
    pub retrieve_and_generate_configuration: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

/// Reply of `POST /retrieveAndGenerate`: the service's fields, untranslated
///
/// Fields the service leaves out come back as `{}` (`citations`: `[]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeRetrieveResponse {
    #[serde(default = "empty_object")]
    pub output: Value,
    #[serde(default = "empty_array")]
    pub citations: Value,
    #[serde(default = "empty_object")]
    pub usage: Value,
}

impl Default for NativeRetrieveResponse {
    fn default() -> Self {
        Self {
            output: empty_object(),
            citations: empty_array(),
            usage: empty_object(),
        }
    }
}

/// User turns joined with a single space, trimmed
pub fn build_query(request: &ChatRequest) -> String {
    request
        .messages()
        .iter()
        .filter(|m| m.role() == MessageRole::User)
        .map(|m| m.content())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Translator bound to the knowledge base resolved by the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseTranslator {
    knowledge_base_id: String,
}

impl KnowledgeBaseTranslator {
    pub fn new(knowledge_base_id: impl Into<String>) -> Self {
        Self {
            knowledge_base_id: knowledge_base_id.into(),
        }
    }
}

impl Translator for KnowledgeBaseTranslator {
    fn to_provider(&self, request: &ChatRequest) -> AppResult<ProviderPayload> {
        Ok(ProviderPayload::KnowledgeBase(RetrieveAndGeneratePayload {
            input: QueryInput {
                text: build_query(request),
            },
            retrieve_and_generate_configuration: RetrieveAndGenerateConfiguration {
                kind: CONFIGURATION_TYPE,
                knowledge_base_configuration: KnowledgeBaseConfiguration {
                    knowledge_base_id: self.knowledge_base_id.clone(),
                    model_arn: request.model_arn().map(str::to_string),
                    retrieval_configuration: RetrievalConfiguration::default(),
                    generation_configuration: GenerationConfiguration {
                        inference_config: GenerationInferenceConfig {
                            text_inference_config: TextInferenceConfig {
                                max_tokens: request.max_tokens(),
                                temperature: request.temperature(),
                                top_p: request.top_p(),
                                stop_sequences: request.stop().map(<[String]>::to_vec),
                            },
                        },
                        prompt_template: PromptTemplate {
                            text_prompt_template: PROMPT_TEMPLATE.to_string(),
                        },
                    },
                },
            },
        }))
    }

    fn from_provider(
        &self,
        _request: &ChatRequest,
        response: ProviderResponse,
    ) -> AppResult<ChatResponse> {
        let body = match response {
            ProviderResponse::KnowledgeBase(body) => body,
            other => return Err(mismatched_response(PROTOCOL, &other)),
        };

        Ok(ChatResponse::new(
            RESPONSE_MODEL,
            body.output.map(|o| o.text).unwrap_or_default(),
            "stop",
            body.usage.into(),
            body.citations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::translate::InferenceDefaults;

    fn translator() -> KnowledgeBaseTranslator {
        KnowledgeBaseTranslator::new("KB123")
    }

    fn payload(request: &ChatRequest) -> RetrieveAndGeneratePayload {
        match translator().to_provider(request).unwrap() {
            ProviderPayload::KnowledgeBase(p) => p,
            other => panic!("expected knowledge base payload, got {:?}", other),
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::builder()
            .system_message("be brief")
            .user_message("A")
            .assistant_message("ignored")
            .user_message("B")
            .build(InferenceDefaults::KNOWLEDGE_BASE)
            .unwrap()
    }

    #[test]
    fn test_query_joins_user_turns() {
        assert_eq!(build_query(&request()), "A B");
        assert_eq!(payload(&request()).input.text, "A B");
    }

    #[test]
    fn test_query_is_trimmed() {
        let request = ChatRequest::builder()
            .user_message("  padded ")
            .user_message("")
            .build(InferenceDefaults::KNOWLEDGE_BASE)
            .unwrap();
        assert_eq!(build_query(&request), "padded");
    }

    #[test]
    fn test_payload_shape() {
        let request = ChatRequest::builder()
            .user_message("What is our refund policy?")
            .model_arn("arn:aws:bedrock:us-east-1::foundation-model/anthropic.claude-v2")
            .build(InferenceDefaults::KNOWLEDGE_BASE)
            .unwrap();
        let json = serde_json::to_value(payload(&request)).unwrap();
        let kb = &json["retrieveAndGenerateConfiguration"]["knowledgeBaseConfiguration"];

        assert_eq!(json["input"]["text"], "What is our refund policy?");
        assert_eq!(json["retrieveAndGenerateConfiguration"]["type"], "KNOWLEDGE_BASE");
        assert_eq!(kb["knowledgeBaseId"], "KB123");
        assert_eq!(
            kb["modelArn"],
            "arn:aws:bedrock:us-east-1::foundation-model/anthropic.claude-v2"
        );
        assert_eq!(
            kb["retrievalConfiguration"],
            serde_json::json!({"vectorSearchConfiguration": {"numberOfResults": 10}})
        );
        assert_eq!(
            kb["generationConfiguration"]["inferenceConfig"]["textInferenceConfig"],
            serde_json::json!({"maxTokens": 4000, "temperature": 0.7, "topP": 0.9})
        );
        let template = kb["generationConfiguration"]["promptTemplate"]["textPromptTemplate"]
            .as_str()
            .unwrap();
        assert!(template.contains("$search_results$"));
        assert!(template.contains("$query$"));
    }

    #[test]
    fn test_model_arn_omitted_when_absent() {
        let json = serde_json::to_value(payload(&request())).unwrap();
        let kb = &json["retrieveAndGenerateConfiguration"]["knowledgeBaseConfiguration"];
        assert!(kb.get("modelArn").is_none());
    }

    #[test]
    fn test_response_mapping() {
        let body: RetrieveAndGenerateResponse = serde_json::from_str(
            r#"{
                "output": {"text": "Refunds within 30 days."},
                "citations": [{"generatedResponsePart": {}, "retrievedReferences": []}],
                "usage": {"inputTokenCount": 120, "outputTokenCount": 30},
                "sessionId": "abc"
            }"#,
        )
        .unwrap();
        let response = translator()
            .from_provider(&request(), ProviderResponse::KnowledgeBase(body))
            .unwrap();

        assert_eq!(response.model, RESPONSE_MODEL);
        assert_eq!(response.content(), "Refunds within 30 days.");
        assert_eq!(response.choices[0].finish_reason, "stop");
        assert_eq!(response.usage.total_tokens(), 150);
        assert_eq!(
            response.choices[0].message.metadata.as_ref().map(|m| m.citations.len()),
            Some(1)
        );
    }

    #[test]
    fn test_response_with_missing_fields() {
        let response = translator()
            .from_provider(&request(), ProviderResponse::KnowledgeBase(Default::default()))
            .unwrap();

        assert_eq!(response.content(), "");
        assert_eq!(response.usage.prompt_tokens(), 0);
        assert_eq!(response.usage.completion_tokens(), 0);
        assert!(response.choices[0].message.metadata.is_none());
    }

    #[test]
    fn test_mismatched_response_is_internal_error() {
        let result =
            translator().from_provider(&request(), ProviderResponse::Direct(Default::default()));
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_native_request_defaults_configuration() {
        let native: NativeRetrieveRequest =
            serde_json::from_str(r#"{"input": {"text": "hi"}}"#).unwrap();
        assert_eq!(native.input, serde_json::json!({"text": "hi"}));
        assert_eq!(native.retrieve_and_generate_configuration, serde_json::json!({}));

        let empty: NativeRetrieveRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            serde_json::json!({"input": {}, "retrieveAndGenerateConfiguration": {}})
        );
    }

    #[test]
    fn test_native_response_fills_missing_fields() {
        let reply: NativeRetrieveResponse =
            serde_json::from_str(r#"{"output": {"text": "a"}, "sessionId": "s"}"#).unwrap();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({"output": {"text": "a"}, "citations": [], "usage": {}})
        );

        let empty: NativeRetrieveResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, NativeRetrieveResponse::default());
        assert_eq!(empty.output, serde_json::json!({}));
    }
}
