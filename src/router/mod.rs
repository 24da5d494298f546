//! Endpoint routing for the gateway
//!
//! The request path is parsed once into a [`RouteKey`]; the key plus the
//! available knowledge base id then resolve the Bedrock [`Protocol`].
//!
//! | path                   | protocol                                     |
//! |------------------------|----------------------------------------------|
//! | `/v1/chat/completions` | Direct                                       |
//! | `/v1/kb/completions`   | KnowledgeBase (kb id required)               |
//! | `/v2/chat/completions` | Converse                                     |
//! | `/v2/kb/completions`   | Converse + knowledge base (kb id required)   |
//! | `/retrieveAndGenerate` | native pass-through                          |

use crate::error::{AppError, AppResult};
use crate::translate::{
    self, ConverseTranslator, DirectTranslator, InferenceDefaults, KnowledgeBaseTranslator,
    Translator,
};
use serde::{Deserialize, Serialize};

/// API generation encoded in the path prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

/// Resource addressed under the version prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    ChatCompletions,
    KbCompletions,
}

/// Parsed request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKey {
    /// `POST /retrieveAndGenerate`
    Native,
    OpenAi {
        version: ApiVersion,
        resource: Resource,
    },
}

impl RouteKey {
    /// Exact-match parse; one trailing slash is tolerated
    ///
    /// # Errors
    ///
    /// Returns `AppError::Route` for any other path.
    pub fn parse(path: &str) -> AppResult<Self> {
        let normalized = path.strip_suffix('/').unwrap_or(path);

        let key = match normalized {
            "/retrieveAndGenerate" => Self::Native,
            "/v1/chat/completions" => Self::openai(ApiVersion::V1, Resource::ChatCompletions),
            "/v1/kb/completions" => Self::openai(ApiVersion::V1, Resource::KbCompletions),
            "/v2/chat/completions" => Self::openai(ApiVersion::V2, Resource::ChatCompletions),
            "/v2/kb/completions" => Self::openai(ApiVersion::V2, Resource::KbCompletions),
            _ => return Err(AppError::Route(path.to_string())),
        };
        Ok(key)
    }

    fn openai(version: ApiVersion, resource: Resource) -> Self {
        Self::OpenAi { version, resource }
    }
}

/// What to do when a kb path is called without any knowledge base id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KbFallback {
    /// Serve the request with the chat protocol of the same version
    #[default]
    Chat,
    /// Reject with a 400
    Reject,
}

/// Bedrock protocol serving an OpenAI-compatible request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    Direct,
    Converse { knowledge_base_id: Option<String> },
    KnowledgeBase { knowledge_base_id: String },
}

impl Protocol {
    /// Sampling defaults applied during normalization
    pub fn defaults(&self) -> InferenceDefaults {
        match self {
            Self::Direct | Self::Converse { .. } => InferenceDefaults::CHAT,
            Self::KnowledgeBase { .. } => InferenceDefaults::KNOWLEDGE_BASE,
        }
    }

    /// Label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct => translate::direct::PROTOCOL,
            Self::Converse { .. } => translate::converse::PROTOCOL,
            Self::KnowledgeBase { .. } => translate::knowledge_base::PROTOCOL,
        }
    }

    pub fn knowledge_base_id(&self) -> Option<&str> {
        match self {
            Self::Direct => None,
            Self::Converse { knowledge_base_id } => knowledge_base_id.as_deref(),
            Self::KnowledgeBase { knowledge_base_id } => Some(knowledge_base_id),
        }
    }

    pub fn translator(&self) -> Box<dyn Translator> {
        match self {
            Self::Direct => Box::new(DirectTranslator),
            Self::Converse { .. } => Box::new(ConverseTranslator),
            Self::KnowledgeBase { knowledge_base_id } => {
                Box::new(KnowledgeBaseTranslator::new(knowledge_base_id.clone()))
            }
        }
    }
}

/// Resolves the protocol for an OpenAI-compatible route
#[derive(Debug, Clone, Default)]
pub struct EndpointRouter {
    fallback: KbFallback,
    default_knowledge_base_id: Option<String>,
}

impl EndpointRouter {
    pub fn new(fallback: KbFallback, default_knowledge_base_id: Option<String>) -> Self {
        Self {
            fallback,
            default_knowledge_base_id: default_knowledge_base_id.filter(|id| !id.trim().is_empty()),
        }
    }

    /// Pick the protocol for `version`/`resource`
    ///
    /// `requested_kb` (from the request body) takes precedence over the
    /// configured knowledge base.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when a kb path has no knowledge base id
    /// and the fallback policy is [`KbFallback::Reject`].
    pub fn resolve(
        &self,
        version: ApiVersion,
        resource: Resource,
        requested_kb: Option<&str>,
    ) -> AppResult<Protocol> {
        if resource == Resource::ChatCompletions {
            return Ok(Self::chat_protocol(version));
        }

        let knowledge_base_id = requested_kb
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or(self.default_knowledge_base_id.as_deref())
            .map(str::to_string);

        match (version, knowledge_base_id) {
            (ApiVersion::V1, Some(knowledge_base_id)) => {
                Ok(Protocol::KnowledgeBase { knowledge_base_id })
            }
            (ApiVersion::V2, Some(knowledge_base_id)) => Ok(Protocol::Converse {
                knowledge_base_id: Some(knowledge_base_id),
            }),
            (version, None) => match self.fallback {
                KbFallback::Chat => {
                    tracing::warn!(
                        version = ?version,
                        "No knowledge base id configured, serving kb completion without retrieval"
                    );
                    Ok(Self::chat_protocol(version))
                }
                KbFallback::Reject => Err(AppError::Validation(
                    "knowledge_base_id is required for kb completions".to_string(),
                )),
            },
        }
    }

    fn chat_protocol(version: ApiVersion) -> Protocol {
        match version {
            ApiVersion::V1 => Protocol::Direct,
            ApiVersion::V2 => Protocol::Converse {
                knowledge_base_id: None,
            },
        }
    }
}
