//! Request pipeline
//!
//! `Event` → body check → route → normalize → translate → invoke → translate
//! back. [`Gateway::handle`] knows nothing about HTTP so it can be driven by
//! the axum server or directly by tests.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::handlers::openai::request::{chat_body, native_body, normalize, parse_body};
use crate::handlers::openai::types::ChatResponse;
use crate::metrics::Metrics;
use crate::middleware::RequestId;
use crate::provider::{BedrockClient, Invoker, NATIVE_PROTOCOL};
use crate::router::{EndpointRouter, RouteKey};
use crate::translate::NativeRetrieveResponse;
use serde::Serialize;
use std::sync::Arc;

/// Protocol label for requests rejected before a protocol is known
pub const UNROUTED: &str = "unrouted";

/// Inbound request as seen by the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub path: String,
    pub body: Option<String>,
}

impl Event {
    pub fn new(path: impl Into<String>, body: Option<String>) -> Self {
        Self {
            path: path.into(),
            body,
        }
    }
}

/// Successful reply body
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GatewayReply {
    Chat(ChatResponse),
    Native(NativeRetrieveResponse),
}

/// Stateless pipeline shared by every request
#[derive(Clone)]
pub struct Gateway {
    config: Arc<Config>,
    router: EndpointRouter,
    invoker: Invoker,
    metrics: Arc<Metrics>,
}

impl Gateway {
    pub fn new(config: Arc<Config>, client: Arc<dyn BedrockClient>, metrics: Arc<Metrics>) -> Self {
        let router = EndpointRouter::new(
            config.routing.kb_fallback,
            config.bedrock.knowledge_base_id().map(str::to_string),
        );
        let invoker = Invoker::new(client, metrics.clone());

        Self {
            config,
            router,
            invoker,
            metrics,
        }
    }

    /// Run the full pipeline for one event
    ///
    /// Records `requests_total` with the resolved protocol (or `unrouted`).
    ///
    /// # Errors
    ///
    /// Any `AppError`; the caller renders it as the error envelope.
    pub async fn handle(&self, event: &Event, request_id: RequestId) -> AppResult<GatewayReply> {
        let mut protocol = UNROUTED;
        let result = self.run(event, request_id, &mut protocol).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.status_code().as_u16(),
        };
        self.metrics.record_request(protocol, status);

        match &result {
            Ok(_) => tracing::info!(
                request_id = %request_id,
                path = %event.path,
                protocol = protocol,
                "Request completed"
            ),
            Err(e) => tracing::warn!(
                request_id = %request_id,
                path = %event.path,
                protocol = protocol,
                status = status,
                error = %e,
                "Request failed"
            ),
        }

        result
    }

    async fn run(
        &self,
        event: &Event,
        request_id: RequestId,
        protocol_label: &mut &'static str,
    ) -> AppResult<GatewayReply> {
        let value = parse_body(event.body.as_deref())?;

        let (version, resource) = match RouteKey::parse(&event.path)? {
            RouteKey::Native => {
                *protocol_label = NATIVE_PROTOCOL;
                let request = native_body(value)?;
                let reply = self.invoker.retrieve_and_generate_native(&request).await?;
                return Ok(GatewayReply::Native(reply));
            }
            RouteKey::OpenAi { version, resource } => (version, resource),
        };

        let body = chat_body(value)?;
        let protocol = self
            .router
            .resolve(version, resource, body.knowledge_base_id.as_deref())?;
        *protocol_label = protocol.label();

        let request = normalize(body, &protocol, &self.config.bedrock)?;

        tracing::debug!(
            request_id = %request_id,
            protocol = protocol.label(),
            model = %request.model(),
            knowledge_base_id = ?protocol.knowledge_base_id(),
            messages = request.messages().len(),
            "Request normalized"
        );

        let translator = protocol.translator();
        let payload = translator.to_provider(&request)?;
        let response = self.invoker.invoke(&payload).await?;
        let chat = translator.from_provider(&request, response)?;

        Ok(GatewayReply::Chat(chat))
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Failure before any protocol could be resolved
pub fn unrouted(error: AppError, metrics: &Metrics) -> AppError {
    metrics.record_request(UNROUTED, error.status_code().as_u16());
    error
}
