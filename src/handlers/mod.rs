//! HTTP handlers and router assembly

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::gateway::Gateway;
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::provider::{BedrockClient, HttpBedrockClient};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod health;
pub mod metrics;
pub mod openai;
pub mod proxy;

/// Paths served by the gateway pipeline
pub const GATEWAY_ROUTES: [&str; 5] = [
    "/retrieveAndGenerate",
    "/v1/chat/completions",
    "/v1/kb/completions",
    "/v2/chat/completions",
    "/v2/kb/completions",
];

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    gateway: Arc<Gateway>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create state with the HTTPS Bedrock client
    ///
    /// # Errors
    ///
    /// Returns an error if metrics registration or client construction fails.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let client = HttpBedrockClient::from_config(&config)?;
        Self::with_client(config, Arc::new(client))
    }

    /// Create state around an existing client (tests inject mocks here)
    pub fn with_client(config: Arc<Config>, client: Arc<dyn BedrockClient>) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("Failed to initialize metrics: {}", e))
        })?);
        let gateway = Arc::new(Gateway::new(config.clone(), client, metrics.clone()));

        Ok(Self {
            config,
            gateway,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Full application router
pub fn router(state: AppState) -> Router {
    let mut app: Router<AppState> = Router::new();
    for path in GATEWAY_ROUTES {
        app = app.route(path, post(proxy::handler).fallback(proxy::method_not_allowed));
    }

    app.route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .fallback(proxy::handler)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
