//! Bedrock REST client
//!
//! Talks to the `bedrock-runtime` (`InvokeModel`, `Converse`) and
//! `bedrock-agent-runtime` (`RetrieveAndGenerate`) JSON endpoints.
//!
//! A configured Bedrock API key is sent as a bearer token. Without one,
//! requests are SigV4-signed with credentials from the AWS default chain
//! (environment, shared profile, web identity, ECS/IMDS role).

use super::{BedrockClient, ProviderError};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::translate::{
    ConversePayload, ConverseResponse, InvokeModelPayload, InvokeModelResponse,
    NativeRetrieveRequest, NativeRetrieveResponse, RetrieveAndGeneratePayload,
    RetrieveAndGenerateResponse,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::OnceCell;

/// Header carrying the vendor error code, e.g. `ThrottlingException:http://...`
pub const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// SigV4 service name for both runtime endpoints
pub const SIGNING_NAME: &str = "bedrock";

const UNKNOWN_ERROR_CODE: &str = "Unknown";

const JSON: &str = "application/json";

/// How outbound requests are authenticated
#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    /// Provider resolved from the default chain on first use
    SigV4 {
        region: String,
        credentials: Arc<OnceCell<Option<SharedCredentialsProvider>>>,
    },
}

/// `BedrockClient` over HTTPS
#[derive(Debug, Clone)]
pub struct HttpBedrockClient {
    http: reqwest::Client,
    runtime: Url,
    agent_runtime: Url,
    auth: Auth,
}

impl HttpBedrockClient {
    /// Build the client from configuration
    ///
    /// The request deadline is `server.request_timeout_seconds`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an endpoint is not a valid base URL or
    /// the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let runtime = parse_base_url(&config.bedrock.runtime_endpoint())?;
        let agent_runtime = parse_base_url(&config.bedrock.agent_runtime_endpoint())?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.request_timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let auth = match config.bedrock.api_key() {
            Some(key) => Auth::Bearer(key.to_string()),
            None => {
                tracing::info!(
                    region = %config.bedrock.region(),
                    "No Bedrock API key configured, signing requests with AWS credentials"
                );
                Auth::SigV4 {
                    region: config.bedrock.region().to_string(),
                    credentials: Arc::new(OnceCell::new()),
                }
            }
        };

        Ok(Self {
            http,
            runtime,
            agent_runtime,
            auth,
        })
    }

    /// Sign with `credentials` instead of the default chain
    ///
    /// Has no effect when an API key is configured.
    pub fn with_credentials(mut self, credentials: impl ProvideCredentials + 'static) -> Self {
        if let Auth::SigV4 {
            credentials: slot, ..
        } = &mut self.auth
        {
            *slot = Arc::new(OnceCell::from(Some(SharedCredentialsProvider::new(
                credentials,
            ))));
        }
        self
    }

    /// `{runtime}/model/{modelId}/{action}` with the model id as one segment
    fn model_url(&self, model_id: &str, action: &str) -> Result<Url, ProviderError> {
        let mut url = self.runtime.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Transport(format!("Invalid runtime endpoint {}", self.runtime)))?
            .pop_if_empty()
            .extend(["model", model_id, action]);
        Ok(url)
    }

    fn agent_url(&self, action: &str) -> Result<Url, ProviderError> {
        let mut url = self.agent_runtime.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ProviderError::Transport(format!(
                    "Invalid agent runtime endpoint {}",
                    self.agent_runtime
                ))
            })?
            .pop_if_empty()
            .push(action);
        Ok(url)
    }

    async fn post_json<B, R>(&self, url: Url, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ProviderError::Transport(format!("Failed to encode request: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));

        match &self.auth {
            Auth::Bearer(key) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
                    ProviderError::Credentials("API key is not a valid header value".to_string())
                })?;
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            Auth::SigV4 {
                region,
                credentials,
            } => {
                let provider = credentials
                    .get_or_init(|| default_credentials(region.clone()))
                    .await
                    .as_ref()
                    .ok_or_else(|| {
                        ProviderError::Credentials(
                            "No AWS credential provider is configured".to_string(),
                        )
                    })?;
                let signed = sigv4_headers(provider, region, &url, &headers, &payload).await?;
                headers.extend(signed);
            }
        }

        let response = self
            .http
            .post(url.clone())
            .headers(headers)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                ProviderError::Transport(format!("Request to {} failed: {}", url.path(), e))
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|e| {
            ProviderError::Transport(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(service_error(status, &headers, &bytes));
        }

        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Credential provider of the AWS default chain for `region`
async fn default_credentials(region: String) -> Option<SharedCredentialsProvider> {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region))
        .load()
        .await
        .credentials_provider()
}

/// SigV4 headers (`authorization`, `x-amz-date`, optional `x-amz-security-token`)
async fn sigv4_headers(
    provider: &SharedCredentialsProvider,
    region: &str,
    url: &Url,
    headers: &HeaderMap,
    payload: &[u8],
) -> Result<HeaderMap, ProviderError> {
    let credentials = provider
        .provide_credentials()
        .await
        .map_err(|e| ProviderError::Credentials(format!("Failed to load AWS credentials: {}", e)))?;
    let identity = credentials.into();

    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SIGNING_NAME)
        .time(SystemTime::now())
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| ProviderError::Credentials(format!("Invalid signing parameters: {}", e)))?
        .into();

    let unsigned = headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)));
    let signable = SignableRequest::new("POST", url.as_str(), unsigned, SignableBody::Bytes(payload))
        .map_err(|e| ProviderError::Credentials(format!("Failed to sign request: {}", e)))?;

    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| ProviderError::Credentials(format!("Failed to sign request: {}", e)))?
        .into_parts();

    let mut signed = HeaderMap::new();
    for (name, value) in instructions.headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProviderError::Credentials(format!("Invalid signed header: {}", e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ProviderError::Credentials(format!("Invalid signed header: {}", e)))?;
        signed.insert(name, value);
    }
    Ok(signed)
}

fn parse_base_url(raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| AppError::Config(format!("Invalid Bedrock endpoint '{}': {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(AppError::Config(format!(
            "Invalid Bedrock endpoint '{}': not a base URL",
            raw
        )));
    }
    Ok(url)
}

/// Classify a non-2xx Bedrock reply
///
/// Code: `x-amzn-ErrorType` header (before the first `:`), else the body's
/// `__type`/`code` (after the last `#`), else `Unknown`. Message: the body's
/// `message`/`Message`, else the raw body.
pub fn service_error(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> ProviderError {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();

    let header_code = headers
        .get(ERROR_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(':').next())
        .map(str::trim)
        .filter(|code| !code.is_empty());

    let body_code = parsed
        .as_ref()
        .and_then(|v| v.get("__type").or_else(|| v.get("code")))
        .and_then(Value::as_str)
        .and_then(|code| code.rsplit('#').next())
        .map(str::trim)
        .filter(|code| !code.is_empty());

    let code = header_code
        .or(body_code)
        .unwrap_or(UNKNOWN_ERROR_CODE)
        .to_string();

    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("Message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let raw = String::from_utf8_lossy(body).trim().to_string();
            if raw.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                raw
            }
        });

    ProviderError::Service {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl BedrockClient for HttpBedrockClient {
    async fn invoke_model(
        &self,
        payload: &InvokeModelPayload,
    ) -> Result<InvokeModelResponse, ProviderError> {
        let url = self.model_url(&payload.model_id, "invoke")?;
        self.post_json(url, &payload.body).await
    }

    async fn converse(&self, payload: &ConversePayload) -> Result<ConverseResponse, ProviderError> {
        let url = self.model_url(&payload.model_id, "converse")?;
        self.post_json(url, payload).await
    }

    async fn retrieve_and_generate(
        &self,
        payload: &RetrieveAndGeneratePayload,
    ) -> Result<RetrieveAndGenerateResponse, ProviderError> {
        let url = self.agent_url("retrieveAndGenerate")?;
        self.post_json(url, payload).await
    }

    async fn retrieve_and_generate_native(
        &self,
        request: &NativeRetrieveRequest,
    ) -> Result<NativeRetrieveResponse, ProviderError> {
        let url = self.agent_url("retrieveAndGenerate")?;
        self.post_json(url, request).await
    }
}
