//! bedrock-gateway - OpenAI-compatible chat completions for Amazon Bedrock
//!
//! Translates OpenAI chat completion requests into one of three Bedrock
//! protocols (`InvokeModel`, `Converse`, `RetrieveAndGenerate`) and maps the
//! reply back into the OpenAI response shape.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod router;
pub mod telemetry;
pub mod translate;
