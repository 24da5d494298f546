//! Command-line interface for the gateway
//!
//! Provides argument parsing and subcommand handling for the binary.

use clap::{Parser, Subcommand};

/// OpenAI-compatible chat completions gateway for Amazon Bedrock
#[derive(Parser)]
#[command(name = "bedrock-gateway")]
#[command(version)]
#[command(about = "OpenAI-compatible chat completions gateway for Amazon Bedrock")]
#[command(
    long_about = "bedrock-gateway translates OpenAI chat completion requests into Bedrock \
    InvokeModel, Converse and RetrieveAndGenerate calls and maps the replies back."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# bedrock-gateway Configuration
# ============================
#
# Every value below is optional; the defaults are shown.
# AWS_REGION, KNOWLEDGE_BASE_ID and AWS_BEARER_TOKEN_BEDROCK in the
# environment override the corresponding [bedrock] settings.
# Without AWS_BEARER_TOKEN_BEDROCK, requests are SigV4-signed with the AWS
# default credential chain (env keys, ~/.aws profile, IAM role).

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3000

# Deadline for the outbound Bedrock call in seconds (max 900)
request_timeout_seconds = 120

# ─────────────────────────────────────────────────────────────────────────────
# BEDROCK
# ─────────────────────────────────────────────────────────────────────────────

[bedrock]
region = "us-east-1"

# Default knowledge base for /v1/kb/completions and /v2/kb/completions
# knowledge_base_id = "ABCDEFGHIJ"

# Model used when a request omits "model"
# default_model_id = "anthropic.claude-3-haiku-20240307-v1:0"

# Generation model for knowledge base queries without "model_arn"
# default_model_arn = "arn:aws:bedrock:us-east-1::foundation-model/anthropic.claude-3-haiku-20240307-v1:0"

# Override service URLs (defaults derive from region)
# runtime_endpoint = "https://bedrock-runtime.us-east-1.amazonaws.com"
# agent_runtime_endpoint = "https://bedrock-agent-runtime.us-east-1.amazonaws.com"

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING
# ─────────────────────────────────────────────────────────────────────────────

[routing]
# What /kb/completions does when no knowledge base id is available:
#   - "chat": serve it as a plain chat completion for the same API version
#   - "reject": answer 400
kb_fallback = "chat"

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use clap::CommandFactory;
    use std::str::FromStr;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["bedrock-gateway"]);
        assert_eq!(cli.config, "config.toml");
        assert!(cli.command.is_none());
    }

    #[test]
    fn custom_config_path() {
        let cli = Cli::parse_from(["bedrock-gateway", "--config", "custom.toml"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["bedrock-gateway", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: Some(ref path) }) if path == "my-config.toml"
        ));
    }

    #[test]
    fn template_is_a_valid_config() {
        let config = Config::from_str(generate_config_template());
        assert!(
            config.is_ok(),
            "Template should be a valid config: {:?}",
            config.err()
        );
    }

    #[test]
    fn template_has_all_sections() {
        let template = generate_config_template();
        assert!(template.contains("[server]"));
        assert!(template.contains("[bedrock]"));
        assert!(template.contains("[routing]"));
        assert!(template.contains("[observability]"));
    }
}
