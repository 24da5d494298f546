//! bedrock-gateway HTTP server
//!
//! Serves the OpenAI-compatible endpoints and forwards each request to Bedrock.

use bedrock_gateway::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Without a config file, run on defaults plus environment overrides
    let config = if Path::new(&cli.config).exists() {
        Config::from_file(&cli.config)?
    } else {
        Config::from_env()?
    };

    telemetry::init(&config.observability.log_level);

    if !Path::new(&cli.config).exists() {
        tracing::info!(
            config_path = %cli.config,
            "Config file not found, using defaults and environment"
        );
    }

    let host = config.server.host.parse::<IpAddr>().unwrap_or_else(|e| {
        tracing::warn!(host = %config.server.host, error = %e, "Invalid host, binding 0.0.0.0");
        IpAddr::from([0, 0, 0, 0])
    });
    let addr = SocketAddr::from((host, config.server.port));

    tracing::info!(
        region = %config.bedrock.region(),
        knowledge_base_id = ?config.bedrock.knowledge_base_id(),
        default_model_id = ?config.bedrock.default_model_id(),
        kb_fallback = ?config.routing.kb_fallback,
        "Starting bedrock-gateway"
    );

    let state = AppState::new(Arc::new(config))?;
    let app = handlers::router(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
