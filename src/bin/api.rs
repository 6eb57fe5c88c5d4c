use agent_orchestrator::{agent::Orchestrator, api::start_server, config::AgentConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::from_env()?;

    info!("Agent Orchestrator - API Server");
    info!("Port: {}", config.api_port);

    if config.llm.gemini_api_key.is_none() {
        info!("GEMINI_API_KEY not set, remote fallback disabled");
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    match orchestrator.backend_mode().await {
        Some(mode) => info!(%mode, "Model backend selected"),
        None => info!("No model backend reachable yet"),
    }

    start_server(orchestrator, config.api_port).await?;

    Ok(())
}
