use agent_orchestrator::{agent::Orchestrator, config::AgentConfig};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "bye"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so answers stay readable on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Agent orchestrator console starting");

    let config = AgentConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    match orchestrator.backend_mode().await {
        Some(mode) => println!("Model backend: {}", mode),
        None => println!("Model backend: none available (queries will report an error)"),
    }
    println!("Type a question, or one of {} to leave.", EXIT_COMMANDS.join("/"));

    let mut stdout = io::stdout();
    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        stdout.write_all(b"\nYou: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();

        if query.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&query.to_lowercase().as_str()) {
            break;
        }

        let response = orchestrator.execute_query(query).await;
        let mode = response.mode.as_deref().unwrap_or("-");
        println!("\nAgent [{}]: {}", mode, response.content);
    }

    println!("Goodbye!");
    Ok(())
}
