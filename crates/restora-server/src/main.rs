//! Restora: quota-limited image restoration server.

use std::sync::Arc;

use restora_core::RestoraConfig;
use restora_server::{build_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Handle CLI subcommands
    if args.len() > 1 {
        match args[1].as_str() {
            "--check-config" | "check-config" => {
                let config = RestoraConfig::from_env()?;
                println!("{}", serde_json::to_string_pretty(&config)?);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("Restora: quota-limited image restoration server");
                println!();
                println!("Usage: restora [command]");
                println!();
                println!("Commands:");
                println!("  (none)          Start the server");
                println!("  check-config    Load configuration from the environment and print it");
                println!("  help            Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'restora help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    // Initialize configuration
    let config = RestoraConfig::from_env()?;
    let port = config.port;

    // Build application state
    let state = Arc::new(AppState::from_config(config).await?);

    // Build router
    let app = build_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Restora server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
