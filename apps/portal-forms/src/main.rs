mod cli;

use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use portal_forms::config::Config;
use portal_forms::db::{create_pool, run_migrations};
use portal_forms::AppState;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Logs go to stderr; stdout carries the JSON result
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting portal-forms v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url, config.database_max_connections).await?;

    let command = match cli.command {
        Commands::Migrate => {
            run_migrations(&db).await?;
            println!("{}", cli::render(&serde_json::json!({ "migrated": true }), cli.compact));
            return Ok(());
        }
        Commands::Form(command) => command,
    };

    let state = AppState::from_pool(db, &config)?;
    let outcome = cli::execute(&state, command).await;

    for delivery in state.events.drain() {
        if let Err(e) = delivery.await {
            warn!("Notification delivery task failed: {e}");
        }
    }

    match outcome {
        Ok(output) => {
            println!("{}", cli::render(&output, cli.compact));
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", cli::render(&err.to_body(), cli.compact));
            process::exit(cli::exit_code(&err));
        }
    }
}
