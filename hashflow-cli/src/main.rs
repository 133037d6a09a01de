//! hashflow: inspect levels, evaluate pipelines and submit solutions.

mod commands;

use std::path::Path;

use clap::Parser;
use tracing::info;
use uuid::Uuid;

use hashflow_session::SessionConfig;

use commands::{Commands, Connection};

#[derive(Parser)]
#[command(name = "hashflow")]
#[command(about = "Bit-pipeline puzzles with a shared solution ledger")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "hashflow.yaml")]
    config: String,

    /// Ledger base URL (overrides config file)
    #[arg(long, env = "HASHFLOW_BASE_URL")]
    base_url: Option<String>,

    /// Ledger anon key (overrides config file)
    #[arg(long, env = "HASHFLOW_ANON_KEY")]
    anon_key: Option<String>,

    /// Player session token
    #[arg(long, env = "HASHFLOW_ACCESS_TOKEN")]
    access_token: Option<String>,

    /// Player ID, random if omitted
    #[arg(long, env = "HASHFLOW_PLAYER_ID")]
    player_id: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hashflow=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = if Path::new(&cli.config).exists() {
        info!(path = %cli.config, "Loading config");
        SessionConfig::load(&cli.config)?
    } else {
        SessionConfig::default()
    };

    if let Some(base_url) = cli.base_url {
        config.ledger.base_url = Some(base_url);
    }
    if let Some(anon_key) = cli.anon_key {
        config.ledger.anon_key = Some(anon_key);
    }

    let connection = Connection {
        access_token: cli.access_token,
        player_id: cli.player_id,
    };

    match commands::execute_command(cli.command, config, connection).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
