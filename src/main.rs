use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use todoevent::api::EventApiClient;
use todoevent::commands::{ConfigCommand, EventCommand, SyncCommand, TypesCommand};
use todoevent::config::Config;
use todoevent::db::{init_db, EventStore, EventTypeStore};
use todoevent::repo::EventRepository;

#[derive(Parser)]
#[command(name = "todoevent")]
#[command(version)]
#[command(about = "Manage events against a remote API with a local cache", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage events
    Event(EventCommand),

    /// Manage event types
    Types(TypesCommand),

    /// Sync the local cache with the server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Event(cmd)) => {
            let repo = build_repository(&config).await?;
            cmd.run(&repo).await?;
        }
        Some(Commands::Types(cmd)) => {
            let repo = build_repository(&config).await?;
            cmd.run(&repo).await?;
        }
        Some(Commands::Sync(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let store = EventStore::new(pool.clone());
            let types = EventTypeStore::new(pool);
            let client = EventApiClient::from_config(&config.api);
            cmd.run(&client, &store, &types, &config).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

async fn build_repository(
    config: &Config,
) -> Result<Arc<EventRepository<EventApiClient>>, Box<dyn std::error::Error>> {
    let pool = init_db(&config.database_path.value).await?;
    let store = EventStore::new(pool.clone());
    let types = EventTypeStore::new(pool);
    let client = EventApiClient::from_config(&config.api);
    Ok(Arc::new(EventRepository::new(
        client,
        store,
        types,
        config.api.clone(),
    )))
}
