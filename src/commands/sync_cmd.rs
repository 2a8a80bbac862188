//! Sync CLI commands for reconciling the cache with the server.

use clap::{Args, Subcommand};

use crate::api::EventApiClient;
use crate::config::Config;
use crate::db::{EventStore, EventTypeStore};
use crate::sync::{SyncEngine, SyncRequest};

/// Sync the local cache with the remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Search keyword to sync a filtered subset
    #[arg(long, short)]
    keyword: Option<String>,

    /// Event type id to sync a filtered subset
    #[arg(long)]
    type_id: Option<i64>,

    /// Delete local events that are absent remotely
    #[arg(long)]
    allow_local_deletion: bool,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration
    Status,
}

impl SyncCommand {
    pub async fn run(
        &self,
        client: &EventApiClient,
        store: &EventStore,
        types: &EventTypeStore,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(client, store, types).await,
            Some(SyncSubcommand::Status) => {
                self.status(config);
                Ok(())
            }
        }
    }

    async fn sync(
        &self,
        client: &EventApiClient,
        store: &EventStore,
        types: &EventTypeStore,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let engine = SyncEngine::new(client.clone(), store.clone(), types.clone());
        let request = SyncRequest {
            keyword: self.keyword.clone(),
            type_id: self.type_id,
            allow_local_deletion: self.allow_local_deletion,
        };

        println!("Syncing with server...");
        println!();

        let outcome = engine.sync(&request).await?;

        println!("  {} added", outcome.added);
        println!("  {} updated", outcome.updated);
        println!("  {} deleted", outcome.deleted);
        println!();
        if outcome.added + outcome.updated + outcome.deleted == 0 {
            println!("Already up to date ({} remote events).", outcome.total_remote);
        } else {
            println!("Sync complete ({} remote events).", outcome.total_remote);
        }

        Ok(())
    }

    fn status(&self, config: &Config) {
        println!("Sync Configuration");
        println!("==================");
        println!();

        match &config.api.base_url {
            Some(url) => {
                println!("Server:   {}", url);
                println!("Database: {}", config.database_path.value.display());
            }
            None => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  api:");
                println!("    base_url: \"http://localhost:5000\"");
                println!();
                println!("Or set the TODOEVENT_API_URL environment variable.");
            }
        }
    }
}
