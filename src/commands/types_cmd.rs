use clap::{Args, Subcommand};
use std::sync::Arc;

use crate::api::EventApiClient;
use crate::repo::EventRepository;

use super::event::OutputFormat;

/// Manage event types
#[derive(Args)]
pub struct TypesCommand {
    #[command(subcommand)]
    pub command: TypesSubcommand,
}

#[derive(Subcommand)]
pub enum TypesSubcommand {
    /// List available event types
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl TypesCommand {
    pub async fn run(
        &self,
        repo: &Arc<EventRepository<EventApiClient>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            TypesSubcommand::List { format } => {
                let types = repo.list_event_types().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&types)?);
                    }
                    OutputFormat::Text => {
                        if types.is_empty() {
                            println!("No event types found");
                        }
                        for event_type in &types {
                            if event_type.description.is_empty() {
                                println!("#{:<4} {}", event_type.id, event_type.name);
                            } else {
                                println!(
                                    "#{:<4} {:<20} {}",
                                    event_type.id, event_type.name, event_type.description
                                );
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
