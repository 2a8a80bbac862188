use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::EventApiClient;
use crate::models::EventDraft;
use crate::repo::{EventRepository, RepoError};
use crate::sync::{UploadEvent, UploadManager};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct EventCommand {
    #[command(subcommand)]
    pub command: EventSubcommand,
}

#[derive(Subcommand)]
pub enum EventSubcommand {
    /// Create a new event
    Create {
        /// Event title
        #[arg(long)]
        title: String,

        /// Event description
        #[arg(long)]
        description: String,

        /// Event type id
        #[arg(long)]
        type_id: i64,

        /// Start date/time (ISO-8601, e.g. 2024-06-01T09:00:00.000Z)
        #[arg(long)]
        start_date: String,

        /// Event location
        #[arg(long)]
        location: String,
    },

    /// List events
    List {
        /// Search keyword (matches title, description, location)
        #[arg(long, short)]
        keyword: Option<String>,

        /// Filter by event type id
        #[arg(long)]
        type_id: Option<i64>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show an event's details
    Show {
        /// Event id
        id: i64,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing event (unset flags keep current values)
    Update {
        /// Event id
        id: i64,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New event type id
        #[arg(long)]
        type_id: Option<i64>,

        /// New start date/time
        #[arg(long)]
        start_date: Option<String>,

        /// New location
        #[arg(long)]
        location: Option<String>,
    },

    /// Delete an event
    Delete {
        /// Event id
        id: i64,
    },

    /// Upload images for an event (max 5 per event)
    UploadImages {
        /// Event id
        id: i64,

        /// Image files (jpg, jpeg, png, gif, webp; max 10MB each)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

impl EventCommand {
    pub async fn run(
        &self,
        repo: &Arc<EventRepository<EventApiClient>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            EventSubcommand::Create {
                title,
                description,
                type_id,
                start_date,
                location,
            } => {
                let draft = EventDraft {
                    title: title.clone(),
                    description: description.clone(),
                    event_type_id: *type_id,
                    start_date: start_date.clone(),
                    location: location.clone(),
                };
                let created = repo.create(&draft).await?;
                println!("Created event #{}: {}", created.id, created.title);
                Ok(())
            }

            EventSubcommand::List {
                keyword,
                type_id,
                format,
            } => {
                let events = repo.list(keyword.as_deref(), *type_id).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&events)?);
                    }
                    OutputFormat::Text => {
                        if events.is_empty() {
                            println!("No events found");
                        }
                        for event in &events {
                            println!(
                                "#{:<5} {:<30} {:<25} {}",
                                event.id, event.title, event.start_date, event.location
                            );
                        }
                    }
                }
                Ok(())
            }

            EventSubcommand::Show { id, format } => {
                match repo.get_by_id(*id).await? {
                    Some(event) => match format {
                        OutputFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&event)?)
                        }
                        OutputFormat::Text => print!("{}", event),
                    },
                    None => println!("Event {} not found", id),
                }
                Ok(())
            }

            EventSubcommand::Update {
                id,
                title,
                description,
                type_id,
                start_date,
                location,
            } => {
                // Whole-record replace: merge the flags over the current values
                let current = repo
                    .get_by_id(*id)
                    .await?
                    .ok_or_else(|| RepoError::Validation(format!("Event not found: {}", id)))?;
                let draft = EventDraft {
                    title: title.clone().unwrap_or(current.title),
                    description: description.clone().unwrap_or(current.description),
                    event_type_id: type_id.unwrap_or(current.event_type_id),
                    start_date: start_date.clone().unwrap_or(current.start_date),
                    location: location.clone().unwrap_or(current.location),
                };
                let updated = repo.update(*id, &draft).await?;
                println!("Updated event #{}: {}", updated.id, updated.title);
                Ok(())
            }

            EventSubcommand::Delete { id } => {
                repo.delete(*id).await?;
                println!("Deleted event #{}", id);
                Ok(())
            }

            EventSubcommand::UploadImages { id, files } => {
                let manager = UploadManager::new(repo.clone());
                let mut rx = manager.start(*id, files.clone());

                while let Some(event) = rx.recv().await {
                    match event {
                        UploadEvent::Progress { completed, total } => {
                            println!("Uploaded {}/{}", completed, total);
                        }
                        UploadEvent::Finished { uploaded, failures } => {
                            println!("Upload complete: {} image(s)", uploaded.len());
                            for failure in &failures {
                                println!("  failed: {}", failure);
                            }
                            return Ok(());
                        }
                        UploadEvent::Failed { error } => {
                            return Err(error.into());
                        }
                        UploadEvent::Cancelled { completed, total } => {
                            println!("Upload cancelled after {}/{}", completed, total);
                            return Ok(());
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
