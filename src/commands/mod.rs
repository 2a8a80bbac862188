mod config_cmd;
mod event;
mod sync_cmd;
mod types_cmd;

pub use config_cmd::ConfigCommand;
pub use event::EventCommand;
pub use sync_cmd::SyncCommand;
pub use types_cmd::TypesCommand;
