//! Synchronization between the local event cache and the remote API:
//! the reconciliation engine and the background image-upload registry.

mod engine;
mod uploads;

pub use engine::{resolve_conflict, SyncEngine, SyncError, SyncOutcome, SyncRequest};
pub use uploads::{UploadEvent, UploadManager};
