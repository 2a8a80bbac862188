//! Reconciliation engine: brings the local event cache into agreement
//! with the remote event set for a given filter.
//!
//! Conflicts between versions present on both sides are settled by a
//! last-writer-wins rule over the `updated_at` timestamp. Whole records
//! are replaced; there is no field-level merge.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tokio::sync::Mutex;

use crate::api::{ApiError, EventApi};
use crate::db::{EventStore, EventTypeStore};
use crate::models::Event;

/// Fixed timestamp format the remote API uses for `updated_at` (UTC).
const UPDATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Parameters of a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub keyword: Option<String>,
    pub type_id: Option<i64>,
    /// Whether events present locally but absent remotely may be
    /// deleted. Off by default so partial/filtered syncs cannot cause
    /// collateral deletion.
    pub allow_local_deletion: bool,
}

/// Aggregate counts of a completed sync run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub total_remote: usize,
}

/// Errors that abort a sync run.
#[derive(Debug)]
pub enum SyncError {
    /// The remote event set could not be fetched
    Remote(ApiError),
    /// The local event set could not be read
    Local(sqlx::Error),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Remote(e) => write!(f, "Failed to fetch remote events: {}", e),
            SyncError::Local(e) => write!(f, "Failed to read local events: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

/// Reconciliation engine over a remote API and the local cache.
///
/// Applies changes directly to the store so a run performs exactly one
/// remote call (the list fetch). Runs are serialized: a second `sync`
/// call waits until the one in flight finishes.
pub struct SyncEngine<A> {
    api: A,
    store: EventStore,
    types: EventTypeStore,
    running: Mutex<()>,
}

impl<A: EventApi> SyncEngine<A> {
    pub fn new(api: A, store: EventStore, types: EventTypeStore) -> Self {
        Self {
            api,
            store,
            types,
            running: Mutex::new(()),
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// Returns an error without touching the cache if either side could
    /// not be fetched; per-item apply failures are logged and skipped.
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        let _in_flight = self.running.lock().await;

        let keyword = request.keyword.as_deref();
        tracing::debug!(?keyword, type_id = ?request.type_id, "Starting event synchronization");

        let remote = self
            .api
            .list_events(keyword, request.type_id)
            .await
            .map_err(SyncError::Remote)?;
        let local = self
            .store
            .list(keyword, request.type_id)
            .await
            .map_err(SyncError::Local)?;

        tracing::debug!(
            remote = remote.len(),
            local = local.len(),
            "Fetched both event sets"
        );

        let local_map: HashMap<i64, &Event> = local.iter().map(|e| (e.id, e)).collect();
        let remote_map: HashMap<i64, &Event> = remote.iter().map(|e| (e.id, e)).collect();

        let mut outcome = SyncOutcome {
            total_remote: remote.len(),
            ..Default::default()
        };

        // Additions: remote events the cache has never seen
        for remote_event in &remote {
            if local_map.contains_key(&remote_event.id) {
                continue;
            }
            match self.insert_remote(remote_event).await {
                Ok(()) => {
                    outcome.added += 1;
                    tracing::debug!(id = remote_event.id, title = %remote_event.title, "Added event");
                }
                Err(e) => {
                    tracing::warn!(id = remote_event.id, "Failed to add event: {}", e);
                }
            }
        }

        // Updates and deletions, driven from the local side
        for local_event in &local {
            match remote_map.get(&local_event.id) {
                Some(remote_event) => {
                    if !resolve_conflict(local_event, remote_event) {
                        continue;
                    }
                    match self.adopt_remote(remote_event).await {
                        Ok(()) => {
                            outcome.updated += 1;
                            tracing::debug!(id = remote_event.id, title = %remote_event.title, "Updated event");
                        }
                        Err(e) => {
                            tracing::warn!(id = remote_event.id, "Failed to update event: {}", e);
                        }
                    }
                }
                None if request.allow_local_deletion => {
                    match self.store.delete_by_id(local_event.id).await {
                        Ok(()) => {
                            outcome.deleted += 1;
                            tracing::debug!(id = local_event.id, title = %local_event.title, "Deleted event");
                        }
                        Err(e) => {
                            tracing::warn!(id = local_event.id, "Failed to delete event: {}", e);
                        }
                    }
                }
                None => {}
            }
        }

        tracing::info!(
            added = outcome.added,
            updated = outcome.updated,
            deleted = outcome.deleted,
            total_remote = outcome.total_remote,
            "Synchronization completed"
        );
        Ok(outcome)
    }

    async fn insert_remote(&self, event: &Event) -> Result<(), sqlx::Error> {
        self.types.ensure_exists(event.event_type_id).await?;
        self.store.upsert(event).await
    }

    /// Overwrites the local fields with the remote values, carrying the
    /// remote `updated_at` so an immediate re-run is a no-op. The cached
    /// image list is left alone.
    async fn adopt_remote(&self, event: &Event) -> Result<(), sqlx::Error> {
        self.types.ensure_exists(event.event_type_id).await?;
        self.store
            .update_fields(event.id, &event.draft(), event.updated_at.as_deref())
            .await
    }
}

/// Decides whether the remote version of an event should replace the
/// local one. Returns true to adopt remote, false to keep local.
///
/// Missing remote timestamp keeps local; missing local timestamp (with
/// remote present) adopts remote; both present adopts the strictly more
/// recent side, ties keeping local. An unparseable timestamp on either
/// side adopts remote, failing toward freshness.
pub fn resolve_conflict(local: &Event, remote: &Event) -> bool {
    let local_ts = match parse_updated_at(local.updated_at.as_deref()) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::warn!(id = local.id, "Unparseable local timestamp, adopting remote: {}", e);
            return true;
        }
    };
    let remote_ts = match parse_updated_at(remote.updated_at.as_deref()) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::warn!(id = remote.id, "Unparseable remote timestamp, adopting remote: {}", e);
            return true;
        }
    };

    match (local_ts, remote_ts) {
        // Remote has no update time: keep the local version
        (_, None) => false,
        // Local has no update time but remote does: take the remote one
        (None, Some(_)) => true,
        (Some(local_ts), Some(remote_ts)) => remote_ts > local_ts,
    }
}

fn parse_updated_at(value: Option<&str>) -> Result<Option<NaiveDateTime>, chrono::ParseError> {
    value
        .map(|v| NaiveDateTime::parse_from_str(v, UPDATED_AT_FORMAT))
        .transpose()
}
