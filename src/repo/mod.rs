//! Mediation layer between the remote API and the local cache.
//!
//! One policy applies everywhere: the remote system is the source of
//! truth for writes (create/update propagate remote failure and leave
//! the cache untouched), reads are written through to the cache and fall
//! back to the last known local snapshot when the remote is unavailable,
//! and delete is local-first with a best-effort remote delete.

use std::path::{Path, PathBuf};

use crate::api::{ApiError, EventApi};
use crate::config::ApiConfig;
use crate::db::{EventStore, EventTypeStore};
use crate::models::{
    Event, EventDraft, EventImage, EventType, ALLOWED_IMAGE_EXTENSIONS, MAX_IMAGES_PER_EVENT,
    MAX_IMAGE_BYTES,
};

/// Errors surfaced by repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Remote call failed and no fallback applies
    Api(ApiError),
    /// Local cache failure
    Db(sqlx::Error),
    /// Input rejected before any network call
    Validation(String),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::Api(e) => write!(f, "{}", e),
            RepoError::Db(e) => write!(f, "Cache error: {}", e),
            RepoError::Validation(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RepoError {}

impl From<ApiError> for RepoError {
    fn from(e: ApiError) -> Self {
        RepoError::Api(e)
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        RepoError::Db(e)
    }
}

/// Repository mediating between the remote API and the sqlite cache.
pub struct EventRepository<A> {
    api: A,
    store: EventStore,
    types: EventTypeStore,
    api_config: ApiConfig,
}

impl<A: EventApi> EventRepository<A> {
    pub fn new(api: A, store: EventStore, types: EventTypeStore, api_config: ApiConfig) -> Self {
        Self {
            api,
            store,
            types,
            api_config,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Creates an event remotely; the server-assigned record becomes
    /// authoritative and is written into the cache. A remote failure
    /// propagates; the event is never demoted to a local-only insert.
    pub async fn create(&self, draft: &EventDraft) -> Result<Event, RepoError> {
        validate_draft(draft)?;

        let created = self.api.create_event(draft).await?;
        self.types.ensure_exists(created.event_type_id).await?;
        self.store.upsert(&created).await?;
        Ok(created)
    }

    /// Lists events from the remote, writing results through to the
    /// cache. When the remote is unavailable the last known local
    /// snapshot is returned instead.
    pub async fn list(
        &self,
        keyword: Option<&str>,
        type_id: Option<i64>,
    ) -> Result<Vec<Event>, RepoError> {
        match self.api.list_events(keyword, type_id).await {
            Ok(events) => {
                for event in &events {
                    self.types.ensure_exists(event.event_type_id).await?;
                }
                self.store.upsert_many(&events).await?;
                Ok(events)
            }
            Err(e) => {
                tracing::warn!("Remote list failed, serving cached events: {}", e);
                Ok(self.store.list(keyword, type_id).await?)
            }
        }
    }

    /// Fetches one event with the same fallback shape as [`Self::list`].
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Event>, RepoError> {
        match self.api.get_event(id).await {
            Ok(event) => {
                self.types.ensure_exists(event.event_type_id).await?;
                self.store.upsert(&event).await?;
                Ok(Some(event))
            }
            Err(e) => {
                tracing::warn!("Remote get({}) failed, serving cached event: {}", id, e);
                Ok(self.store.get_by_id(id).await?)
            }
        }
    }

    /// Replaces an event's fields remotely, then mirrors the result into
    /// the cache. On remote failure the cache is left untouched so local
    /// and remote never diverge from an update.
    pub async fn update(&self, id: i64, draft: &EventDraft) -> Result<Event, RepoError> {
        if id <= 0 {
            return Err(RepoError::Validation(format!("Invalid event id: {}", id)));
        }
        validate_draft(draft)?;

        let updated = self.api.update_event(id, draft).await?;
        self.types.ensure_exists(updated.event_type_id).await?;
        if self.store.get_by_id(id).await?.is_some() {
            self.store
                .update_fields(id, &updated.draft(), updated.updated_at.as_deref())
                .await?;
        } else {
            self.store.upsert(&updated).await?;
        }
        Ok(updated)
    }

    /// Deletes locally first (the deletion is final from the caller's
    /// point of view), then attempts the remote delete. A remote failure
    /// is logged, not rolled back.
    pub async fn delete(&self, id: i64) -> Result<(), RepoError> {
        self.store.delete_by_id(id).await?;

        if let Err(e) = self.api.delete_event(id).await {
            tracing::warn!("Remote delete({}) failed after local delete: {}", id, e);
        }
        Ok(())
    }

    /// Fetches the event type list, writing through to the cache, with
    /// local fallback when the remote is unavailable.
    pub async fn list_event_types(&self) -> Result<Vec<EventType>, RepoError> {
        match self.api.list_event_types().await {
            Ok(types) => {
                self.types.upsert_many(&types).await?;
                Ok(types)
            }
            Err(e) => {
                tracing::warn!("Remote type list failed, serving cached types: {}", e);
                Ok(self.types.list().await?)
            }
        }
    }

    /// Uploads images for an event.
    ///
    /// Validation happens before any network call: the event must exist,
    /// the combined image count must stay within capacity, and every
    /// file must exist, fit the size limit and carry an allowed
    /// extension. Uploaded descriptors get their display URL built from
    /// the configured base plus the server-relative path, then are
    /// appended to the event's cached image list.
    pub async fn upload_images(
        &self,
        event_id: i64,
        files: &[PathBuf],
    ) -> Result<Vec<EventImage>, RepoError> {
        let event = self
            .get_by_id(event_id)
            .await?
            .ok_or_else(|| RepoError::Validation(format!("Event not found: {}", event_id)))?;

        let current = event.images.len();
        if current + files.len() > MAX_IMAGES_PER_EVENT {
            return Err(RepoError::Validation(format!(
                "Cannot upload {} images. Event already has {} images. Maximum allowed is {}.",
                files.len(),
                current,
                MAX_IMAGES_PER_EVENT
            )));
        }

        for file in files {
            validate_image_file(file).await?;
        }

        let uploaded = self.api.upload_images(event_id, files).await?;

        let mut images = Vec::with_capacity(uploaded.len());
        for mut image in uploaded {
            match self.api_config.full_image_url(&image.file_path) {
                Some(url) => {
                    image.url = url;
                    images.push(image);
                }
                None => {
                    tracing::warn!(
                        "Skipping uploaded image with unusable path: {}",
                        image.original_name
                    );
                }
            }
        }

        self.store.append_images(event_id, &images).await?;
        Ok(images)
    }
}

fn validate_draft(draft: &EventDraft) -> Result<(), RepoError> {
    let probe = Event {
        id: 0,
        title: draft.title.clone(),
        description: draft.description.clone(),
        event_type_id: draft.event_type_id,
        start_date: draft.start_date.clone(),
        location: draft.location.clone(),
        created_at: String::new(),
        updated_at: None,
        images: Vec::new(),
    };
    if !probe.is_valid_for_creation() {
        return Err(RepoError::Validation(
            "Event requires a title (max 255 chars), description, positive type id, \
             start date and location"
                .to_string(),
        ));
    }
    Ok(())
}

async fn validate_image_file(path: &Path) -> Result<(), RepoError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => {
            return Err(RepoError::Validation(format!(
                "File does not exist: {}",
                name
            )))
        }
    };

    if metadata.len() > MAX_IMAGE_BYTES {
        return Err(RepoError::Validation(format!(
            "File too large: {}. Maximum size is {}MB",
            name,
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(RepoError::Validation(format!(
            "Invalid file type: {}. Allowed types: {}",
            name,
            ALLOWED_IMAGE_EXTENSIONS.join(", ")
        )));
    }

    Ok(())
}
