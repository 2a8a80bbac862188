//! Background image uploads tracked per event id.
//!
//! At most one upload task runs per event: starting a new one for an id
//! first cancels the task already registered under it. Cancellation is
//! cooperative and only observed at per-file boundaries, so a file that
//! is already mid-transfer completes before the task stops.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::EventApi;
use crate::models::EventImage;
use crate::repo::EventRepository;

/// Progress and terminal notifications for one upload batch.
#[derive(Debug)]
pub enum UploadEvent {
    /// A file finished uploading
    Progress { completed: usize, total: usize },
    /// The batch finished; `failures` lists files that did not make it
    Finished {
        uploaded: Vec<EventImage>,
        failures: Vec<String>,
    },
    /// Every file in the batch failed
    Failed { error: String },
    /// The batch was cancelled after `completed` files
    Cancelled { completed: usize, total: usize },
}

struct UploadJob {
    token: u64,
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Registry of in-flight upload tasks, keyed by event id.
pub struct UploadManager<A> {
    repo: Arc<EventRepository<A>>,
    jobs: Arc<Mutex<HashMap<i64, UploadJob>>>,
    next_token: AtomicU64,
}

impl<A: EventApi + Send + Sync + 'static> UploadManager<A> {
    pub fn new(repo: Arc<EventRepository<A>>) -> Self {
        Self {
            repo,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(0),
        }
    }

    /// Starts a background upload for an event, replacing any upload
    /// already running for the same id. Returns a channel of
    /// [`UploadEvent`] notifications; dropping the receiver does not
    /// stop the upload.
    pub fn start(&self, event_id: i64, files: Vec<PathBuf>) -> mpsc::Receiver<UploadEvent> {
        let (tx, rx) = mpsc::channel(files.len().max(1) + 2);
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));

        // Replace any job already registered for this event
        if let Some(previous) = self.jobs.lock().unwrap().remove(&event_id) {
            tracing::debug!(event_id, "Cancelling superseded upload");
            previous.cancelled.store(true, Ordering::SeqCst);
        }

        let repo = self.repo.clone();
        let jobs = self.jobs.clone();
        let flag = cancelled.clone();

        let handle = tokio::spawn(async move {
            let total = files.len();
            let mut uploaded: Vec<EventImage> = Vec::new();
            let mut failures: Vec<String> = Vec::new();
            let mut completed = 0;
            let mut was_cancelled = false;

            for file in &files {
                // Cooperative cancellation point, once per file
                if flag.load(Ordering::SeqCst) {
                    was_cancelled = true;
                    break;
                }

                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string());

                match repo.upload_images(event_id, std::slice::from_ref(file)).await {
                    Ok(images) => {
                        completed += 1;
                        uploaded.extend(images);
                        let _ = tx.send(UploadEvent::Progress { completed, total }).await;
                    }
                    Err(e) => {
                        tracing::warn!(event_id, file = %name, "Upload failed: {}", e);
                        failures.push(format!("{}: {}", name, e));
                    }
                }
            }

            let terminal = if was_cancelled {
                UploadEvent::Cancelled { completed, total }
            } else if uploaded.is_empty() && total > 0 {
                UploadEvent::Failed {
                    error: format!(
                        "Failed to upload any images. Errors: {}",
                        failures.join(", ")
                    ),
                }
            } else {
                UploadEvent::Finished { uploaded, failures }
            };
            let _ = tx.send(terminal).await;

            // Deregister, unless a replacement job took the slot
            let mut jobs = jobs.lock().unwrap();
            if jobs.get(&event_id).is_some_and(|job| job.token == token) {
                jobs.remove(&event_id);
            }
        });

        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(
            event_id,
            UploadJob {
                token,
                cancelled,
                handle,
            },
        );
        // The task deregisters itself; if it already ended before this
        // registration, drop the entry here instead
        if jobs
            .get(&event_id)
            .is_some_and(|job| job.token == token && job.handle.is_finished())
        {
            jobs.remove(&event_id);
        }
        rx
    }

    /// Requests cancellation of the upload running for an event, if any.
    pub fn cancel(&self, event_id: i64) {
        if let Some(job) = self.jobs.lock().unwrap().remove(&event_id) {
            job.cancelled.store(true, Ordering::SeqCst);
            tracing::debug!(event_id, "Upload cancellation requested");
        }
    }

    /// Requests cancellation of every in-flight upload.
    pub fn cancel_all(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        for (event_id, job) in jobs.drain() {
            job.cancelled.store(true, Ordering::SeqCst);
            tracing::debug!(event_id, "Upload cancellation requested");
        }
    }

    /// Whether an upload task is currently registered and running for
    /// the event.
    pub fn is_uploading(&self, event_id: i64) -> bool {
        self.jobs
            .lock()
            .unwrap()
            .get(&event_id)
            .map_or(false, |job| !job.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::config::ApiConfig;
    use crate::db::{init_db, EventStore, EventTypeStore};
    use crate::models::{Event, EventDraft, EventType};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Remote that only answers uploads, slowly.
    #[derive(Default)]
    struct SlowUploads {
        uploads: AtomicUsize,
        fail_all: AtomicBool,
    }

    impl EventApi for SlowUploads {
        async fn list_events(
            &self,
            _keyword: Option<&str>,
            _type_id: Option<i64>,
        ) -> Result<Vec<Event>, ApiError> {
            Err(ApiError::Http("offline".to_string()))
        }

        async fn get_event(&self, _id: i64) -> Result<Event, ApiError> {
            // Forces the repository onto its cached copy
            Err(ApiError::Http("offline".to_string()))
        }

        async fn create_event(&self, _draft: &EventDraft) -> Result<Event, ApiError> {
            Err(ApiError::Http("offline".to_string()))
        }

        async fn update_event(&self, _id: i64, _draft: &EventDraft) -> Result<Event, ApiError> {
            Err(ApiError::Http("offline".to_string()))
        }

        async fn delete_event(&self, _id: i64) -> Result<(), ApiError> {
            Err(ApiError::Http("offline".to_string()))
        }

        async fn list_event_types(&self) -> Result<Vec<EventType>, ApiError> {
            Ok(Vec::new())
        }

        async fn upload_images(
            &self,
            event_id: i64,
            files: &[PathBuf],
        ) -> Result<Vec<EventImage>, ApiError> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(ApiError::Api("upload rejected".to_string()));
            }
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(files
                .iter()
                .map(|f| EventImage {
                    id: (n + 1) as i64,
                    event_id,
                    original_name: f.file_name().unwrap().to_string_lossy().into_owned(),
                    filename: format!("stored-{}.jpg", n),
                    file_path: format!("uploads/stored-{}.jpg", n),
                    file_size: 3,
                    uploaded_at: "2024-06-01T10:00:00.000Z".to_string(),
                    url: String::new(),
                })
                .collect())
        }
    }

    struct TestContext {
        manager: UploadManager<Arc<SlowUploads>>,
        api: Arc<SlowUploads>,
        store: EventStore,
        files_dir: TempDir,
        _db_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let db_dir = TempDir::new().unwrap();
        let pool = init_db(&db_dir.path().join("test.db")).await.unwrap();
        let store = EventStore::new(pool.clone());
        let types = EventTypeStore::new(pool);
        types.ensure_exists(1).await.unwrap();

        // The target event only exists in the cache; the fake remote
        // answers nothing but uploads.
        let mut event = Event::new("Gallery", "d", 1, "2024-06-01T09:00:00.000Z", "x");
        event.id = 1;
        event.created_at = "2024-05-01T00:00:00.000Z".to_string();
        store.upsert(&event).await.unwrap();

        let api = Arc::new(SlowUploads::default());
        let repo = Arc::new(EventRepository::new(
            api.clone(),
            store.clone(),
            types,
            ApiConfig {
                base_url: Some("http://localhost:5000".to_string()),
            },
        ));
        TestContext {
            manager: UploadManager::new(repo),
            api,
            store,
            files_dir: TempDir::new().unwrap(),
            _db_dir: db_dir,
        }
    }

    fn make_files(ctx: &TestContext, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let p = ctx.files_dir.path().join(format!("pic{}.jpg", i));
                std::fs::write(&p, b"jpg").unwrap();
                p
            })
            .collect()
    }

    #[tokio::test]
    async fn test_upload_reports_progress_and_finishes() {
        let ctx = setup().await;
        let files = make_files(&ctx, 2);

        let mut rx = ctx.manager.start(1, files);

        let mut progress = 0;
        loop {
            match rx.recv().await.expect("channel closed early") {
                UploadEvent::Progress { completed, total } => {
                    progress = completed;
                    assert_eq!(total, 2);
                }
                UploadEvent::Finished { uploaded, failures } => {
                    assert_eq!(uploaded.len(), 2);
                    assert!(failures.is_empty());
                    break;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(progress, 2);
        assert_eq!(ctx.store.count_images(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_at_file_boundary() {
        let ctx = setup().await;
        let files = make_files(&ctx, 4);

        let mut rx = ctx.manager.start(1, files);

        // Let the first file through, then cancel
        match rx.recv().await.unwrap() {
            UploadEvent::Progress { completed, .. } => assert_eq!(completed, 1),
            other => panic!("unexpected event: {:?}", other),
        }
        ctx.manager.cancel(1);

        // Drain until the terminal event
        loop {
            match rx.recv().await.unwrap() {
                UploadEvent::Cancelled { completed, total } => {
                    assert!(completed < total);
                    break;
                }
                UploadEvent::Progress { .. } => {}
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(ctx.store.count_images(1).await.unwrap() < 4);
    }

    #[tokio::test]
    async fn test_all_failed_batch_is_an_error() {
        let ctx = setup().await;
        ctx.api.fail_all.store(true, Ordering::SeqCst);
        let files = make_files(&ctx, 2);

        let mut rx = ctx.manager.start(1, files);
        loop {
            match rx.recv().await.unwrap() {
                UploadEvent::Failed { error } => {
                    assert!(error.contains("Failed to upload any images"));
                    break;
                }
                UploadEvent::Progress { .. } => panic!("nothing should succeed"),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(ctx.store.count_images(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_new_upload_replaces_running_one() {
        let ctx = setup().await;

        let mut first = ctx.manager.start(1, make_files(&ctx, 5));
        assert!(ctx.manager.is_uploading(1));

        // Second batch for the same event supersedes the first
        let mut second = ctx.manager.start(1, make_files(&ctx, 1));

        // First batch ends cancelled (possibly after some progress)
        loop {
            match first.recv().await.unwrap() {
                UploadEvent::Cancelled { .. } => break,
                UploadEvent::Progress { .. } => {}
                other => panic!("unexpected event on first batch: {:?}", other),
            }
        }

        // Second batch runs to completion
        loop {
            match second.recv().await.unwrap() {
                UploadEvent::Finished { uploaded, .. } => {
                    assert_eq!(uploaded.len(), 1);
                    break;
                }
                UploadEvent::Progress { .. } => {}
                other => panic!("unexpected event on second batch: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_is_uploading_clears_after_finish() {
        let ctx = setup().await;
        let mut rx = ctx.manager.start(1, make_files(&ctx, 1));

        loop {
            if matches!(rx.recv().await.unwrap(), UploadEvent::Finished { .. }) {
                break;
            }
        }
        // The task deregisters itself after the terminal event
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!ctx.manager.is_uploading(1));
    }
}
