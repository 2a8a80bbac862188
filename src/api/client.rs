//! HTTP client for the remote event API.
//!
//! All calls go through the [`EventApi`] trait so the repository and the
//! sync engine can be exercised against an in-memory remote in tests.

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::config::ApiConfig;
use crate::models::{Event, EventDraft, EventImage, EventType};

use super::types::{
    ApiEnvelope, CreateEventRequest, EventListData, EventPayload, EventTypePayload,
    ImageUploadData,
};

/// Errors that can occur talking to the event API.
#[derive(Debug)]
pub enum ApiError {
    /// No API base URL configured
    NotConfigured,
    /// Transport-level failure (connect, timeout, TLS)
    Http(String),
    /// Server answered with a non-success HTTP status
    Status(u16, String),
    /// Server answered `success=false` with a message
    Api(String),
    /// Response body could not be decoded
    Decode(String),
    /// Local file could not be read for upload
    Io(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotConfigured => write!(
                f,
                "Remote API not configured. Add api.base_url to config or set TODOEVENT_API_URL."
            ),
            ApiError::Http(e) => write!(f, "HTTP error: {}", e),
            ApiError::Status(code, body) => write!(f, "Server returned status {}: {}", code, body),
            ApiError::Api(msg) => write!(f, "API error: {}", msg),
            ApiError::Decode(e) => write!(f, "Failed to decode response: {}", e),
            ApiError::Io(e) => write!(f, "File error: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Http(e.to_string())
        }
    }
}

/// The remote API surface the rest of the crate depends on.
pub trait EventApi {
    fn list_events(
        &self,
        keyword: Option<&str>,
        type_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<Event>, ApiError>> + Send;

    fn get_event(&self, id: i64) -> impl Future<Output = Result<Event, ApiError>> + Send;

    fn create_event(
        &self,
        draft: &EventDraft,
    ) -> impl Future<Output = Result<Event, ApiError>> + Send;

    fn update_event(
        &self,
        id: i64,
        draft: &EventDraft,
    ) -> impl Future<Output = Result<Event, ApiError>> + Send;

    fn delete_event(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn list_event_types(&self) -> impl Future<Output = Result<Vec<EventType>, ApiError>> + Send;

    /// Uploads image files for an event. Returned descriptors carry the
    /// server-relative `file_path`; display URLs are the caller's concern.
    fn upload_images(
        &self,
        event_id: i64,
        files: &[PathBuf],
    ) -> impl Future<Output = Result<Vec<EventImage>, ApiError>> + Send;
}

impl<A: EventApi + Send + Sync> EventApi for std::sync::Arc<A> {
    async fn list_events(
        &self,
        keyword: Option<&str>,
        type_id: Option<i64>,
    ) -> Result<Vec<Event>, ApiError> {
        (**self).list_events(keyword, type_id).await
    }

    async fn get_event(&self, id: i64) -> Result<Event, ApiError> {
        (**self).get_event(id).await
    }

    async fn create_event(&self, draft: &EventDraft) -> Result<Event, ApiError> {
        (**self).create_event(draft).await
    }

    async fn update_event(&self, id: i64, draft: &EventDraft) -> Result<Event, ApiError> {
        (**self).update_event(id, draft).await
    }

    async fn delete_event(&self, id: i64) -> Result<(), ApiError> {
        (**self).delete_event(id).await
    }

    async fn list_event_types(&self) -> Result<Vec<EventType>, ApiError> {
        (**self).list_event_types().await
    }

    async fn upload_images(
        &self,
        event_id: i64,
        files: &[PathBuf],
    ) -> Result<Vec<EventImage>, ApiError> {
        (**self).upload_images(event_id, files).await
    }
}

/// reqwest-backed [`EventApi`] implementation.
///
/// A client without a configured base URL still constructs; every call
/// then fails with [`ApiError::NotConfigured`], which read paths absorb
/// via the cache fallback.
#[derive(Debug, Clone)]
pub struct EventApiClient {
    base_url: Option<String>,
    http: reqwest::Client,
}

impl EventApiClient {
    /// Creates a client against an explicit base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            http: reqwest::Client::new(),
        }
    }

    /// Creates a client from config; the base URL may be absent.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    fn build_url(&self, path: &str) -> Result<String, ApiError> {
        let base = self.base_url.as_deref().ok_or(ApiError::NotConfigured)?;
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }

    /// Decodes an envelope response, mapping non-2xx statuses that carry
    /// an envelope body to [`ApiError::Api`] and the rest to `Status`.
    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<ApiEnvelope<T>>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(_) if !status.is_success() => {
                Err(ApiError::Status(status.as_u16(), truncate(&body, 200)))
            }
            Err(e) => Err(ApiError::Decode(e.to_string())),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

impl EventApi for EventApiClient {
    async fn list_events(
        &self,
        keyword: Option<&str>,
        type_id: Option<i64>,
    ) -> Result<Vec<Event>, ApiError> {
        let mut request = self.http.get(self.build_url("events")?);
        if let Some(q) = keyword {
            request = request.query(&[("q", q)]);
        }
        if let Some(t) = type_id {
            request = request.query(&[("typeId", t)]);
        }

        let data: EventListData = Self::read_envelope(request.send().await?).await?;
        Ok(data
            .events
            .into_iter()
            .map(EventPayload::into_domain)
            .collect())
    }

    async fn get_event(&self, id: i64) -> Result<Event, ApiError> {
        let response = self
            .http
            .get(self.build_url(&format!("events/{}", id))?)
            .send()
            .await?;
        let payload: EventPayload = Self::read_envelope(response).await?;
        Ok(payload.into_domain())
    }

    async fn create_event(&self, draft: &EventDraft) -> Result<Event, ApiError> {
        let response = self
            .http
            .post(self.build_url("events")?)
            .json(&CreateEventRequest::from(draft))
            .send()
            .await?;
        let payload: EventPayload = Self::read_envelope(response).await?;
        Ok(payload.into_domain())
    }

    async fn update_event(&self, id: i64, draft: &EventDraft) -> Result<Event, ApiError> {
        let response = self
            .http
            .put(self.build_url(&format!("events/{}", id))?)
            .json(&CreateEventRequest::from(draft))
            .send()
            .await?;
        let payload: EventPayload = Self::read_envelope(response).await?;
        Ok(payload.into_domain())
    }

    async fn delete_event(&self, id: i64) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.build_url(&format!("events/{}", id))?)
            .send()
            .await?;

        // Deletion acknowledgements may carry a null data field, so only
        // the success flag matters here.
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body) {
            Ok(envelope) if envelope.success => Ok(()),
            Ok(envelope) => Err(ApiError::Api(envelope.message)),
            Err(_) if !status.is_success() => {
                Err(ApiError::Status(status.as_u16(), truncate(&body, 200)))
            }
            Err(e) => Err(ApiError::Decode(e.to_string())),
        }
    }

    async fn list_event_types(&self) -> Result<Vec<EventType>, ApiError> {
        let response = self.http.get(self.build_url("event-types")?).send().await?;
        let payloads: Vec<EventTypePayload> = Self::read_envelope(response).await?;
        Ok(payloads
            .into_iter()
            .map(EventTypePayload::into_domain)
            .collect())
    }

    async fn upload_images(
        &self,
        event_id: i64,
        files: &[PathBuf],
    ) -> Result<Vec<EventImage>, ApiError> {
        let mut form = reqwest::multipart::Form::new();
        for path in files {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ApiError::Io(format!("{}: {}", path.display(), e)))?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("image")
                .to_string();
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(name)
                .mime_str(mime_for(path))
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            form = form.part("images", part);
        }

        let response = self
            .http
            .post(self.build_url(&format!("events/{}/images", event_id))?)
            .multipart(form)
            .send()
            .await?;
        let data: ImageUploadData = Self::read_envelope(response).await?;
        Ok(data
            .uploaded_images
            .into_iter()
            .map(super::types::EventImagePayload::into_domain)
            .collect())
    }
}
