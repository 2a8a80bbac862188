//! Wire types for the event API.
//!
//! Every response is wrapped in a `{success, data, message}` envelope.
//! Field casing on the wire is camelCase; payload fields the server may
//! omit are optional here and defaulted when mapping to domain models.

use serde::{Deserialize, Serialize};

use crate::models::{Event, EventDraft, EventImage, EventType};

/// Common response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
}

impl<T> ApiEnvelope<T> {
    /// Unwraps the envelope: a `success=false` envelope becomes a
    /// recoverable [`ApiError::Api`] carrying the server message.
    pub fn into_result(self) -> Result<T, super::ApiError> {
        if !self.success {
            return Err(super::ApiError::Api(self.message));
        }
        self.data
            .ok_or_else(|| super::ApiError::Decode("response envelope has no data".to_string()))
    }
}

/// Request body for creating or replacing an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub type_id: i64,
    pub start_date: String,
    pub location: String,
}

impl From<&EventDraft> for CreateEventRequest {
    fn from(draft: &EventDraft) -> Self {
        Self {
            title: draft.title.clone(),
            description: draft.description.clone(),
            type_id: draft.event_type_id,
            start_date: draft.start_date.clone(),
            location: draft.location.clone(),
        }
    }
}

/// An event as the server returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub type_id: Option<i64>,
    pub start_date: Option<String>,
    pub location: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub images: Option<Vec<EventImagePayload>>,
}

impl EventPayload {
    pub fn into_domain(self) -> Event {
        Event {
            id: self.id,
            title: self.title.unwrap_or_else(|| "Untitled Event".to_string()),
            description: self.description.unwrap_or_default(),
            event_type_id: self.type_id.unwrap_or_default(),
            start_date: self.start_date.unwrap_or_default(),
            location: self.location.unwrap_or_default(),
            created_at: self.created_at.unwrap_or_default(),
            updated_at: self.updated_at,
            images: self
                .images
                .unwrap_or_default()
                .into_iter()
                .map(EventImagePayload::into_domain)
                .collect(),
        }
    }
}

/// An image descriptor as the server returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventImagePayload {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub event_id: i64,
    pub original_name: Option<String>,
    pub filename: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub uploaded_at: Option<String>,
    pub url: Option<String>,
}

impl EventImagePayload {
    pub fn into_domain(self) -> EventImage {
        EventImage {
            id: self.id,
            event_id: self.event_id,
            original_name: self.original_name.unwrap_or_else(|| "unknown.jpg".to_string()),
            filename: self.filename.unwrap_or_else(|| "unknown.jpg".to_string()),
            file_path: self.file_path.unwrap_or_default(),
            file_size: self.file_size.unwrap_or_default(),
            uploaded_at: self.uploaded_at.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
        }
    }
}

/// Data payload of `GET /events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventListData {
    #[serde(default)]
    pub events: Vec<EventPayload>,
    #[serde(default)]
    pub total: i64,
}

/// Data payload of `POST /events/{id}/images`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploadData {
    #[serde(default)]
    pub event_id: i64,
    #[serde(default)]
    pub uploaded_images: Vec<EventImagePayload>,
    #[serde(default)]
    pub total_images: i64,
}

/// An event type as the server returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTypePayload {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl EventTypePayload {
    pub fn into_domain(self) -> EventType {
        EventType::new(self.id, self.name, self.description)
    }
}

// Domain -> wire conversions, used by the server side.

impl From<&Event> for EventPayload {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            title: Some(event.title.clone()),
            description: Some(event.description.clone()),
            type_id: Some(event.event_type_id),
            start_date: Some(event.start_date.clone()),
            location: Some(event.location.clone()),
            created_at: Some(event.created_at.clone()),
            updated_at: event.updated_at.clone(),
            images: Some(event.images.iter().map(EventImagePayload::from).collect()),
        }
    }
}

impl From<&EventImage> for EventImagePayload {
    fn from(image: &EventImage) -> Self {
        Self {
            id: image.id,
            event_id: image.event_id,
            original_name: Some(image.original_name.clone()),
            filename: Some(image.filename.clone()),
            file_path: Some(image.file_path.clone()),
            file_size: Some(image.file_size),
            uploaded_at: Some(image.uploaded_at.clone()),
            url: Some(image.url.clone()),
        }
    }
}

impl From<&EventType> for EventTypePayload {
    fn from(event_type: &EventType) -> Self {
        Self {
            id: event_type.id,
            name: event_type.name.clone(),
            description: event_type.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_success() {
        let raw = r#"{"success": true, "data": {"id": 4, "name": "Meeting"}, "message": ""}"#;
        let envelope: ApiEnvelope<EventTypePayload> = serde_json::from_str(raw).unwrap();
        let payload = envelope.into_result().unwrap();
        assert_eq!(payload.id, 4);
        assert_eq!(payload.name, "Meeting");
    }

    #[test]
    fn test_envelope_failure_carries_message() {
        let raw = r#"{"success": false, "data": null, "message": "Event not found"}"#;
        let envelope: ApiEnvelope<EventPayload> = serde_json::from_str(raw).unwrap();
        match envelope.into_result() {
            Err(crate::api::ApiError::Api(msg)) => assert_eq!(msg, "Event not found"),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_event_payload_camel_case_and_defaults() {
        let raw = r#"{
            "id": 12,
            "title": null,
            "typeId": 3,
            "startDate": "2024-06-01T09:00:00.000Z",
            "location": "Hall A",
            "createdAt": "2024-05-01T00:00:00.000Z",
            "updatedAt": null
        }"#;
        let payload: EventPayload = serde_json::from_str(raw).unwrap();
        let event = payload.into_domain();
        assert_eq!(event.id, 12);
        assert_eq!(event.title, "Untitled Event");
        assert_eq!(event.event_type_id, 3);
        assert_eq!(event.start_date, "2024-06-01T09:00:00.000Z");
        assert!(event.images.is_empty());
        assert!(event.updated_at.is_none());
    }

    #[test]
    fn test_create_request_serializes_camel_case() {
        let draft = EventDraft {
            title: "T".to_string(),
            description: "D".to_string(),
            event_type_id: 2,
            start_date: "2024-06-01T09:00:00.000Z".to_string(),
            location: "L".to_string(),
        };
        let json = serde_json::to_value(CreateEventRequest::from(&draft)).unwrap();
        assert_eq!(json["typeId"], 2);
        assert_eq!(json["startDate"], "2024-06-01T09:00:00.000Z");
        assert!(json.get("event_type_id").is_none());
    }

    #[test]
    fn test_image_upload_data() {
        let raw = r#"{
            "eventId": 9,
            "uploadedImages": [
                {"id": 1, "eventId": 9, "originalName": "a.jpg", "filename": "u.jpg",
                 "filePath": "uploads/u.jpg", "fileSize": 100, "uploadedAt": "t"}
            ],
            "totalImages": 1
        }"#;
        let data: ImageUploadData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.event_id, 9);
        assert_eq!(data.uploaded_images.len(), 1);
        let image = data.uploaded_images[0].clone().into_domain();
        assert_eq!(image.file_path, "uploads/u.jpg");
        // No url on the wire: left empty for the repository to fill in.
        assert!(image.url.is_empty());
    }
}
