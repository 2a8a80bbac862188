use serde::{Deserialize, Serialize};
use std::fmt;

use super::EventType;

/// Maximum number of images that can be attached to a single event.
pub const MAX_IMAGES_PER_EVENT: usize = 5;

/// Maximum size of a single image file (10 MiB).
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// File extensions accepted for image uploads.
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// A calendar/to-do event.
///
/// Ids are assigned by the remote system on creation; an event that has
/// not been created remotely yet carries id 0. Date fields are kept as
/// the ISO-8601 strings the API produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub event_type_id: i64,
    pub start_date: String,
    pub location: String,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub images: Vec<EventImage>,
}

impl Event {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        event_type_id: i64,
        start_date: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            title: title.into(),
            description: description.into(),
            event_type_id,
            start_date: start_date.into(),
            location: location.into(),
            created_at: String::new(),
            updated_at: None,
            images: Vec::new(),
        }
    }

    /// Whether the event satisfies the constraints for remote creation:
    /// non-blank title (at most 255 chars), description, start date and
    /// location, and a positive event type reference.
    pub fn is_valid_for_creation(&self) -> bool {
        !self.title.trim().is_empty()
            && self.title.chars().count() <= 255
            && !self.description.trim().is_empty()
            && self.event_type_id > 0
            && !self.start_date.trim().is_empty()
            && !self.location.trim().is_empty()
    }

    /// Same constraints as creation, plus a positive existing id.
    pub fn is_valid_for_update(&self) -> bool {
        self.id > 0 && self.is_valid_for_creation()
    }

    /// Whether another image may be attached.
    pub fn can_add_more_images(&self) -> bool {
        self.images.len() < MAX_IMAGES_PER_EVENT
    }

    /// Number of image slots still open, floored at zero.
    pub fn remaining_image_slots(&self) -> usize {
        MAX_IMAGES_PER_EVENT.saturating_sub(self.images.len())
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    /// Display URLs of the attached images, in attachment order.
    pub fn image_urls(&self) -> Vec<&str> {
        self.images.iter().map(|i| i.url.as_str()).collect()
    }

    /// Resolves the event's type name against a list of known types.
    pub fn event_type_name<'a>(&self, types: &'a [EventType]) -> &'a str {
        types
            .iter()
            .find(|t| t.id == self.event_type_id)
            .map(|t| t.name.as_str())
            .unwrap_or("Unknown")
    }

    /// The mutable fields of the event as a create/update request body.
    pub fn draft(&self) -> EventDraft {
        EventDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            event_type_id: self.event_type_id,
            start_date: self.start_date.clone(),
            location: self.location.clone(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (#{})", self.title, self.id)?;
        writeln!(f, "{}", "=".repeat(self.title.len()))?;
        writeln!(f, "When:     {}", self.start_date)?;
        writeln!(f, "Where:    {}", self.location)?;
        writeln!(f, "Type:     {}", self.event_type_id)?;
        writeln!(f, "Details:  {}", self.description)?;
        if self.has_images() {
            writeln!(f, "\nImages:")?;
            for image in &self.images {
                writeln!(f, "  - {} ({})", image.original_name, image.formatted_file_size())?;
            }
        }
        Ok(())
    }
}

/// The fields a caller supplies when creating or replacing an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub event_type_id: i64,
    pub start_date: String,
    pub location: String,
}

/// An image attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventImage {
    pub id: i64,
    pub event_id: i64,
    pub original_name: String,
    pub filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub uploaded_at: String,
    /// Fully-qualified display URL (API base + server-relative path).
    pub url: String,
}

impl EventImage {
    /// Human-readable file size (B / KB / MB).
    pub fn formatted_file_size(&self) -> String {
        const KB: i64 = 1024;
        const MB: i64 = 1024 * 1024;
        match self.file_size {
            s if s < KB => format!("{} B", s),
            s if s < MB => format!("{} KB", s / KB),
            s => format!("{} MB", s / MB),
        }
    }

    /// Lowercased extension of the original filename, empty if none.
    pub fn file_extension(&self) -> String {
        self.original_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_event() -> Event {
        Event {
            id: 1,
            title: "Team standup".to_string(),
            description: "Daily sync meeting".to_string(),
            event_type_id: 2,
            start_date: "2024-06-01T09:00:00.000Z".to_string(),
            location: "Room 4".to_string(),
            created_at: "2024-05-01T00:00:00.000Z".to_string(),
            updated_at: None,
            images: Vec::new(),
        }
    }

    fn image(id: i64) -> EventImage {
        EventImage {
            id,
            event_id: 1,
            original_name: format!("photo{}.jpg", id),
            filename: format!("stored{}.jpg", id),
            file_path: format!("uploads/stored{}.jpg", id),
            file_size: 2048,
            uploaded_at: "2024-06-01T10:00:00.000Z".to_string(),
            url: format!("http://localhost:5000/uploads/stored{}.jpg", id),
        }
    }

    #[test]
    fn test_valid_for_creation() {
        assert!(valid_event().is_valid_for_creation());
    }

    #[test]
    fn test_blank_fields_invalid_for_creation() {
        for field in ["title", "description", "start_date", "location"] {
            let mut event = valid_event();
            match field {
                "title" => event.title = "   ".to_string(),
                "description" => event.description = String::new(),
                "start_date" => event.start_date = String::new(),
                _ => event.location = " ".to_string(),
            }
            assert!(!event.is_valid_for_creation(), "blank {} accepted", field);
        }
    }

    #[test]
    fn test_nonpositive_type_invalid() {
        let mut event = valid_event();
        event.event_type_id = 0;
        assert!(!event.is_valid_for_creation());
        event.event_type_id = -3;
        assert!(!event.is_valid_for_creation());
    }

    #[test]
    fn test_title_length_limit() {
        let mut event = valid_event();
        event.title = "a".repeat(255);
        assert!(event.is_valid_for_creation());
        event.title = "a".repeat(256);
        assert!(!event.is_valid_for_creation());
    }

    #[test]
    fn test_valid_for_update_requires_id() {
        let mut event = valid_event();
        assert!(event.is_valid_for_update());
        event.id = 0;
        assert!(!event.is_valid_for_update());
    }

    #[test]
    fn test_image_capacity() {
        let mut event = valid_event();
        assert!(event.can_add_more_images());
        assert_eq!(event.remaining_image_slots(), 5);

        event.images = (1..=5).map(image).collect();
        assert!(!event.can_add_more_images());
        assert_eq!(event.remaining_image_slots(), 0);
    }

    #[test]
    fn test_remaining_slots_floored_at_zero() {
        let mut event = valid_event();
        // Over-full lists can show up transiently when merging server data.
        event.images = (1..=6).map(image).collect();
        assert_eq!(event.remaining_image_slots(), 0);
    }

    #[test]
    fn test_image_urls_preserve_order() {
        let mut event = valid_event();
        event.images = vec![image(3), image(1), image(2)];
        let urls = event.image_urls();
        assert_eq!(urls.len(), 3);
        assert!(urls[0].ends_with("stored3.jpg"));
        assert!(urls[1].ends_with("stored1.jpg"));
    }

    #[test]
    fn test_event_type_name() {
        let types = vec![
            EventType::new(1, "Meeting", ""),
            EventType::new(2, "Workshop", ""),
        ];
        assert_eq!(valid_event().event_type_name(&types), "Workshop");

        let mut event = valid_event();
        event.event_type_id = 99;
        assert_eq!(event.event_type_name(&types), "Unknown");
    }

    #[test]
    fn test_formatted_file_size() {
        let mut img = image(1);
        img.file_size = 512;
        assert_eq!(img.formatted_file_size(), "512 B");
        img.file_size = 10 * 1024;
        assert_eq!(img.formatted_file_size(), "10 KB");
        img.file_size = 3 * 1024 * 1024;
        assert_eq!(img.formatted_file_size(), "3 MB");
    }

    #[test]
    fn test_file_extension() {
        let mut img = image(1);
        img.original_name = "Holiday.Photo.JPG".to_string();
        assert_eq!(img.file_extension(), "jpg");
        img.original_name = "noextension".to_string();
        assert_eq!(img.file_extension(), "");
    }

    #[test]
    fn test_draft_carries_mutable_fields() {
        let event = valid_event();
        let draft = event.draft();
        assert_eq!(draft.title, event.title);
        assert_eq!(draft.event_type_id, event.event_type_id);
        assert_eq!(draft.start_date, event.start_date);
    }
}
