mod event;
mod event_type;

pub use event::{
    Event, EventDraft, EventImage, ALLOWED_IMAGE_EXTENSIONS, MAX_IMAGES_PER_EVENT, MAX_IMAGE_BYTES,
};
pub use event_type::EventType;
