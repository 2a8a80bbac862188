use serde::{Deserialize, Serialize};
use std::fmt;

/// A named category an event references by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub id: i64,
    pub name: String,
    pub description: String,
}

impl EventType {
    pub fn new(id: i64, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }

    /// Placeholder record for a type id seen on an event before the type
    /// list itself has been fetched. Keeps the foreign key satisfiable.
    pub fn placeholder(id: i64) -> Self {
        Self::new(id, format!("Event Type {}", id), "")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_name() {
        let t = EventType::placeholder(7);
        assert_eq!(t.id, 7);
        assert_eq!(t.name, "Event Type 7");
        assert!(t.description.is_empty());
    }

    #[test]
    fn test_display() {
        let t = EventType::new(3, "Conference", "Multi-day gatherings");
        assert_eq!(format!("{}", t), "Conference (#3)");
    }
}
