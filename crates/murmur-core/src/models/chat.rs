//! Chat models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Entity;

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A message composed on this device.
    ///
    /// The id is a time-ordered UUID so the row can be inserted with it and
    /// the realtime echo matched back to the local copy.
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for Message {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Row shape of the `typing_status` relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub conversation_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composed_messages_get_distinct_uuid_ids() {
        let first = Message::new("c1", "u1", "hi");
        let second = Message::new("c1", "u1", "there");
        assert_ne!(first.id, second.id);
        assert!(Uuid::parse_str(&first.id).is_ok());
    }
}
