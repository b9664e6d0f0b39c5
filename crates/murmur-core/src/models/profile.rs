//! Profile model

use serde::{Deserialize, Serialize};

use super::Entity;

/// A user profile as seen by the current viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub follower_count: i64,
    #[serde(default)]
    pub following_count: i64,
    /// Viewer follows this profile
    #[serde(default)]
    pub is_following: bool,
    /// Viewer has blocked this profile
    #[serde(default)]
    pub is_blocked: bool,
}

impl Profile {
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            display_name: None,
            avatar_url: None,
            bio: None,
            follower_count: 0,
            following_count: 0,
            is_following: false,
            is_blocked: false,
        }
    }

    /// Display name, falling back to the handle
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}

impl Entity for Profile {
    fn entity_id(&self) -> &str {
        &self.id
    }
}
