//! Post model

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Entity;

/// A post as rendered in feeds.
///
/// Counter fields are denormalized on the `posts` row. The `is_*` viewer
/// flags are not columns; they are filled in per viewer after fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub save_count: i64,
    #[serde(default)]
    pub share_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_saved: bool,
    #[serde(default)]
    pub is_shared: bool,
}

impl Post {
    /// Create a post with zeroed counters, timestamped now
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            content: content.into(),
            media_url: None,
            created_at: Utc::now(),
            like_count: 0,
            save_count: 0,
            share_count: 0,
            comment_count: 0,
            is_liked: false,
            is_saved: false,
            is_shared: false,
        }
    }

    /// #hashtags in the post body
    #[must_use]
    pub fn hashtags(&self) -> Vec<String> {
        extract_hashtags(&self.content)
    }

    /// @mentions in the post body
    #[must_use]
    pub fn mentions(&self) -> Vec<String> {
        extract_mentions(&self.content)
    }
}

impl Entity for Post {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Extract #hashtags from text
///
/// Valid tags match `#[a-zA-Z][a-zA-Z0-9_]*`. Tags are lowercased and
/// deduplicated, in order of first appearance.
///
/// # Examples
///
/// ```
/// use murmur_core::models::extract_hashtags;
///
/// let tags = extract_hashtags("Sunset #Beach with #friends #beach");
/// assert_eq!(tags, vec!["beach".to_string(), "friends".to_string()]);
/// ```
#[must_use]
pub fn extract_hashtags(text: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"#([a-zA-Z][a-zA-Z0-9_]*)").expect("Invalid regex"));
    collect_unique(re, text, str::to_lowercase)
}

/// Extract @mentions from text
///
/// Usernames match `@[a-zA-Z0-9_.]+`, are lowercased and deduplicated.
#[must_use]
pub fn extract_mentions(text: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?:^|[^a-zA-Z0-9_])@([a-zA-Z0-9_][a-zA-Z0-9_.]*)").expect("Invalid regex")
    });
    // A trailing dot ends the sentence, not the username.
    collect_unique(re, text, |name| name.trim_end_matches('.').to_lowercase())
}

/// First capture of every match, normalized, in order of first appearance
fn collect_unique(re: &Regex, text: &str, normalize: impl Fn(&str) -> String) -> Vec<String> {
    let mut seen = HashSet::new();
    re.captures_iter(text)
        .map(|cap| normalize(&cap[1]))
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_post_starts_with_zero_counters() {
        let post = Post::new("p1", "u1", "hello");
        assert_eq!(post.like_count, 0);
        assert!(!post.is_liked);
        assert_eq!(post.entity_id(), "p1");
    }

    #[test]
    fn hashtags_are_lowercased_and_deduplicated() {
        let tags = extract_hashtags("#Rust #rust and #tokio_rs");
        assert_eq!(tags, vec!["rust", "tokio_rs"]);
    }

    #[test]
    fn hashtags_must_start_with_letter() {
        assert!(extract_hashtags("#123 #9lives").is_empty());
    }

    #[test]
    fn mentions_skip_email_addresses() {
        let mentions = extract_mentions("ping @Alice and @bob.smith. mail me at me@example.com");
        assert_eq!(mentions, vec!["alice", "bob.smith"]);
    }

    #[test]
    fn mentions_dedup_after_trailing_dot_is_dropped() {
        assert_eq!(extract_mentions("@bob. and @bob"), vec!["bob"]);
        assert_eq!(extract_mentions("cc @Ann, then @ann."), vec!["ann"]);
    }

    #[test]
    fn viewer_flags_default_when_missing_from_row() {
        let json = r#"{
            "id": "p1",
            "author_id": "u1",
            "content": "hi",
            "created_at": "2024-05-01T10:00:00Z",
            "like_count": 3
        }"#;
        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.like_count, 3);
        assert!(!post.is_liked);
        assert!(!post.is_saved);
        assert_eq!(post.media_url, None);
    }
}
