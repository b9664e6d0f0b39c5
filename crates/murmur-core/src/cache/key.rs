//! Structured query keys

use std::fmt;

use serde::Serialize;

/// One segment of a [`QueryKey`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyPart {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{value:?}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Address of a cached query, e.g. `["posts", "feed", "u1"]`.
///
/// A key used as a pattern matches itself and every key it is a prefix of.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Extend the key with one more segment
    #[must_use]
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prefix match. The empty key matches everything.
    pub fn matches(&self, pattern: &Self) -> bool {
        self.0.starts_with(&pattern.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, part) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}

/// Build a [`QueryKey`] from heterogeneous segments.
///
/// ```
/// use murmur_core::query_key;
///
/// let key = query_key!["posts", "feed", "u1"];
/// assert!(key.matches(&query_key!["posts"]));
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::cache::QueryKey::new(
            ::std::vec![$($crate::cache::KeyPart::from($part)),*]
        )
    };
}

/// Well-known keys used by feeds, profiles and chat.
pub mod keys {
    use super::QueryKey;

    pub fn posts() -> QueryKey {
        QueryKey::new(["posts"])
    }

    pub fn home_feed(viewer_id: &str) -> QueryKey {
        posts().with("feed").with(viewer_id)
    }

    pub fn user_posts(user_id: &str) -> QueryKey {
        posts().with("user").with(user_id)
    }

    pub fn saved_posts(user_id: &str) -> QueryKey {
        posts().with("saved").with(user_id)
    }

    pub fn post_detail(post_id: &str) -> QueryKey {
        posts().with("detail").with(post_id)
    }

    pub fn profiles() -> QueryKey {
        QueryKey::new(["profiles"])
    }

    pub fn profile_detail(user_id: &str) -> QueryKey {
        profiles().with("detail").with(user_id)
    }

    pub fn followers(user_id: &str) -> QueryKey {
        profiles().with("followers").with(user_id)
    }

    pub fn following(user_id: &str) -> QueryKey {
        profiles().with("following").with(user_id)
    }

    pub fn blocked_users(viewer_id: &str) -> QueryKey {
        profiles().with("blocked").with(viewer_id)
    }

    pub fn conversations() -> QueryKey {
        QueryKey::new(["conversations"])
    }

    pub fn messages(conversation_id: &str) -> QueryKey {
        QueryKey::new(["messages"]).with(conversation_id)
    }

    pub fn notifications(user_id: &str) -> QueryKey {
        QueryKey::new(["notifications"]).with(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching() {
        let key = query_key!["posts", "feed", "u1"];
        assert!(key.matches(&query_key!["posts"]));
        assert!(key.matches(&query_key!["posts", "feed"]));
        assert!(key.matches(&key.clone()));
        assert!(key.matches(&QueryKey::default()));
        assert!(!key.matches(&query_key!["posts", "user"]));
        assert!(!query_key!["posts"].matches(&key));
    }

    #[test]
    fn mixed_part_types_do_not_collide() {
        assert_ne!(query_key!["page", 1_i64], query_key!["page", "1"]);
    }

    #[test]
    fn display_renders_json_like_array() {
        let key = query_key!["posts", "detail", 7_i64, true];
        assert_eq!(key.to_string(), r#"["posts", "detail", 7, true]"#);
    }

    #[test]
    fn well_known_keys_nest_under_roots() {
        assert!(keys::home_feed("u1").matches(&keys::posts()));
        assert!(keys::saved_posts("u1").matches(&keys::posts()));
        assert!(keys::followers("u1").matches(&keys::profiles()));
        assert!(!keys::messages("c1").matches(&keys::conversations()));
    }
}
