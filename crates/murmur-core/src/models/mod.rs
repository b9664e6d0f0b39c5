//! Data models for murmur

mod chat;
mod notification;
mod post;
mod profile;

pub use chat::{Message, TypingSignal};
pub use notification::{Notification, NotificationKind};
pub use post::{extract_hashtags, extract_mentions, Post};
pub use profile::Profile;

/// A cached record addressable by a stable backend id.
///
/// The query cache patches entities in place of each other by comparing
/// these ids, so two values with the same id must describe the same row.
pub trait Entity: Clone + Send + Sync + 'static {
    fn entity_id(&self) -> &str;
}
