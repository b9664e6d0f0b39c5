//! Topic-addressed realtime channel.
//!
//! Row changes (and the typing/presence rows chat writes) are published to
//! a topic such as `conversation:<id>` and fanned out to every subscription
//! on that topic whose table filter accepts them. Topics with no remaining
//! subscribers are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::util::lock;

const DEFAULT_TOPIC_CAPACITY: usize = 64;

pub mod topics {
    pub fn conversation(conversation_id: &str) -> String {
        format!("conversation:{conversation_id}")
    }

    pub fn user(user_id: &str) -> String {
        format!("user:{user_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row change on a relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, row: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Insert,
            new: Some(row),
            old: None,
        }
    }

    pub fn update(table: impl Into<String>, old: Value, new: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Update,
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn delete(table: impl Into<String>, row: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(row),
        }
    }

    /// Decode the new row, if any
    pub fn new_row<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.new
            .clone()
            .and_then(|row| serde_json::from_value(row).ok())
    }

    pub fn old_row<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.old
            .clone()
            .and_then(|row| serde_json::from_value(row).ok())
    }
}

struct HubInner {
    topics: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    capacity: usize,
}

/// In-process realtime hub. Cheap to clone; clones share topics.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Listen on `topic` for changes to any of `tables` (all tables when empty)
    pub fn subscribe<I, S>(&self, topic: &str, tables: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let receiver = lock(&self.inner.topics)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe();
        tracing::debug!(topic, "Realtime subscription opened");
        Subscription {
            hub: Arc::clone(&self.inner),
            topic: topic.to_string(),
            tables: tables.into_iter().map(Into::into).collect(),
            receiver: Some(receiver),
        }
    }

    /// Deliver `event` to `topic`; returns how many subscriptions got it
    pub fn publish(&self, topic: &str, event: ChangeEvent) -> usize {
        let sender = lock(&self.inner.topics).get(topic).cloned();
        sender.map_or(0, |sender| sender.send(event).unwrap_or(0))
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.inner.topics)
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn topic_count(&self) -> usize {
        lock(&self.inner.topics).len()
    }
}

impl HubInner {
    fn prune(&self, topic: &str) {
        let mut topics = lock(&self.topics);
        if topics
            .get(topic)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            topics.remove(topic);
            tracing::debug!(topic, "Realtime topic closed");
        }
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    hub: Arc<HubInner>,
    topic: String,
    tables: Vec<String>,
    receiver: Option<broadcast::Receiver<ChangeEvent>>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn accepts(&self, event: &ChangeEvent) -> bool {
        self.tables.is_empty() || self.tables.iter().any(|table| *table == event.table)
    }

    /// Next event passing the table filter. `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "Realtime subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if self.receiver.take().is_some() {
            self.hub.prune(&self.topic);
            tracing::debug!(topic = %self.topic, "Realtime subscription closed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn delivers_only_filtered_tables() {
        let hub = RealtimeHub::new();
        let mut messages = hub.subscribe("conversation:c1", ["messages"]);

        hub.publish(
            "conversation:c1",
            ChangeEvent::insert("typing_status", json!({ "user_id": "u2" })),
        );
        hub.publish(
            "conversation:c1",
            ChangeEvent::insert("messages", json!({ "id": "m1" })),
        );

        let event = messages.recv().await.unwrap();
        assert_eq!(event.table, "messages");
        assert_eq!(event.new, Some(json!({ "id": "m1" })));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let hub = RealtimeHub::new();
        let _c1 = hub.subscribe("conversation:c1", Vec::<String>::new());
        assert_eq!(
            hub.publish("conversation:c2", ChangeEvent::insert("messages", json!({}))),
            0
        );
        assert_eq!(
            hub.publish("conversation:c1", ChangeEvent::insert("messages", json!({}))),
            1
        );
    }

    #[test]
    fn unsubscribe_and_drop_release_topics() {
        let hub = RealtimeHub::new();
        let first = hub.subscribe(&topics::user("u1"), ["notifications"]);
        let second = hub.subscribe(&topics::user("u1"), ["notifications"]);
        assert_eq!(hub.subscriber_count("user:u1"), 2);

        first.unsubscribe();
        assert_eq!(hub.subscriber_count("user:u1"), 1);
        drop(second);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn change_event_wire_shape() {
        let event = ChangeEvent::update("notifications", json!({ "read": false }), json!({ "read": true }));
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["kind"], "UPDATE");
        let decoded: ChangeEvent = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, event);
    }
}
