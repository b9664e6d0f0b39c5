//! Unread notification badge, kept live from realtime row changes.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::{DataApi, Filter, RemoteResult, SelectQuery};
use crate::cache::{keys, QueryClient};
use crate::realtime::{topics, ChangeEvent, ChangeKind, RealtimeHub};

pub const NOTIFICATIONS_TABLE: &str = "notifications";

/// Just the columns the counter reads
#[derive(Debug, Deserialize)]
struct NotificationRow {
    id: String,
    user_id: Option<String>,
    #[serde(default)]
    read: bool,
}

/// Ids of unread notifications addressed to one user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCounter {
    user_id: String,
    unread: HashSet<String>,
}

impl UnreadCounter {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            unread: HashSet::new(),
        }
    }

    pub fn with_unread<I, S>(user_id: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            unread: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Count from the backend's current unread rows
    pub async fn load<D: DataApi>(api: &D, user_id: &str) -> RemoteResult<Self> {
        let rows = api
            .select(
                &SelectQuery::new(NOTIFICATIONS_TABLE)
                    .columns("id")
                    .filter(Filter::eq("user_id", user_id))
                    .filter(Filter::eq("read", "false")),
            )
            .await?;
        let ids = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(serde_json::Value::as_str))
            .map(str::to_string)
            .collect::<Vec<_>>();
        Ok(Self::with_unread(user_id, ids))
    }

    pub fn count(&self) -> usize {
        self.unread.len()
    }

    pub fn mark_all_read(&mut self) {
        self.unread.clear();
    }

    /// Fold one change in. Returns `true` when the count changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if event.table != NOTIFICATIONS_TABLE {
            return false;
        }
        let before = self.unread.len();
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                let Some(row) = event.new_row::<NotificationRow>() else {
                    return false;
                };
                if row.user_id.as_deref().is_some_and(|user| user != self.user_id) {
                    return false;
                }
                if row.read {
                    self.unread.remove(&row.id);
                } else {
                    self.unread.insert(row.id);
                }
            }
            ChangeKind::Delete => {
                if let Some(row) = event.old_row::<NotificationRow>() {
                    self.unread.remove(&row.id);
                }
            }
        }
        self.unread.len() != before
    }
}

/// Background task applying `user:<id>` notification changes to a counter.
///
/// Each change also marks the cached notification list stale. Dropping
/// the watcher stops the task and unsubscribes.
pub struct UnreadWatcher {
    count: watch::Receiver<usize>,
    task: JoinHandle<()>,
}

impl UnreadWatcher {
    pub fn start(hub: &RealtimeHub, client: Option<Arc<QueryClient>>, mut counter: UnreadCounter) -> Self {
        let user_id = counter.user_id.clone();
        let mut subscription = hub.subscribe(&topics::user(&user_id), [NOTIFICATIONS_TABLE]);
        let (count_tx, count) = watch::channel(counter.count());

        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if let Some(client) = &client {
                    client.invalidate(&keys::notifications(&user_id));
                }
                if counter.apply(&event) {
                    tracing::debug!(user = %user_id, unread = counter.count(), "Unread notifications changed");
                    count_tx.send_replace(counter.count());
                }
            }
        });

        Self { count, task }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }
}

impl Drop for UnreadWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::backend::MemoryDataApi;
    use crate::cache::{CacheStore, MemoryQueryCache};

    fn row(id: &str, user_id: &str, read: bool) -> serde_json::Value {
        json!({ "id": id, "user_id": user_id, "read": read })
    }

    #[test]
    fn inserts_updates_and_deletes() {
        let mut counter = UnreadCounter::new("u1");
        assert!(counter.apply(&ChangeEvent::insert(NOTIFICATIONS_TABLE, row("n1", "u1", false))));
        assert!(counter.apply(&ChangeEvent::insert(NOTIFICATIONS_TABLE, row("n2", "u1", false))));
        assert!(!counter.apply(&ChangeEvent::insert(NOTIFICATIONS_TABLE, row("n3", "u2", false))));
        assert_eq!(counter.count(), 2);

        assert!(counter.apply(&ChangeEvent::update(
            NOTIFICATIONS_TABLE,
            row("n1", "u1", false),
            row("n1", "u1", true),
        )));
        assert!(counter.apply(&ChangeEvent::delete(NOTIFICATIONS_TABLE, row("n2", "u1", false))));
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn duplicate_insert_counts_once() {
        let mut counter = UnreadCounter::new("u1");
        counter.apply(&ChangeEvent::insert(NOTIFICATIONS_TABLE, row("n1", "u1", false)));
        assert!(!counter.apply(&ChangeEvent::insert(NOTIFICATIONS_TABLE, row("n1", "u1", false))));
        assert_eq!(counter.count(), 1);
    }

    #[tokio::test]
    async fn load_counts_unread_rows() {
        let api = MemoryDataApi::new();
        api.seed(
            NOTIFICATIONS_TABLE,
            [row("n1", "u1", false), row("n2", "u1", true), row("n3", "u2", false)],
        );
        let counter = UnreadCounter::load(&api, "u1").await.unwrap();
        assert_eq!(counter.count(), 1);
    }

    #[tokio::test]
    async fn watcher_tracks_realtime_changes() {
        let hub = RealtimeHub::new();
        let cache = Arc::new(MemoryQueryCache::default());
        let client = Arc::new(QueryClient::new(Arc::clone(&cache) as Arc<dyn CacheStore>));
        let watcher = UnreadWatcher::start(
            &hub,
            Some(client),
            UnreadCounter::with_unread("u1", ["n0"]),
        );
        assert_eq!(watcher.count(), 1);

        let mut count = watcher.watch();
        hub.publish("user:u1", ChangeEvent::insert(NOTIFICATIONS_TABLE, row("n1", "u1", false)));
        count.wait_for(|count| *count == 2).await.unwrap();
        assert_eq!(watcher.count(), 2);
    }
}
