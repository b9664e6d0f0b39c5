//! In-memory cache store shared by every screen of the app

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use super::{CacheEvent, CacheSnapshot, CacheStore, CacheValue, FetchTicket, QueryKey};
use crate::config::CacheConfig;
use crate::util::lock;

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct CacheEntry {
    value: CacheValue,
    updated_at: Instant,
    invalidated: bool,
}

#[derive(Default)]
struct FetchState {
    generation: u64,
    in_flight: usize,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<QueryKey, CacheEntry>,
    fetches: HashMap<QueryKey, FetchState>,
}

/// Thread-safe [`CacheStore`] backed by an ordered map.
///
/// Entries go stale when explicitly invalidated or once `stale_time` has
/// elapsed since they were last written.
pub struct MemoryQueryCache {
    inner: Mutex<Inner>,
    stale_time: Duration,
    events: broadcast::Sender<CacheEvent>,
}

impl MemoryQueryCache {
    pub fn new(stale_time: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            stale_time,
            events,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.stale_time())
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, e.g. on sign-out
    pub fn clear(&self) {
        let removed = {
            let mut inner = lock(&self.inner);
            inner.fetches.clear();
            std::mem::take(&mut inner.entries)
        };
        tracing::debug!(entries = removed.len(), "Cleared query cache");
        for key in removed.into_keys() {
            self.emit(CacheEvent::Removed(key));
        }
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is the normal state when nothing is mounted.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryQueryCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl CacheStore for MemoryQueryCache {
    fn get_value(&self, key: &QueryKey) -> Option<CacheValue> {
        lock(&self.inner)
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }

    fn set_value(&self, key: QueryKey, value: CacheValue) {
        lock(&self.inner).entries.insert(
            key.clone(),
            CacheEntry {
                value,
                updated_at: Instant::now(),
                invalidated: false,
            },
        );
        self.emit(CacheEvent::Updated(key));
    }

    fn remove(&self, key: &QueryKey) -> Option<CacheValue> {
        let removed = lock(&self.inner).entries.remove(key)?;
        self.emit(CacheEvent::Removed(key.clone()));
        Some(removed.value)
    }

    fn keys_matching(&self, pattern: &QueryKey) -> Vec<QueryKey> {
        lock(&self.inner)
            .entries
            .keys()
            .filter(|key| key.matches(pattern))
            .cloned()
            .collect()
    }

    fn snapshot(&self, pattern: &QueryKey) -> CacheSnapshot {
        lock(&self.inner)
            .entries
            .iter()
            .filter(|(key, _)| key.matches(pattern))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    fn restore(&self, snapshot: CacheSnapshot) {
        let now = Instant::now();
        let keys = {
            let mut inner = lock(&self.inner);
            snapshot
                .into_iter()
                .map(|(key, value)| {
                    inner.entries.insert(
                        key.clone(),
                        CacheEntry {
                            value,
                            updated_at: now,
                            invalidated: false,
                        },
                    );
                    key
                })
                .collect::<Vec<_>>()
        };
        for key in keys {
            self.emit(CacheEvent::Updated(key));
        }
    }

    fn update_matching(
        &self,
        pattern: &QueryKey,
        update: &mut dyn FnMut(&QueryKey, &CacheValue) -> Option<CacheValue>,
    ) -> usize {
        let now = Instant::now();
        let updated = {
            let mut inner = lock(&self.inner);
            inner
                .entries
                .iter_mut()
                .filter(|(key, _)| key.matches(pattern))
                .filter_map(|(key, entry)| {
                    let next = update(key, &entry.value)?;
                    entry.value = next;
                    entry.updated_at = now;
                    Some(key.clone())
                })
                .collect::<Vec<_>>()
        };
        let count = updated.len();
        for key in updated {
            self.emit(CacheEvent::Updated(key));
        }
        count
    }

    fn invalidate(&self, pattern: &QueryKey) -> usize {
        let invalidated = {
            let mut inner = lock(&self.inner);
            inner
                .entries
                .iter_mut()
                .filter(|(key, _)| key.matches(pattern))
                .map(|(key, entry)| {
                    entry.invalidated = true;
                    key.clone()
                })
                .collect::<Vec<_>>()
        };
        tracing::debug!(%pattern, entries = invalidated.len(), "Invalidated queries");
        let count = invalidated.len();
        for key in invalidated {
            self.emit(CacheEvent::Invalidated(key));
        }
        count
    }

    fn is_stale(&self, key: &QueryKey) -> bool {
        lock(&self.inner).entries.get(key).map_or(true, |entry| {
            entry.invalidated || entry.updated_at.elapsed() >= self.stale_time
        })
    }

    fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
        let mut inner = lock(&self.inner);
        let state = inner.fetches.entry(key.clone()).or_default();
        state.in_flight += 1;
        FetchTicket {
            key: key.clone(),
            generation: state.generation,
        }
    }

    fn finish_fetch(&self, ticket: &FetchTicket) -> bool {
        let mut inner = lock(&self.inner);
        let Some(state) = inner.fetches.get_mut(&ticket.key) else {
            return false;
        };
        if state.generation != ticket.generation {
            return false;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        true
    }

    fn cancel_queries(&self, pattern: &QueryKey) -> usize {
        let mut inner = lock(&self.inner);
        let mut cancelled = 0;
        for (key, state) in &mut inner.fetches {
            if state.in_flight > 0 && key.matches(pattern) {
                cancelled += state.in_flight;
                state.in_flight = 0;
                state.generation += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!(%pattern, cancelled, "Cancelled in-flight queries");
        }
        cancelled
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{CacheStoreExt, PagedData};
    use crate::models::Post;
    use crate::query_key;

    fn feed(ids: &[&str]) -> PagedData<Post> {
        PagedData::single_page(
            ids.iter()
                .map(|id| Post::new(*id, "author", "hello"))
                .collect(),
            None,
        )
    }

    #[test]
    fn typed_roundtrip_and_type_mismatch() {
        let cache = MemoryQueryCache::new(Duration::from_secs(60));
        let key = query_key!["posts", "feed"];
        cache.set_data(key.clone(), feed(&["p1"]));

        assert_eq!(cache.get_data::<Post>(&key).unwrap().len(), 1);
        assert!(cache
            .get_data::<crate::models::Profile>(&key)
            .is_none());
    }

    #[test]
    fn invalidate_marks_only_matching_entries() {
        let cache = MemoryQueryCache::new(Duration::from_secs(60));
        cache.set_data(query_key!["posts", "feed"], feed(&["p1"]));
        cache.set_data(query_key!["posts", "user", "u1"], feed(&["p2"]));
        cache.set_data(query_key!["profiles", "detail", "u1"], feed(&["p3"]));

        assert_eq!(cache.invalidate(&query_key!["posts"]), 2);
        assert!(cache.is_stale(&query_key!["posts", "feed"]));
        assert!(cache.is_stale(&query_key!["posts", "user", "u1"]));
        assert!(!cache.is_stale(&query_key!["profiles", "detail", "u1"]));
    }

    #[test]
    fn missing_entries_are_stale() {
        let cache = MemoryQueryCache::new(Duration::from_secs(60));
        assert!(cache.is_stale(&query_key!["nothing"]));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_go_stale_after_stale_time() {
        let cache = MemoryQueryCache::new(Duration::from_secs(30));
        let key = query_key!["posts", "feed"];
        cache.set_data(key.clone(), feed(&["p1"]));
        assert!(!cache.is_stale(&key));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.is_stale(&key));
    }

    #[test]
    fn cancelled_fetch_is_rejected() {
        let cache = MemoryQueryCache::default();
        let key = query_key!["posts", "feed"];

        let ticket = cache.begin_fetch(&key);
        assert_eq!(cache.cancel_queries(&query_key!["posts"]), 1);
        assert!(!cache.finish_fetch(&ticket));

        let retry = cache.begin_fetch(&key);
        assert!(cache.finish_fetch(&retry));
        assert_eq!(cache.cancel_queries(&query_key!["posts"]), 0);
    }

    #[test]
    fn snapshot_restore_is_pointer_identical() {
        let cache = MemoryQueryCache::default();
        let key = query_key!["posts", "feed"];
        cache.set_data(key.clone(), feed(&["p1", "p2"]));

        let snapshot = cache.snapshot(&query_key!["posts"]);
        let before = cache.get_value(&key).unwrap();
        cache.set_data(key.clone(), feed(&["p9"]));
        cache.restore(snapshot);

        assert!(Arc::ptr_eq(&before, &cache.get_value(&key).unwrap()));
    }

    #[tokio::test]
    async fn subscribers_see_invalidation_events() {
        let cache = MemoryQueryCache::default();
        let key = query_key!["posts", "feed"];
        cache.set_data(key.clone(), feed(&["p1"]));

        let mut events = cache.subscribe();
        cache.invalidate(&query_key!["posts"]);
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Invalidated(key));
    }

    #[test]
    fn clear_empties_the_store() {
        let cache = MemoryQueryCache::default();
        cache.set_data(query_key!["posts", "feed"], feed(&["p1"]));
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
