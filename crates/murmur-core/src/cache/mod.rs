//! Process-wide query cache.
//!
//! Query results are stored type-erased under structured [`QueryKey`]s so
//! one store can hold posts, profiles and messages side by side. Feature
//! code talks to the [`CacheStore`] trait (and the typed helpers in
//! [`CacheStoreExt`]) so tests can swap in their own store.

mod client;
mod key;
mod memory;
mod pages;

use std::any::Any;
use std::sync::Arc;

use tokio::sync::broadcast;

pub use client::{QueryClient, QueryWatcher};
pub use key::{keys, KeyPart, QueryKey};
pub use memory::MemoryQueryCache;
pub use pages::{CachedPage, PagedData};

use crate::models::Entity;

/// Type-erased cached query result, always a `PagedData<T>` in practice
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Entries captured from the store, restorable verbatim
pub type CacheSnapshot = Vec<(QueryKey, CacheValue)>;

/// Change notification broadcast to cache subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(QueryKey),
    Removed(QueryKey),
    Invalidated(QueryKey),
}

impl CacheEvent {
    pub const fn key(&self) -> &QueryKey {
        match self {
            Self::Updated(key) | Self::Removed(key) | Self::Invalidated(key) => key,
        }
    }
}

/// Handle for one in-flight fetch of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub(crate) key: QueryKey,
    pub(crate) generation: u64,
}

impl FetchTicket {
    pub const fn key(&self) -> &QueryKey {
        &self.key
    }
}

/// Storage contract for the shared query cache.
///
/// Every method is synchronous and applies its whole effect in one
/// critical section; callers never observe a partially applied update.
pub trait CacheStore: Send + Sync {
    fn get_value(&self, key: &QueryKey) -> Option<CacheValue>;

    /// Store a fresh value, clearing any stale mark
    fn set_value(&self, key: QueryKey, value: CacheValue);

    fn remove(&self, key: &QueryKey) -> Option<CacheValue>;

    fn keys_matching(&self, pattern: &QueryKey) -> Vec<QueryKey>;

    /// Capture every entry matching `pattern`, in key order
    fn snapshot(&self, pattern: &QueryKey) -> CacheSnapshot;

    /// Put captured entries back exactly as they were captured
    fn restore(&self, snapshot: CacheSnapshot);

    /// Rewrite entries matching `pattern`. `update` returns `None` to leave
    /// an entry alone. Returns how many entries were replaced.
    fn update_matching(
        &self,
        pattern: &QueryKey,
        update: &mut dyn FnMut(&QueryKey, &CacheValue) -> Option<CacheValue>,
    ) -> usize;

    /// Mark matching entries stale and notify subscribers
    fn invalidate(&self, pattern: &QueryKey) -> usize;

    /// Missing entries count as stale
    fn is_stale(&self, key: &QueryKey) -> bool;

    fn begin_fetch(&self, key: &QueryKey) -> FetchTicket;

    /// Close out a fetch. Returns `false` when the fetch was cancelled
    /// after it started, in which case its result must be dropped.
    fn finish_fetch(&self, ticket: &FetchTicket) -> bool;

    /// Cancel in-flight fetches under `pattern`; returns how many
    fn cancel_queries(&self, pattern: &QueryKey) -> usize;

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent>;
}

/// Typed access on top of [`CacheStore`]
pub trait CacheStoreExt: CacheStore {
    fn get_data<T: Entity>(&self, key: &QueryKey) -> Option<Arc<PagedData<T>>> {
        self.get_value(key)?.downcast::<PagedData<T>>().ok()
    }

    fn set_data<T: Entity>(&self, key: QueryKey, data: PagedData<T>) {
        self.set_value(key, Arc::new(data));
    }

    /// Patch every cached copy of entity `id` under `pattern` in a single
    /// pass. Entries holding other entity types are skipped.
    fn patch_entity<T, F>(&self, pattern: &QueryKey, id: &str, update: F) -> usize
    where
        T: Entity,
        F: Fn(&T) -> Option<T>,
    {
        self.update_matching(pattern, &mut |_, value| {
            let data = Arc::clone(value).downcast::<PagedData<T>>().ok()?;
            let patched = data.patch_entity(id, &update)?;
            Some(Arc::new(patched) as CacheValue)
        })
    }

    /// First cached copy of entity `id` under `pattern`, in key order
    fn find_entity<T: Entity>(&self, pattern: &QueryKey, id: &str) -> Option<T> {
        self.keys_matching(pattern)
            .iter()
            .filter_map(|key| self.get_data::<T>(key))
            .find_map(|data| data.find(id).cloned())
    }
}

impl<C: CacheStore + ?Sized> CacheStoreExt for C {}
