//! Fetch-through access to the shared cache

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::{
    CacheEvent, CacheStore, CacheStoreExt, CacheValue, CachedPage, PagedData, QueryKey,
};
use crate::models::Entity;

/// Entry point feature code uses to read and seed cached queries.
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<dyn CacheStore>,
}

impl QueryClient {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Return cached data when fresh, otherwise run `fetcher` and store its
    /// result as the first page.
    ///
    /// A fetch cancelled while in flight (for example by a mutation taking
    /// its optimistic snapshot) does not overwrite the cache; the caller
    /// receives whatever the cache holds instead.
    pub async fn fetch<T, E, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<Arc<PagedData<T>>, E>
    where
        T: Entity,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedPage<T>, E>>,
    {
        if !self.cache.is_stale(&key) {
            if let Some(data) = self.cache.get_data::<T>(&key) {
                tracing::debug!(%key, "Serving fresh query from cache");
                return Ok(data);
            }
        }

        let ticket = self.cache.begin_fetch(&key);
        let page = match fetcher().await {
            Ok(page) => page,
            Err(error) => {
                self.cache.finish_fetch(&ticket);
                return Err(error);
            }
        };

        let data = Arc::new(PagedData {
            pages: vec![Arc::new(page)],
        });
        if self.cache.finish_fetch(&ticket) {
            self.cache.set_value(key, Arc::clone(&data) as CacheValue);
            Ok(data)
        } else {
            tracing::debug!(%key, "Dropping result of cancelled fetch");
            Ok(self.cache.get_data::<T>(&key).unwrap_or(data))
        }
    }

    /// Fetch the page after the last cached one and append it.
    ///
    /// Returns `Ok(None)` when the list has no further pages or nothing is
    /// cached under `key` yet.
    pub async fn fetch_next_page<T, E, F, Fut>(
        &self,
        key: &QueryKey,
        fetcher: F,
    ) -> Result<Option<Arc<PagedData<T>>>, E>
    where
        T: Entity,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<CachedPage<T>, E>>,
    {
        let Some(cursor) = self
            .cache
            .get_data::<T>(key)
            .and_then(|data| data.next_cursor().map(str::to_string))
        else {
            return Ok(None);
        };

        let ticket = self.cache.begin_fetch(key);
        let page = match fetcher(cursor).await {
            Ok(page) => page,
            Err(error) => {
                self.cache.finish_fetch(&ticket);
                return Err(error);
            }
        };

        if !self.cache.finish_fetch(&ticket) {
            tracing::debug!(%key, "Dropping next page of cancelled fetch");
            return Ok(self.cache.get_data::<T>(key));
        }

        // Append to what is cached now; a mutation may have patched the
        // earlier pages while this page was loading.
        let current = self.cache.get_data::<T>(key).unwrap_or_default();
        let data = Arc::new(current.with_page_appended(page));
        self.cache.set_value(key.clone(), Arc::clone(&data) as CacheValue);
        Ok(Some(data))
    }

    /// Seed a freshly created entity at the top of a cached list.
    /// Lists that are not cached yet are left alone.
    pub fn prepend_item<T: Entity>(&self, key: &QueryKey, item: T) -> bool {
        let Some(current) = self.cache.get_data::<T>(key) else {
            return false;
        };
        self.cache
            .set_data(key.clone(), current.with_item_prepended(item));
        true
    }

    /// Remove an entity from every cached list under `pattern`
    pub fn remove_entity<T: Entity>(&self, pattern: &QueryKey, id: &str) -> usize {
        self.cache.update_matching(pattern, &mut |_, value| {
            let data = Arc::clone(value).downcast::<PagedData<T>>().ok()?;
            let filtered = data.without_entity(id)?;
            Some(Arc::new(filtered) as CacheValue)
        })
    }

    pub fn invalidate(&self, pattern: &QueryKey) -> usize {
        self.cache.invalidate(pattern)
    }

    /// Observe invalidations under `pattern`, the way a mounted list does
    pub fn watch(&self, pattern: QueryKey) -> QueryWatcher {
        QueryWatcher {
            pattern,
            events: self.cache.subscribe(),
        }
    }
}

/// Subscription to invalidation events for one key pattern.
///
/// Dropping the watcher detaches it from the cache.
pub struct QueryWatcher {
    pattern: QueryKey,
    events: broadcast::Receiver<CacheEvent>,
}

impl QueryWatcher {
    /// Wait for the next invalidated key under the watched pattern.
    ///
    /// Returns `None` once the cache is gone. A watcher that fell behind
    /// reports the pattern itself so the caller refetches everything.
    pub async fn next_invalidated(&mut self) -> Option<QueryKey> {
        loop {
            match self.events.recv().await {
                Ok(CacheEvent::Invalidated(key)) if key.matches(&self.pattern) => {
                    return Some(key);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(pattern = %self.pattern, skipped, "Query watcher lagged");
                    return Some(self.pattern.clone());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::MemoryQueryCache;
    use crate::models::Post;
    use crate::query_key;

    fn client() -> QueryClient {
        QueryClient::new(Arc::new(MemoryQueryCache::default()))
    }

    fn page(ids: &[&str], cursor: Option<&str>) -> CachedPage<Post> {
        CachedPage::new(
            ids.iter().map(|id| Post::new(*id, "a", "x")).collect(),
            cursor.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn fetch_serves_fresh_data_without_refetching() {
        let client = client();
        let calls = AtomicUsize::new(0);
        let key = query_key!["posts", "feed"];

        for _ in 0..2 {
            let data = client
                .fetch(key.clone(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(page(&["p1"], None))
                })
                .await
                .unwrap();
            assert_eq!(data.len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.invalidate(&query_key!["posts"]);
        client
            .fetch(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(page(&["p1", "p2"], None))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let client = client();
        let key = query_key!["posts", "feed"];
        let result = client
            .fetch::<Post, _, _, _>(key.clone(), || async { Err("offline".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "offline");
        assert!(client.cache().get_value(&key).is_none());
    }

    #[tokio::test]
    async fn cancelled_fetch_does_not_overwrite() {
        let client = client();
        let key = query_key!["posts", "feed"];
        client
            .cache()
            .set_data(key.clone(), PagedData::single_page(page(&["old"], None).items, None));
        client.invalidate(&key);

        let cache = Arc::clone(client.cache());
        let data = client
            .fetch(key.clone(), || async move {
                cache.cancel_queries(&query_key!["posts"]);
                Ok::<_, String>(page(&["new"], None))
            })
            .await
            .unwrap();

        assert!(data.find("old").is_some());
        assert!(data.find("new").is_none());
    }

    #[tokio::test]
    async fn next_page_appends_until_exhausted() {
        let client = client();
        let key = query_key!["posts", "feed"];
        client
            .fetch(key.clone(), || async { Ok::<_, String>(page(&["p1"], Some("c1"))) })
            .await
            .unwrap();

        let data = client
            .fetch_next_page(&key, |cursor| async move {
                assert_eq!(cursor, "c1");
                Ok::<_, String>(page(&["p2"], None))
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data.len(), 2);

        let done = client
            .fetch_next_page::<Post, String, _, _>(&key, |_| async {
                Err("no further pages to fetch".to_string())
            })
            .await
            .unwrap();
        assert!(done.is_none());
    }

    #[tokio::test]
    async fn prepend_and_remove() {
        let client = client();
        let key = query_key!["posts", "user", "u1"];
        assert!(!client.prepend_item(&key, Post::new("p0", "u1", "x")));

        client
            .cache()
            .set_data(key.clone(), PagedData::single_page(page(&["p1"], None).items, None));
        assert!(client.prepend_item(&key, Post::new("p0", "u1", "x")));
        assert_eq!(client.remove_entity::<Post>(&query_key!["posts"], "p1"), 1);

        let data = client.cache().get_data::<Post>(&key).unwrap();
        let ids = data.items().map(|p| p.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["p0".to_string()]);
    }

    #[tokio::test]
    async fn watcher_reports_matching_invalidations_only() {
        let client = client();
        client
            .cache()
            .set_data(query_key!["profiles", "detail", "u1"], PagedData::<Post>::default());
        client
            .cache()
            .set_data(query_key!["posts", "feed"], PagedData::<Post>::default());

        let mut watcher = client.watch(query_key!["posts"]);
        client.invalidate(&query_key!["profiles"]);
        client.invalidate(&query_key!["posts"]);

        assert_eq!(
            watcher.next_invalidated().await,
            Some(query_key!["posts", "feed"])
        );
    }
}
