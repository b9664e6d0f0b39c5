//! Post feeds: fetch pages newest first and fill in the viewer's flags.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::auth::{AuthContext, AuthError};
use crate::backend::{
    value_as_text, DataApi, EdgeRelation, Filter, KeysetBound, RemoteError, RemoteResult,
    SelectQuery,
};
use crate::cache::{keys, CachedPage, PagedData, QueryClient, QueryKey};
use crate::models::Post;
use crate::Result;

pub const DEFAULT_PAGE_SIZE: usize = 20;

const POSTS_TABLE: &str = "posts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    /// Everything, newest first
    Home,
    /// Posts written by one user
    User(String),
    /// Posts the viewer saved
    Saved,
}

impl FeedScope {
    /// Cache key for this scope as seen by `viewer`
    pub fn query_key(&self, viewer: Option<&str>) -> Result<QueryKey> {
        match self {
            Self::Home => Ok(keys::home_feed(viewer.unwrap_or("anonymous"))),
            Self::User(user_id) => Ok(keys::user_posts(user_id)),
            Self::Saved => viewer
                .map(keys::saved_posts)
                .ok_or_else(|| AuthError::NotAuthenticated.into()),
        }
    }
}

/// Position after the last post of a page.
///
/// Posts are ordered by `created_at` then `id`, both descending, so a
/// cursor needs both to resume without skipping posts created in the same
/// instant. Encoded as `<created_at>|<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: String,
    pub id: String,
}

impl FeedCursor {
    const SEPARATOR: char = '|';

    fn from_row(row: &Value) -> Option<Self> {
        Some(Self {
            created_at: row.get("created_at").and_then(value_as_text)?,
            id: row.get("id").and_then(value_as_text)?,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.created_at, Self::SEPARATOR, self.id)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (created_at, id) = raw.split_once(Self::SEPARATOR)?;
        if created_at.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self {
            created_at: created_at.to_string(),
            id: id.to_string(),
        })
    }

    fn bound(&self) -> KeysetBound {
        KeysetBound::new("created_at", &self.created_at, "id", &self.id)
    }
}

pub struct FeedLoader<D> {
    api: Arc<D>,
    auth: Arc<dyn AuthContext>,
    page_size: usize,
}

impl<D: DataApi> FeedLoader<D> {
    pub fn new(api: Arc<D>, auth: Arc<dyn AuthContext>) -> Self {
        Self {
            api,
            auth,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// First page of `scope`, served from the cache while fresh
    pub async fn fetch(&self, client: &QueryClient, scope: &FeedScope) -> Result<Arc<PagedData<Post>>> {
        let viewer = self.auth.current_actor();
        let key = scope.query_key(viewer.as_deref())?;
        let data = client
            .fetch(key, || self.load_page(scope, viewer.as_deref(), None))
            .await?;
        Ok(data)
    }

    /// Append the next page of `scope`. `None` once the feed is exhausted.
    pub async fn fetch_more(
        &self,
        client: &QueryClient,
        scope: &FeedScope,
    ) -> Result<Option<Arc<PagedData<Post>>>> {
        let viewer = self.auth.current_actor();
        let key = scope.query_key(viewer.as_deref())?;
        let data = client
            .fetch_next_page(&key, |cursor| async move {
                self.load_page(scope, viewer.as_deref(), Some(&cursor)).await
            })
            .await?;
        Ok(data)
    }

    /// One page of posts after `cursor`.
    ///
    /// The cursor is the encoded [`FeedCursor`] of the last post on the
    /// previous page; a short page means the feed is exhausted.
    pub async fn load_page(
        &self,
        scope: &FeedScope,
        viewer: Option<&str>,
        cursor: Option<&str>,
    ) -> RemoteResult<CachedPage<Post>> {
        let mut query = SelectQuery::new(POSTS_TABLE)
            .order_desc("created_at")
            .order_desc("id")
            .limit(self.page_size);
        if let Some(raw) = cursor {
            let cursor = FeedCursor::parse(raw)
                .ok_or_else(|| RemoteError::Decode(format!("Invalid feed cursor '{raw}'")))?;
            query = query.before(cursor.bound());
        }
        match scope {
            FeedScope::Home => {}
            FeedScope::User(user_id) => query = query.filter(Filter::eq("author_id", user_id)),
            FeedScope::Saved => {
                let Some(viewer) = viewer else {
                    return Ok(CachedPage::new(Vec::new(), None));
                };
                let saved = self.edge_targets(&EdgeRelation::SAVES, viewer, None).await?;
                if saved.is_empty() {
                    return Ok(CachedPage::new(Vec::new(), None));
                }
                query = query.filter(Filter::in_list("id", saved));
            }
        }

        let rows = self.api.select(&query).await?;
        let next_cursor = if rows.len() >= self.page_size {
            rows.last()
                .and_then(FeedCursor::from_row)
                .map(|cursor| cursor.encode())
        } else {
            None
        };
        let mut posts = rows
            .into_iter()
            .map(serde_json::from_value::<Post>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(RemoteError::from)?;

        if let Some(viewer) = viewer {
            self.decorate(viewer, &mut posts).await?;
        }
        tracing::debug!(scope = ?scope, count = posts.len(), more = next_cursor.is_some(), "Loaded feed page");
        Ok(CachedPage::new(posts, next_cursor))
    }

    /// Fill `is_liked`, `is_saved` and `is_shared` from the viewer's edges
    async fn decorate(&self, viewer: &str, posts: &mut [Post]) -> RemoteResult<()> {
        if posts.is_empty() {
            return Ok(());
        }
        let ids = posts.iter().map(|post| post.id.clone()).collect::<Vec<_>>();
        let liked = self.edge_targets(&EdgeRelation::LIKES, viewer, Some(ids.as_slice())).await?;
        let saved = self.edge_targets(&EdgeRelation::SAVES, viewer, Some(ids.as_slice())).await?;
        let shared = self.edge_targets(&EdgeRelation::SHARES, viewer, Some(ids.as_slice())).await?;
        for post in posts {
            post.is_liked = liked.contains(&post.id);
            post.is_saved = saved.contains(&post.id);
            post.is_shared = shared.contains(&post.id);
        }
        Ok(())
    }

    async fn edge_targets(
        &self,
        relation: &EdgeRelation,
        actor_id: &str,
        among: Option<&[String]>,
    ) -> RemoteResult<HashSet<String>> {
        let mut query = SelectQuery::new(relation.table)
            .columns(relation.target_column)
            .filter(Filter::eq(relation.actor_column, actor_id));
        if let Some(ids) = among {
            query = query.filter(Filter::in_list(relation.target_column, ids.iter().cloned()));
        }
        let rows = self.api.select(&query).await?;
        Ok(rows
            .iter()
            .filter_map(|row: &Value| row.get(relation.target_column))
            .filter_map(value_as_text)
            .collect())
    }
}
