//! Paginated query results

use std::sync::Arc;

use crate::models::Entity;

/// One fetched page of a list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage<T> {
    pub items: Vec<T>,
    /// Cursor for the page after this one, `None` at the end of the list
    pub next_cursor: Option<String>,
}

impl<T> CachedPage<T> {
    pub const fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }
}

/// Every page fetched so far for one query key.
///
/// Pages are shared behind `Arc` so a patch that touches one page leaves
/// the others pointer-identical to what observers already hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedData<T> {
    pub pages: Vec<Arc<CachedPage<T>>>,
}

impl<T> Default for PagedData<T> {
    fn default() -> Self {
        Self { pages: Vec::new() }
    }
}

impl<T: Entity> PagedData<T> {
    pub fn single_page(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self {
            pages: vec![Arc::new(CachedPage::new(items, next_cursor))],
        }
    }

    /// Detail queries hold a single entity in a single page
    pub fn single(item: T) -> Self {
        Self::single_page(vec![item], None)
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: &str) -> Option<&T> {
        self.items().find(|item| item.entity_id() == id)
    }

    /// Cursor to request the next page with; `None` once exhausted
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages.last().and_then(|page| page.next_cursor.as_deref())
    }

    #[must_use]
    pub fn with_page_appended(&self, page: CachedPage<T>) -> Self {
        let mut pages = self.pages.clone();
        pages.push(Arc::new(page));
        Self { pages }
    }

    /// Insert an entity at the top of the first page, replacing any copy
    /// already present elsewhere in the list.
    #[must_use]
    pub fn with_item_prepended(&self, item: T) -> Self {
        let id = item.entity_id().to_string();
        let mut data = self.without_entity(&id).unwrap_or_else(|| self.clone());
        match data.pages.first_mut() {
            Some(first) => {
                let mut items = Vec::with_capacity(first.items.len() + 1);
                items.push(item);
                items.extend(first.items.iter().cloned());
                *first = Arc::new(CachedPage::new(items, first.next_cursor.clone()));
            }
            None => data.pages.push(Arc::new(CachedPage::new(vec![item], None))),
        }
        data
    }

    /// Apply `update` to every entity with the given id.
    ///
    /// `update` returns `None` to leave an entity untouched. Returns `None`
    /// when no entity changed; otherwise only the pages holding a changed
    /// entity are reallocated.
    pub fn patch_entity<F>(&self, id: &str, update: F) -> Option<Self>
    where
        F: Fn(&T) -> Option<T>,
    {
        let mut changed = false;
        let pages = self
            .pages
            .iter()
            .map(|page| {
                let mut page_changed = false;
                let items = page
                    .items
                    .iter()
                    .map(|item| {
                        if item.entity_id() != id {
                            return item.clone();
                        }
                        update(item).map_or_else(
                            || item.clone(),
                            |next| {
                                page_changed = true;
                                next
                            },
                        )
                    })
                    .collect::<Vec<_>>();

                if page_changed {
                    changed = true;
                    Arc::new(CachedPage::new(items, page.next_cursor.clone()))
                } else {
                    Arc::clone(page)
                }
            })
            .collect();

        changed.then_some(Self { pages })
    }

    /// Drop every entity with the given id. `None` when nothing matched.
    pub fn without_entity(&self, id: &str) -> Option<Self> {
        self.retain(|item| item.entity_id() != id)
    }

    /// Keep only entities accepted by `keep`. `None` when nothing was removed.
    pub fn retain<F>(&self, keep: F) -> Option<Self>
    where
        F: Fn(&T) -> bool,
    {
        let mut changed = false;
        let pages = self
            .pages
            .iter()
            .map(|page| {
                if page.items.iter().all(&keep) {
                    return Arc::clone(page);
                }
                changed = true;
                let items = page.items.iter().filter(|item| keep(*item)).cloned().collect();
                Arc::new(CachedPage::new(items, page.next_cursor.clone()))
            })
            .collect();

        changed.then_some(Self { pages })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::Post;

    fn post(id: &str, likes: i64) -> Post {
        let mut post = Post::new(id, "author", format!("post {id}"));
        post.like_count = likes;
        post
    }

    fn two_pages() -> PagedData<Post> {
        PagedData {
            pages: vec![
                Arc::new(CachedPage::new(
                    vec![post("p1", 1), post("p2", 2)],
                    Some("c1".into()),
                )),
                Arc::new(CachedPage::new(vec![post("p3", 3)], None)),
            ],
        }
    }

    #[test]
    fn patch_reallocates_only_touched_pages() {
        let data = two_pages();
        let patched = data
            .patch_entity("p3", |p| {
                let mut next = p.clone();
                next.like_count += 1;
                Some(next)
            })
            .unwrap();

        assert!(Arc::ptr_eq(&data.pages[0], &patched.pages[0]));
        assert!(!Arc::ptr_eq(&data.pages[1], &patched.pages[1]));
        assert_eq!(patched.find("p3").unwrap().like_count, 4);
        assert_eq!(data.find("p3").unwrap().like_count, 3);
    }

    #[test]
    fn patch_without_match_returns_none() {
        let data = two_pages();
        assert!(data.patch_entity("missing", |p| Some(p.clone())).is_none());
        assert!(data.patch_entity("p1", |_| None).is_none());
    }

    #[test]
    fn prepend_moves_existing_copy_to_top() {
        let data = two_pages();
        let updated = data.with_item_prepended(post("p3", 9));
        let ids = updated.items().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["p3", "p1", "p2"]);
        assert_eq!(updated.pages[0].next_cursor.as_deref(), Some("c1"));
    }

    #[test]
    fn prepend_into_empty_creates_first_page() {
        let data = PagedData::<Post>::default();
        let updated = data.with_item_prepended(post("p1", 0));
        assert_eq!(updated.len(), 1);
        assert_eq!(updated.next_cursor(), None);
    }

    #[test]
    fn next_cursor_comes_from_last_page() {
        let data = PagedData::single_page(vec![post("p1", 0)], Some("c1".into()));
        assert_eq!(data.next_cursor(), Some("c1"));
        let data = data.with_page_appended(CachedPage::new(vec![post("p2", 0)], None));
        assert_eq!(data.next_cursor(), None);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn retain_keeps_untouched_pages_shared() {
        let data = two_pages();
        let filtered = data.retain(|p| p.id != "p2").unwrap();
        assert!(Arc::ptr_eq(&data.pages[1], &filtered.pages[1]));
        assert_eq!(filtered.len(), 2);
        assert!(data.retain(|_| true).is_none());
    }
}
