//! Like, save, share, follow and block.
//!
//! Each action is the generic [`OptimisticToggle`] bound to one edge
//! relation, one flag/counter pair and the query groups it touches.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::AuthContext;
use crate::backend::{DataApi, EdgeRelation};
use crate::cache::{keys, CacheStore, QueryKey};
use crate::models::{Post, Profile};
use crate::mutation::{
    EdgeToggleExecutor, MutationResult, OptimisticToggle, PhaseListener, ToggleField, ToggleOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liked;

impl ToggleField<Post> for Liked {
    fn is_on(&self, post: &Post) -> bool {
        post.is_liked
    }

    fn set_on(&self, post: &mut Post, on: bool) {
        post.is_liked = on;
    }

    fn counter<'a>(&self, post: &'a mut Post) -> Option<&'a mut i64> {
        Some(&mut post.like_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Saved;

impl ToggleField<Post> for Saved {
    fn is_on(&self, post: &Post) -> bool {
        post.is_saved
    }

    fn set_on(&self, post: &mut Post, on: bool) {
        post.is_saved = on;
    }

    fn counter<'a>(&self, post: &'a mut Post) -> Option<&'a mut i64> {
        Some(&mut post.save_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shared;

impl ToggleField<Post> for Shared {
    fn is_on(&self, post: &Post) -> bool {
        post.is_shared
    }

    fn set_on(&self, post: &mut Post, on: bool) {
        post.is_shared = on;
    }

    fn counter<'a>(&self, post: &'a mut Post) -> Option<&'a mut i64> {
        Some(&mut post.share_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Following;

impl ToggleField<Profile> for Following {
    fn is_on(&self, profile: &Profile) -> bool {
        profile.is_following
    }

    fn set_on(&self, profile: &mut Profile, on: bool) {
        profile.is_following = on;
    }

    fn counter<'a>(&self, profile: &'a mut Profile) -> Option<&'a mut i64> {
        Some(&mut profile.follower_count)
    }
}

/// Blocking has no public counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blocked;

impl ToggleField<Profile> for Blocked {
    fn is_on(&self, profile: &Profile) -> bool {
        profile.is_blocked
    }

    fn set_on(&self, profile: &mut Profile, on: bool) {
        profile.is_blocked = on;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToggleAction {
    Like,
    Save,
    Share,
    Follow,
    Block,
}

impl ToggleAction {
    pub const ALL: [Self; 5] = [Self::Like, Self::Save, Self::Share, Self::Follow, Self::Block];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Save => "save",
            Self::Share => "share",
            Self::Follow => "follow",
            Self::Block => "block",
        }
    }

    pub const fn relation(self) -> EdgeRelation {
        match self {
            Self::Like => EdgeRelation::LIKES,
            Self::Save => EdgeRelation::SAVES,
            Self::Share => EdgeRelation::SHARES,
            Self::Follow => EdgeRelation::FOLLOWS,
            Self::Block => EdgeRelation::BLOCKS,
        }
    }

    /// Query groups patched optimistically
    pub fn patch_pattern(self) -> QueryKey {
        match self {
            Self::Like | Self::Save | Self::Share => keys::posts(),
            Self::Follow | Self::Block => keys::profiles(),
        }
    }

    /// Query groups marked stale on settle
    pub fn invalidate_patterns(self) -> Vec<QueryKey> {
        match self {
            Self::Like | Self::Save | Self::Share => vec![keys::posts()],
            // Who you follow decides what the home feed shows.
            Self::Follow => vec![keys::profiles(), keys::posts()],
            Self::Block => vec![keys::profiles(), keys::posts(), keys::conversations()],
        }
    }
}

impl fmt::Display for ToggleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToggleAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("Unknown action '{value}'"))
    }
}

/// The five social toggles sharing one cache, actor and data API.
pub struct SocialActions<D> {
    cache: Arc<dyn CacheStore>,
    auth: Arc<dyn AuthContext>,
    api: Arc<D>,
    listener: Option<PhaseListener>,
}

impl<D: DataApi> SocialActions<D> {
    pub fn new(cache: Arc<dyn CacheStore>, auth: Arc<dyn AuthContext>, api: Arc<D>) -> Self {
        Self {
            cache,
            auth,
            api,
            listener: None,
        }
    }

    #[must_use]
    pub fn with_listener(mut self, listener: PhaseListener) -> Self {
        self.listener = Some(listener);
        self
    }

    fn build<T, F>(&self, action: ToggleAction, field: F) -> OptimisticToggle<T, EdgeToggleExecutor<D>, F>
    where
        T: crate::models::Entity,
        F: ToggleField<T>,
    {
        let toggle = OptimisticToggle::new(
            action.as_str(),
            Arc::clone(&self.cache),
            Arc::clone(&self.auth),
            EdgeToggleExecutor::new(Arc::clone(&self.api), action.relation()),
            field,
            action.patch_pattern(),
        )
        .invalidating(action.invalidate_patterns());
        match &self.listener {
            Some(listener) => toggle.with_listener(Arc::clone(listener)),
            None => toggle,
        }
    }

    pub async fn toggle_like(&self, post_id: &str) -> MutationResult<ToggleOutcome> {
        self.build::<Post, _>(ToggleAction::Like, Liked).run(post_id).await
    }

    pub async fn toggle_save(&self, post_id: &str) -> MutationResult<ToggleOutcome> {
        self.build::<Post, _>(ToggleAction::Save, Saved).run(post_id).await
    }

    pub async fn toggle_share(&self, post_id: &str) -> MutationResult<ToggleOutcome> {
        self.build::<Post, _>(ToggleAction::Share, Shared).run(post_id).await
    }

    pub async fn toggle_follow(&self, user_id: &str) -> MutationResult<ToggleOutcome> {
        self.build::<Profile, _>(ToggleAction::Follow, Following).run(user_id).await
    }

    pub async fn toggle_block(&self, user_id: &str) -> MutationResult<ToggleOutcome> {
        self.build::<Profile, _>(ToggleAction::Block, Blocked).run(user_id).await
    }

    pub async fn run(&self, action: ToggleAction, target_id: &str) -> MutationResult<ToggleOutcome> {
        match action {
            ToggleAction::Like => self.toggle_like(target_id).await,
            ToggleAction::Save => self.toggle_save(target_id).await,
            ToggleAction::Share => self.toggle_share(target_id).await,
            ToggleAction::Follow => self.toggle_follow(target_id).await,
            ToggleAction::Block => self.toggle_block(target_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::StaticAuthContext;
    use crate::backend::MemoryDataApi;
    use crate::cache::{CacheStoreExt, MemoryQueryCache, PagedData};

    fn actions(
        cache: &Arc<MemoryQueryCache>,
        api: &Arc<MemoryDataApi>,
    ) -> SocialActions<MemoryDataApi> {
        SocialActions::new(
            Arc::clone(cache) as Arc<dyn CacheStore>,
            Arc::new(StaticAuthContext::signed_in("viewer")),
            Arc::clone(api),
        )
    }

    #[test]
    fn action_names_round_trip() {
        for action in ToggleAction::ALL {
            assert_eq!(action.as_str().parse::<ToggleAction>(), Ok(action));
        }
        assert!("poke".parse::<ToggleAction>().is_err());
    }

    #[tokio::test]
    async fn follow_updates_profile_and_marks_feed_stale() {
        let cache = Arc::new(MemoryQueryCache::default());
        let api = Arc::new(MemoryDataApi::new());
        let mut profile = Profile::new("author", "ada");
        profile.follower_count = 2;
        cache.set_data(keys::profile_detail("author"), PagedData::single(profile));
        cache.set_data(keys::home_feed("viewer"), PagedData::<Post>::default());

        let outcome = actions(&cache, &api).toggle_follow("author").await.unwrap();
        assert!(outcome.new_state);
        assert!(api.has_edge(&EdgeRelation::FOLLOWS, "viewer", "author"));

        let cached = cache
            .get_data::<Profile>(&keys::profile_detail("author"))
            .unwrap();
        let profile = cached.find("author").unwrap();
        assert!(profile.is_following);
        assert_eq!(profile.follower_count, 3);
        assert!(cache.is_stale(&keys::home_feed("viewer")));
    }

    #[tokio::test]
    async fn block_flips_flag_without_counter() {
        let cache = Arc::new(MemoryQueryCache::default());
        let api = Arc::new(MemoryDataApi::new());
        let mut profile = Profile::new("troll", "troll");
        profile.follower_count = 7;
        cache.set_data(keys::profile_detail("troll"), PagedData::single(profile));

        actions(&cache, &api)
            .run(ToggleAction::Block, "troll")
            .await
            .unwrap();

        let cached = cache
            .get_data::<Profile>(&keys::profile_detail("troll"))
            .unwrap();
        let profile = cached.find("troll").unwrap();
        assert!(profile.is_blocked);
        assert_eq!(profile.follower_count, 7);
        assert!(api.has_edge(&EdgeRelation::BLOCKS, "viewer", "troll"));
    }

    #[tokio::test]
    async fn unsave_decrements_save_count() {
        let cache = Arc::new(MemoryQueryCache::default());
        let api = Arc::new(MemoryDataApi::new());
        api.seed_edge(&EdgeRelation::SAVES, "viewer", "p1");
        let mut post = Post::new("p1", "author", "hello");
        post.is_saved = true;
        post.save_count = 1;
        cache.set_data(keys::saved_posts("viewer"), PagedData::single(post));

        let outcome = actions(&cache, &api).toggle_save("p1").await.unwrap();
        assert!(!outcome.new_state);
        let cached = cache
            .get_data::<Post>(&keys::saved_posts("viewer"))
            .unwrap();
        assert_eq!(cached.find("p1").map(|post| post.save_count), Some(0));
    }
}
