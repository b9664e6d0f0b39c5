use std::sync::Arc;

use murmur_core::auth::{AuthContext, SessionAuthContext};
use murmur_core::backend::PostgrestDataApi;
use murmur_core::cache::{CacheStore, MemoryQueryCache, QueryClient};
use murmur_core::Post;
use serde::Serialize;

use crate::auth::auth_client_for_profile;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Everything a data command needs for one profile
pub struct ProfileConnection {
    pub profile_name: String,
    pub auth: SessionAuthContext,
    pub api: Arc<PostgrestDataApi>,
    pub client: QueryClient,
}

impl ProfileConnection {
    /// Load the profile, restore (and refresh if needed) its session, and
    /// point a fresh query cache at its project.
    pub async fn open(global_profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(global_profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        Self::open_profile(profile_name, &profile).await
    }

    async fn open_profile(profile_name: String, profile: &CliProfile) -> Result<Self, CliError> {
        let client_config = profile.client_config();
        let (url, anon_key) = client_config
            .supabase()
            .map_err(|error| missing_project_error(&profile_name, &error.to_string()))?;
        client_config
            .validate()
            .map_err(|error| CliError::Config(error.to_string()))?;

        let session = match auth_client_for_profile(&profile_name, profile)
            .map_err(|error| CliError::Auth(error.to_string()))?
        {
            Some(auth_client) => auth_client
                .restore_session()
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?,
            None => None,
        };
        let auth = SessionAuthContext::new(session);
        let api = PostgrestDataApi::new(&url, anon_key, Arc::new(auth.clone()))?;
        let cache = MemoryQueryCache::from_config(&client_config.cache);

        tracing::debug!(
            profile = %profile_name,
            signed_in = auth.current_actor().is_some(),
            "Opened profile connection"
        );
        Ok(Self {
            profile_name,
            auth,
            api: Arc::new(api),
            client: QueryClient::new(Arc::new(cache)),
        })
    }

    pub fn cache(&self) -> Arc<dyn CacheStore> {
        Arc::clone(self.client.cache())
    }

    pub fn auth_context(&self) -> Arc<dyn AuthContext> {
        Arc::new(self.auth.clone())
    }

    pub fn require_signed_in(&self) -> Result<String, CliError> {
        self.auth
            .current_actor()
            .ok_or_else(|| CliError::NotSignedIn(self.profile_name.clone()))
    }
}

fn missing_project_error(profile_name: &str, detail: &str) -> CliError {
    CliError::Config(format!(
        "{detail}. Run `murmur config init --profile {profile_name} --supabase-url <URL> --supabase-anon-key <KEY>` first."
    ))
}

#[derive(Debug, Serialize)]
pub struct PostListItem {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: String,
    pub like_count: i64,
    pub save_count: i64,
    pub share_count: i64,
    pub comment_count: i64,
    pub is_liked: bool,
    pub is_saved: bool,
    pub is_shared: bool,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
}

pub fn post_to_list_item(post: &Post) -> PostListItem {
    PostListItem {
        id: post.id.clone(),
        author_id: post.author_id.clone(),
        content: post.content.clone(),
        created_at: post.created_at.to_rfc3339(),
        like_count: post.like_count,
        save_count: post.save_count,
        share_count: post.share_count,
        comment_count: post.comment_count,
        is_liked: post.is_liked,
        is_saved: post.is_saved,
        is_shared: post.is_shared,
        hashtags: post.hashtags(),
        mentions: post.mentions(),
    }
}

pub fn format_post_lines(posts: &[Post], now_ms: i64) -> Vec<String> {
    posts
        .iter()
        .map(|post| {
            format!(
                "{}  {:<10}  {}  {}  {}",
                short_id(&post.id),
                format_relative_time(post.created_at.timestamp_millis(), now_ms),
                format_counters(post),
                post.author_id,
                post_preview(post, 60)
            )
        })
        .collect()
}

/// `♥3* ⚑1 ↻0`, starred where the viewer's flag is set
pub fn format_counters(post: &Post) -> String {
    let mark = |on: bool| if on { "*" } else { "" };
    format!(
        "♥{}{} ⚑{}{} ↻{}{}",
        post.like_count,
        mark(post.is_liked),
        post.save_count,
        mark(post.is_saved),
        post.share_count,
        mark(post.is_shared),
    )
}

pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

pub fn post_preview(post: &Post, max_chars: usize) -> String {
    let first_line = post.content.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let id = id.trim();
    if id.is_empty() {
        Err(CliError::EmptyId)
    } else {
        Ok(id.to_string())
    }
}
