use std::sync::Arc;

use chrono::Utc;
use murmur_core::feed::{FeedLoader, FeedScope};
use murmur_core::Post;

use crate::commands::common::{
    format_post_lines, normalize_identifier, post_to_list_item, PostListItem, ProfileConnection,
};
use crate::error::CliError;

pub fn resolve_scope(user: Option<&str>, saved: bool) -> Result<FeedScope, CliError> {
    match (user, saved) {
        (Some(user), _) => Ok(FeedScope::User(normalize_identifier(user)?)),
        (None, true) => Ok(FeedScope::Saved),
        (None, false) => Ok(FeedScope::Home),
    }
}

pub async fn run_feed(
    limit: usize,
    user: Option<&str>,
    saved: bool,
    as_json: bool,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let scope = resolve_scope(user, saved)?;
    let connection = ProfileConnection::open(global_profile).await?;
    if scope == FeedScope::Saved {
        connection.require_signed_in()?;
    }

    let loader = FeedLoader::new(Arc::clone(&connection.api), connection.auth_context())
        .with_page_size(limit);
    let data = loader.fetch(&connection.client, &scope).await?;
    let posts = data.items().take(limit).cloned().collect::<Vec<Post>>();

    if as_json {
        let items = posts.iter().map(post_to_list_item).collect::<Vec<PostListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if posts.is_empty() {
        println!("No posts yet.");
    } else {
        for line in format_post_lines(&posts, Utc::now().timestamp_millis()) {
            println!("{line}");
        }
    }

    Ok(())
}
