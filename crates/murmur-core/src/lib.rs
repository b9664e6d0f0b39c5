//! murmur-core - Core library for murmur
//!
//! Client-side core of a Supabase-backed social network: models, the shared
//! query cache, optimistic like/save/share/follow/block toggles, feed
//! loading, realtime chat state and notification counts. Front ends (the
//! CLI today) wire these to a live project through [`config::ClientConfig`].

pub mod auth;
pub mod backend;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod mutation;
pub mod notifications;
pub mod realtime;
pub mod toggles;
pub mod util;

pub use error::{Error, Result};
pub use models::{Message, Notification, Post, Profile};
pub use toggles::{SocialActions, ToggleAction};
