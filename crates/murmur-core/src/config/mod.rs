//! Client configuration.
//!
//! Provides a unified `ClientConfig` used by every murmur front end to find
//! the Supabase project and to tune cache freshness and chat timers.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_STALE_TIME_SECS: u64 = 30;
const DEFAULT_TYPING_QUIET_PERIOD_MS: u64 = 3_000;
const DEFAULT_REMOTE_TYPING_EXPIRY_MS: u64 = 5_000;
const DEFAULT_OFFLINE_AFTER_SECS: u64 = 60;

pub const SUPABASE_URL_ENV: &str = "MURMUR_SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "MURMUR_SUPABASE_ANON_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Config field '{0}' is required")]
    Missing(&'static str),
    #[error("Config field '{0}' must include http:// or https://")]
    InvalidUrl(&'static str),
    #[error("Config field '{0}' must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Safe-to-ship client settings. Secret credentials never belong here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub typing: TypingConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// How long a fetched query is served without refetching
    #[serde(default = "default_stale_time_secs")]
    pub stale_time_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TypingConfig {
    /// Local typing flips back to idle after this long without keystrokes
    #[serde(default = "default_typing_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// A remote participant's typing flag expires after this long
    #[serde(default = "default_remote_typing_expiry_ms")]
    pub remote_expiry_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// Backgrounded clients go from away to offline after this long
    #[serde(default = "default_offline_after_secs")]
    pub offline_after_secs: u64,
}

const fn default_stale_time_secs() -> u64 {
    DEFAULT_STALE_TIME_SECS
}

const fn default_typing_quiet_period_ms() -> u64 {
    DEFAULT_TYPING_QUIET_PERIOD_MS
}

const fn default_remote_typing_expiry_ms() -> u64 {
    DEFAULT_REMOTE_TYPING_EXPIRY_MS
}

const fn default_offline_after_secs() -> u64 {
    DEFAULT_OFFLINE_AFTER_SECS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: DEFAULT_STALE_TIME_SECS,
        }
    }
}

impl CacheConfig {
    pub const fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: DEFAULT_TYPING_QUIET_PERIOD_MS,
            remote_expiry_ms: DEFAULT_REMOTE_TYPING_EXPIRY_MS,
        }
    }
}

impl TypingConfig {
    pub const fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub const fn remote_expiry(&self) -> Duration {
        Duration::from_millis(self.remote_expiry_ms)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            offline_after_secs: DEFAULT_OFFLINE_AFTER_SECS,
        }
    }
}

impl PresenceConfig {
    pub const fn offline_after(&self) -> Duration {
        Duration::from_secs(self.offline_after_secs)
    }
}

impl ClientConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut config = serde_json::from_str::<Self>(raw)?;
        config.normalize();
        Ok(config)
    }

    /// Let `MURMUR_SUPABASE_URL` / `MURMUR_SUPABASE_ANON_KEY` override
    /// whatever the file said.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(SUPABASE_URL_ENV).ok(),
            std::env::var(SUPABASE_ANON_KEY_ENV).ok(),
        )
    }

    #[must_use]
    pub fn with_overrides(mut self, url: Option<String>, anon_key: Option<String>) -> Self {
        if let Some(url) = normalize_text_option(url) {
            self.supabase_url = Some(url);
        }
        if let Some(anon_key) = normalize_text_option(anon_key) {
            self.supabase_anon_key = Some(anon_key);
        }
        self.normalize();
        self
    }

    /// Supabase URL and anon key, both required and validated
    pub fn supabase(&self) -> Result<(String, String), ConfigError> {
        let url = self
            .supabase_url
            .clone()
            .ok_or(ConfigError::Missing("supabase_url"))?;
        if !is_http_url(&url) {
            return Err(ConfigError::InvalidUrl("supabase_url"));
        }
        let anon_key = self
            .supabase_anon_key
            .clone()
            .ok_or(ConfigError::Missing("supabase_anon_key"))?;
        Ok((url, anon_key))
    }

    /// Reject timer settings that would fire immediately
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.typing.quiet_period_ms == 0 {
            return Err(ConfigError::ZeroDuration("typing.quiet_period_ms"));
        }
        if self.typing.remote_expiry_ms == 0 {
            return Err(ConfigError::ZeroDuration("typing.remote_expiry_ms"));
        }
        if self.presence.offline_after_secs == 0 {
            return Err(ConfigError::ZeroDuration("presence.offline_after_secs"));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.supabase_url = normalize_text_option(self.supabase_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.take());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = ClientConfig::parse("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.cache.stale_time(), Duration::from_secs(30));
        assert_eq!(config.typing.quiet_period(), Duration::from_secs(3));
        assert_eq!(config.typing.remote_expiry(), Duration::from_secs(5));
        assert_eq!(config.presence.offline_after(), Duration::from_secs(60));
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error = ClientConfig::parse(r#"{ "cache": { "ttl": 5 } }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn parse_normalizes_url() {
        let config = ClientConfig::parse(
            r#"{ "supabase_url": " https://demo.supabase.co/ ", "supabase_anon_key": " anon " }"#,
        )
        .unwrap();
        assert_eq!(
            config.supabase().unwrap(),
            ("https://demo.supabase.co".to_string(), "anon".to_string())
        );
    }

    #[test]
    fn supabase_requires_both_fields() {
        let config = ClientConfig::default();
        assert!(matches!(
            config.supabase(),
            Err(ConfigError::Missing("supabase_url"))
        ));

        let config = config.with_overrides(Some("demo.supabase.co".to_string()), None);
        assert!(matches!(
            config.supabase(),
            Err(ConfigError::InvalidUrl("supabase_url"))
        ));
    }

    #[test]
    fn overrides_ignore_blank_values() {
        let config = ClientConfig::default()
            .with_overrides(Some("https://a.supabase.co".to_string()), Some("key".to_string()))
            .with_overrides(Some("  ".to_string()), None);
        assert_eq!(config.supabase_url.as_deref(), Some("https://a.supabase.co"));
        assert_eq!(config.supabase_anon_key.as_deref(), Some("key"));
    }

    #[test]
    fn validate_rejects_zero_timers() {
        let mut config = ClientConfig::default();
        assert!(config.validate().is_ok());
        config.typing.quiet_period_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("typing.quiet_period_ms"))
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.json");
        std::fs::write(&path, r#"{ "typing": { "quiet_period_ms": 1500 } }"#).unwrap();
        let config = ClientConfig::load_from_path(&path).unwrap();
        assert_eq!(config.typing.quiet_period_ms, 1500);
        assert_eq!(config.typing.remote_expiry_ms, 5_000);
    }
}
