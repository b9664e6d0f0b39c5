//! Profile sessions kept in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use murmur_core::auth::{
    resolve_optional_supabase_config, AuthResult, SessionPersistence, SupabaseAuthClient,
};
pub use murmur_core::auth::{AuthError, AuthSession};

use crate::config_profiles::CliProfile;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "murmur-cli";

#[derive(Clone)]
pub struct SessionStore {
    username: String,
}

impl SessionStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            username: format!("supabase_session:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl SessionPersistence for SessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard
            .get(&self.username)
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(AuthError::from)
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?
            .insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> AuthResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> AuthResult<()> {
        Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?
            .remove(&self.username);
        Ok(())
    }
}

/// Auth client bound to one profile's project and keychain slot
pub type ProfileAuthClient = SupabaseAuthClient<SessionStore>;

/// `None` when the profile has no Supabase project configured
pub fn auth_client_for_profile(
    profile_name: &str,
    profile: &CliProfile,
) -> AuthResult<Option<ProfileAuthClient>> {
    let config = profile.client_config();
    let Some((url, anon_key)) =
        resolve_optional_supabase_config(config.supabase_url, config.supabase_anon_key)?
    else {
        return Ok(None);
    };
    SupabaseAuthClient::new(url, anon_key, SessionStore::new(profile_name)).map(Some)
}

pub fn load_stored_session(profile_name: &str) -> AuthResult<Option<AuthSession>> {
    SessionStore::new(profile_name).load_session()
}

pub fn clear_stored_session(profile_name: &str) -> AuthResult<()> {
    SessionStore::new(profile_name).clear_session()
}

#[cfg(test)]
mod tests {
    use murmur_core::auth::AuthUser;
    use pretty_assertions::assert_eq;

    use super::*;

    fn session(user_id: &str) -> AuthSession {
        AuthSession {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: 4_102_444_800,
            user: AuthUser {
                id: user_id.to_string(),
                email: Some(format!("{user_id}@example.com")),
            },
        }
    }

    #[test]
    fn sessions_are_scoped_per_profile() {
        let work = SessionStore::new("auth-test-work");
        let home = SessionStore::new("auth-test-home");
        work.save_session(&session("u-work")).unwrap();

        assert_eq!(
            load_stored_session("auth-test-work").unwrap(),
            Some(session("u-work"))
        );
        assert_eq!(home.load_session().unwrap(), None);

        clear_stored_session("auth-test-work").unwrap();
        assert_eq!(work.load_session().unwrap(), None);
    }

    #[test]
    fn clearing_missing_session_is_ok() {
        assert!(clear_stored_session("auth-test-never-saved").is_ok());
    }

    #[test]
    fn unconfigured_profile_has_no_client() {
        if std::env::var(murmur_core::config::SUPABASE_URL_ENV).is_ok()
            || std::env::var(murmur_core::config::SUPABASE_ANON_KEY_ENV).is_ok()
        {
            return;
        }
        let client = auth_client_for_profile("auth-test-empty", &CliProfile::default()).unwrap();
        assert!(client.is_none());
    }

    #[test]
    fn half_configured_profile_is_rejected() {
        if std::env::var(murmur_core::config::SUPABASE_ANON_KEY_ENV).is_ok() {
            return;
        }
        let profile = CliProfile {
            supabase_url: Some("https://demo.supabase.co".to_string()),
            supabase_anon_key: None,
        };
        assert!(matches!(
            auth_client_for_profile("auth-test-half", &profile),
            Err(AuthError::InvalidConfiguration(_))
        ));
    }
}
