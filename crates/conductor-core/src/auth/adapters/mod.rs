//! Provider adapters
//!
//! One adapter per provider kind. An adapter knows where a CLI keeps its
//! credentials, how to validate and refresh them, and which environment
//! variables the CLI process needs.

mod api_key;
mod claude;

pub use api_key::{ApiKeyAdapter, ApiKeySpec};
pub use claude::ClaudeAdapter;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use super::types::{ProviderCredentials, ProviderKind, UsageSnapshot};
use super::vault::VaultHandle;
use crate::profiles::Profile;

/// Snapshot of the process environment an adapter reads secrets from.
pub type EnvSnapshot = HashMap<String, String>;

/// Capture the current process environment.
pub fn process_env() -> EnvSnapshot {
    std::env::vars().collect()
}

/// Authentication and environment capability for one provider kind.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Native credential files the CLI manages itself. Informational only.
    fn native_credential_paths(&self, profile: &Profile) -> Vec<PathBuf>;

    /// Read secrets from the environment, native files or the vault.
    /// Never fails; any problem yields `None`.
    async fn read_native_credentials(&self, profile: &Profile) -> Option<ProviderCredentials>;

    /// Command the user runs in a terminal to log in
    fn auth_command_line(&self) -> String;

    /// Output patterns (regex) that mark a successful login
    fn auth_success_patterns(&self) -> &'static [&'static str];

    /// Output patterns (regex) that mark a failed login
    fn auth_failure_patterns(&self) -> &'static [&'static str];

    /// Returns possibly updated credentials. On failure returns the input
    /// unchanged so callers can fall back to validation.
    async fn refresh_token(&self, credentials: ProviderCredentials) -> ProviderCredentials;

    fn validate_token(&self, credentials: &ProviderCredentials) -> bool {
        token_is_valid_at(credentials, Utc::now().timestamp_millis())
    }

    /// Best-effort revocation; no-op when the provider has no endpoint.
    async fn revoke_token(&self, _credentials: &ProviderCredentials) {}

    /// Environment variables for the CLI process. Pure function of the input.
    fn environment_for_cli(&self, credentials: &ProviderCredentials) -> BTreeMap<String, String>;

    async fn fetch_usage(&self, _credentials: &ProviderCredentials) -> Option<UsageSnapshot> {
        None
    }
}

/// A credential is valid when it carries a secret and is not inside the
/// expiry buffer at `now_ms`.
pub fn token_is_valid_at(credentials: &ProviderCredentials, now_ms: i64) -> bool {
    credentials.primary_secret().is_some() && !credentials.is_expired_at(now_ms)
}

/// Build one adapter per known provider kind.
pub fn default_adapters(
    env: &EnvSnapshot,
    vault: Option<VaultHandle>,
) -> Vec<Arc<dyn ProviderAdapter>> {
    vec![
        Arc::new(ClaudeAdapter::new(env.clone(), vault.clone())),
        Arc::new(ApiKeyAdapter::gemini(env.clone(), vault.clone())),
        Arc::new(ApiKeyAdapter::openai(env.clone(), vault.clone())),
        Arc::new(ApiKeyAdapter::opencode(env.clone(), vault)),
    ]
}

/// First non-empty value among `vars` in the snapshot.
pub(crate) fn first_env(env: &EnvSnapshot, vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| env.get(*var))
        .find(|value| !value.trim().is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_default_adapters_cover_every_kind() {
        let adapters = default_adapters(&EnvSnapshot::new(), None);
        let kinds: Vec<ProviderKind> = adapters.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, ProviderKind::ALL.to_vec());
    }

    #[test]
    fn test_auth_patterns_are_valid_regex() {
        for adapter in default_adapters(&EnvSnapshot::new(), None) {
            for pattern in adapter
                .auth_success_patterns()
                .iter()
                .chain(adapter.auth_failure_patterns())
            {
                assert!(
                    Regex::new(pattern).is_ok(),
                    "invalid pattern for {}: {}",
                    adapter.kind(),
                    pattern
                );
            }
            assert!(!adapter.auth_command_line().is_empty());
        }
    }

    #[test]
    fn test_token_is_valid_at() {
        let now = 1_700_000_000_000;
        let empty = ProviderCredentials::new(ProviderKind::Claude);
        assert!(!token_is_valid_at(&empty, now));

        let fresh = ProviderCredentials::oauth(
            ProviderKind::Claude,
            "token",
            None,
            Some(now + 60 * 60 * 1000),
        );
        assert!(token_is_valid_at(&fresh, now));

        let inside_buffer = ProviderCredentials::oauth(
            ProviderKind::Claude,
            "token",
            None,
            Some(now + 4 * 60 * 1000),
        );
        assert!(!token_is_valid_at(&inside_buffer, now));
    }

    #[test]
    fn test_first_env_skips_blank_values() {
        let mut env = EnvSnapshot::new();
        env.insert("A".to_string(), "  ".to_string());
        env.insert("B".to_string(), "value".to_string());

        assert_eq!(first_env(&env, &["A", "B"]), Some("value".to_string()));
        assert_eq!(first_env(&env, &["C"]), None);
    }
}
