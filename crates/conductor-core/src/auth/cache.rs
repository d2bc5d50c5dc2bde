//! Short-lived credential cache keyed by profile id.
//!
//! Successful resolutions live for five minutes, failures for ten seconds.
//! Expiry is checked lazily on read; there is no background sweeper.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::ProviderCredentials;

/// TTL for successfully resolved credentials
pub const SUCCESS_TTL_MS: i64 = 300_000;
/// TTL for cached resolution failures
pub const ERROR_TTL_MS: i64 = 10_000;

/// Why a credential resolution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialErrorKind {
    /// No credential material found anywhere
    Missing,
    /// Credential present but rejected by validation
    Invalid,
    /// Credential expired and refresh did not help
    Expired,
}

/// One cache entry
#[derive(Debug, Clone)]
pub struct CachedCredential {
    pub credentials: Option<ProviderCredentials>,
    /// Epoch milliseconds
    pub cached_at: i64,
    pub is_error: bool,
    pub error: Option<CredentialErrorKind>,
}

#[derive(Debug)]
pub struct CredentialCache {
    entries: DashMap<String, CachedCredential>,
    success_ttl_ms: i64,
    error_ttl_ms: i64,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_ttls(SUCCESS_TTL_MS, ERROR_TTL_MS)
    }

    pub fn with_ttls(success_ttl_ms: i64, error_ttl_ms: i64) -> Self {
        Self {
            entries: DashMap::new(),
            success_ttl_ms,
            error_ttl_ms,
        }
    }

    pub fn cache(&self, profile_id: &str, credentials: ProviderCredentials) {
        self.cache_at(profile_id, credentials, Utc::now().timestamp_millis());
    }

    pub fn cache_at(&self, profile_id: &str, credentials: ProviderCredentials, now_ms: i64) {
        self.entries.insert(
            profile_id.to_string(),
            CachedCredential {
                credentials: Some(credentials),
                cached_at: now_ms,
                is_error: false,
                error: None,
            },
        );
    }

    pub fn cache_error(&self, profile_id: &str, kind: CredentialErrorKind) {
        self.cache_error_at(profile_id, kind, Utc::now().timestamp_millis());
    }

    pub fn cache_error_at(&self, profile_id: &str, kind: CredentialErrorKind, now_ms: i64) {
        self.entries.insert(
            profile_id.to_string(),
            CachedCredential {
                credentials: None,
                cached_at: now_ms,
                is_error: true,
                error: Some(kind),
            },
        );
    }

    pub fn get(&self, profile_id: &str) -> Option<CachedCredential> {
        self.get_at(profile_id, Utc::now().timestamp_millis())
    }

    /// Look up an entry, evicting it if it has outlived its TTL at `now_ms`.
    pub fn get_at(&self, profile_id: &str, now_ms: i64) -> Option<CachedCredential> {
        let expired = match self.entries.get(profile_id) {
            Some(entry) if !self.is_expired(&entry, now_ms) => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(profile_id);
            debug!(profile_id, "Evicted expired credential cache entry");
        }
        None
    }

    pub fn invalidate(&self, profile_id: &str) {
        if self.entries.remove(profile_id).is_some() {
            debug!(profile_id, "Credential cache entry invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
        debug!("Credential cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CachedCredential, now_ms: i64) -> bool {
        let ttl = if entry.is_error {
            self.error_ttl_ms
        } else {
            self.success_ttl_ms
        };
        now_ms - entry.cached_at >= ttl
    }
}
