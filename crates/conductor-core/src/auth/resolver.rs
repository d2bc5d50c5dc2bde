//! Credential resolver - adapter lookups with the credential cache in front.

use tracing::{debug, warn};

use super::adapters::ProviderAdapter;
use super::cache::{CredentialCache, CredentialErrorKind};
use super::types::ProviderCredentials;
use crate::profiles::Profile;

/// Outcome of resolving credentials for one profile
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialResolution {
    Resolved(ProviderCredentials),
    Failed(CredentialErrorKind),
}

impl CredentialResolution {
    pub fn credentials(&self) -> Option<&ProviderCredentials> {
        match self {
            CredentialResolution::Resolved(credentials) => Some(credentials),
            CredentialResolution::Failed(_) => None,
        }
    }

    pub fn into_credentials(self) -> Option<ProviderCredentials> {
        match self {
            CredentialResolution::Resolved(credentials) => Some(credentials),
            CredentialResolution::Failed(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, CredentialResolution::Resolved(_))
    }
}

/// Resolve credentials for `profile`.
///
/// Cache hit (success or error) short-circuits. On a miss the adapter reads
/// native credentials, validates them, and refreshes once if validation
/// fails. The outcome is cached either way.
pub async fn resolve_credentials(
    adapter: &dyn ProviderAdapter,
    cache: &CredentialCache,
    profile: &Profile,
) -> CredentialResolution {
    if let Some(entry) = cache.get(&profile.id) {
        return match (entry.credentials, entry.error) {
            (Some(credentials), _) if !entry.is_error => {
                debug!(profile_id = %profile.id, "Credential cache hit");
                CredentialResolution::Resolved(credentials)
            }
            (_, error) => {
                debug!(profile_id = %profile.id, "Cached credential failure");
                CredentialResolution::Failed(error.unwrap_or(CredentialErrorKind::Invalid))
            }
        };
    }

    let Some(credentials) = adapter.read_native_credentials(profile).await else {
        warn!(provider = %adapter.kind(), profile_id = %profile.id, "No credentials found");
        cache.cache_error(&profile.id, CredentialErrorKind::Missing);
        return CredentialResolution::Failed(CredentialErrorKind::Missing);
    };

    if adapter.validate_token(&credentials) {
        cache.cache(&profile.id, credentials.clone());
        return CredentialResolution::Resolved(credentials);
    }

    let expired = credentials.primary_secret().is_some();
    let refreshed = adapter.refresh_token(credentials).await;
    if adapter.validate_token(&refreshed) {
        cache.cache(&profile.id, refreshed.clone());
        return CredentialResolution::Resolved(refreshed);
    }

    let kind = if expired {
        CredentialErrorKind::Expired
    } else {
        CredentialErrorKind::Invalid
    };
    warn!(provider = %adapter.kind(), profile_id = %profile.id, reason = ?kind, "Credential validation failed");
    cache.cache_error(&profile.id, kind);
    CredentialResolution::Failed(kind)
}
