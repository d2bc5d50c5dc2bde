//! Secret vault addressing and implementations.
//!
//! The real vault is the OS credential store. Adapters address it through
//! [`vault_service_name`] so that every profile gets its own entry.

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::types::{ProviderCredentials, ProviderKind};
use crate::error::Result;
#[cfg(feature = "keychain")]
use crate::error::ConductorError;

/// Default namespace prefix for vault service names.
pub const DEFAULT_VAULT_NAMESPACE: &str = "Conductor";

/// Service name for one profile: `<namespace>-<kind>-credentials-<hash8>`.
pub fn vault_service_name(namespace: &str, kind: ProviderKind, profile_id: &str) -> String {
    let digest = Sha256::digest(profile_id.as_bytes());
    let hash = hex::encode(digest);
    format!("{}-{}-credentials-{}", namespace, kind, &hash[..8])
}

/// Capability interface over the OS secret store.
pub trait SecretVault: Send + Sync {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>>;

    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()>;

    fn delete_secret(&self, service: &str, account: &str) -> Result<()>;
}

/// Process-local vault, used for tests and sessions without an OS keychain.
#[derive(Debug, Default)]
pub struct MemoryVault {
    entries: RwLock<HashMap<(String, String), String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SecretVault for MemoryVault {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert((service.to_string(), account.to_string()), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<()> {
        self.entries
            .write()
            .remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}

/// OS keychain vault backed by the keyring crate
#[cfg(feature = "keychain")]
#[derive(Debug, Default)]
pub struct KeychainVault;

#[cfg(feature = "keychain")]
impl SecretVault for KeychainVault {
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(service, account)
            .map_err(|e| ConductorError::Vault(e.to_string()))?;
        match entry.get_password() {
            Ok(password) if !password.is_empty() => Ok(Some(password)),
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ConductorError::Vault(e.to_string())),
        }
    }

    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()> {
        keyring::Entry::new(service, account)
            .and_then(|entry| entry.set_password(value))
            .map_err(|e| ConductorError::Vault(e.to_string()))
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<()> {
        let entry = keyring::Entry::new(service, account)
            .map_err(|e| ConductorError::Vault(e.to_string()))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ConductorError::Vault(e.to_string())),
        }
    }
}

/// A vault plus the namespace used to address it.
///
/// Credentials are stored as a JSON blob, account name = provider kind.
#[derive(Clone)]
pub struct VaultHandle {
    vault: Arc<dyn SecretVault>,
    namespace: String,
}

impl VaultHandle {
    pub fn new(vault: Arc<dyn SecretVault>, namespace: impl Into<String>) -> Self {
        Self {
            vault,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn service_name(&self, kind: ProviderKind, profile_id: &str) -> String {
        vault_service_name(&self.namespace, kind, profile_id)
    }

    pub fn store(
        &self,
        kind: ProviderKind,
        profile_id: &str,
        credentials: &ProviderCredentials,
    ) -> Result<()> {
        let payload = serde_json::to_string(credentials)?;
        self.vault
            .set_secret(&self.service_name(kind, profile_id), kind.as_str(), &payload)
    }

    /// Load credentials; unreadable or malformed entries count as absent.
    pub fn load(&self, kind: ProviderKind, profile_id: &str) -> Option<ProviderCredentials> {
        let service = self.service_name(kind, profile_id);
        let payload = match self.vault.get_secret(&service, kind.as_str()) {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(error) => {
                warn!(%error, %service, "Failed to read vault entry");
                return None;
            }
        };
        match serde_json::from_str::<ProviderCredentials>(&payload) {
            Ok(credentials) if credentials.provider == kind => Some(credentials),
            Ok(_) => {
                warn!(%service, "Vault entry belongs to a different provider");
                None
            }
            Err(error) => {
                warn!(%error, %service, "Failed to parse vault entry");
                None
            }
        }
    }

    pub fn delete(&self, kind: ProviderKind, profile_id: &str) -> Result<()> {
        self.vault
            .delete_secret(&self.service_name(kind, profile_id), kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_is_deterministic() {
        let a = vault_service_name("Conductor", ProviderKind::Claude, "claude-work-abc123");
        let b = vault_service_name("Conductor", ProviderKind::Claude, "claude-work-abc123");
        assert_eq!(a, b);
        assert!(a.starts_with("Conductor-claude-credentials-"));
        assert_eq!(a.len(), "Conductor-claude-credentials-".len() + 8);
    }

    #[test]
    fn test_service_name_differs_per_profile() {
        let a = vault_service_name("Conductor", ProviderKind::Gemini, "one");
        let b = vault_service_name("Conductor", ProviderKind::Gemini, "two");
        assert_ne!(a, b);
    }

    #[test]
    fn test_handle_store_load_delete() {
        let vault = Arc::new(MemoryVault::new());
        let handle = VaultHandle::new(vault.clone(), DEFAULT_VAULT_NAMESPACE);
        let creds = ProviderCredentials::api_key(ProviderKind::Gemini, "gem-key");

        handle.store(ProviderKind::Gemini, "p1", &creds).unwrap();
        assert_eq!(vault.len(), 1);
        assert_eq!(handle.load(ProviderKind::Gemini, "p1"), Some(creds));
        assert_eq!(handle.load(ProviderKind::Gemini, "p2"), None);

        handle.delete(ProviderKind::Gemini, "p1").unwrap();
        assert!(vault.is_empty());
    }

    #[test]
    fn test_handle_load_ignores_garbage() {
        let vault = Arc::new(MemoryVault::new());
        let handle = VaultHandle::new(vault.clone(), "Test");
        let service = handle.service_name(ProviderKind::OpenAI, "p1");
        vault.set_secret(&service, "openai", "not json").unwrap();

        assert_eq!(handle.load(ProviderKind::OpenAI, "p1"), None);
    }
}
