//! Authentication
//!
//! Credentials per provider kind, the secret vault they live in, adapters
//! that know each CLI's auth flow, and the short-lived credential cache.

pub mod adapters;
pub mod cache;
pub mod refresh;
pub mod resolver;
pub mod types;
pub mod vault;

pub use adapters::{
    ApiKeyAdapter, ApiKeySpec, ClaudeAdapter, EnvSnapshot, ProviderAdapter, default_adapters,
    process_env,
};
pub use cache::{CachedCredential, CredentialCache, CredentialErrorKind};
pub use refresh::{AnthropicRefresher, OAuthRefresher, RefreshedToken};
pub use resolver::{CredentialResolution, resolve_credentials};
pub use types::{ProviderCapabilities, ProviderCredentials, ProviderKind, UsageSnapshot};
pub use vault::{MemoryVault, SecretVault, VaultHandle, vault_service_name};

#[cfg(feature = "keychain")]
pub use vault::KeychainVault;
