//! Unified Profile Manager
//!
//! Sole owner and writer of the [`UnifiedStore`]. Every mutation runs under
//! one async lock: clone, apply, commit, persist. Two concurrent calls can
//! therefore never drop each other's changes, and a rejected mutation
//! leaves the store untouched.

use chrono::Utc;
use parking_lot::{Mutex as SyncMutex, RwLock};
use rand::RngExt;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::store::{LoadOutcome, SaveOutcome, load_store, save_store};
use super::types::{
    AutoSwitchPolicy, AutoSwitchUpdate, GlobalSettings, GlobalSettingsUpdate, NewProfile,
    Profile, ProfileUpdate, UnifiedStore, slugify,
};
use crate::auth::adapters::ProviderAdapter;
use crate::auth::cache::{CredentialCache, ERROR_TTL_MS, SUCCESS_TTL_MS};
use crate::auth::types::ProviderKind;
use crate::auth::vault::{DEFAULT_VAULT_NAMESPACE, VaultHandle, vault_service_name};
use crate::error::{ConductorError, Result};
use crate::paths;

const ID_SUFFIX_LEN: usize = 6;

/// Configuration for the profile manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Location of `unified-profiles.json`
    pub store_path: PathBuf,
    /// Prefix for vault service names
    #[serde(default = "default_namespace")]
    pub vault_namespace: String,
    #[serde(default = "default_success_ttl")]
    pub success_ttl_ms: i64,
    #[serde(default = "default_error_ttl")]
    pub error_ttl_ms: i64,
}

fn default_namespace() -> String {
    DEFAULT_VAULT_NAMESPACE.to_string()
}
fn default_success_ttl() -> i64 {
    SUCCESS_TTL_MS
}
fn default_error_ttl() -> i64 {
    ERROR_TTL_MS
}

impl ManagerConfig {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            vault_namespace: default_namespace(),
            success_ttl_ms: default_success_ttl(),
            error_ttl_ms: default_error_ttl(),
        }
    }

    /// Config rooted in the resolved conductor directory
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(paths::profiles_path()?))
    }

    /// Credential cache sized by this config's TTLs
    pub fn credential_cache(&self) -> CredentialCache {
        CredentialCache::with_ttls(self.success_ttl_ms, self.error_ttl_ms)
    }
}

/// Manages profiles for every provider kind
pub struct UnifiedProfileManager {
    config: ManagerConfig,
    store: Mutex<Option<UnifiedStore>>,
    adapters: RwLock<HashMap<ProviderKind, Arc<dyn ProviderAdapter>>>,
    cache: Arc<CredentialCache>,
    vault: Option<VaultHandle>,
    persist_warning: SyncMutex<Option<String>>,
}

impl UnifiedProfileManager {
    pub fn new(config: ManagerConfig, cache: Arc<CredentialCache>) -> Self {
        Self {
            config,
            store: Mutex::new(None),
            adapters: RwLock::new(HashMap::new()),
            cache,
            vault: None,
            persist_warning: SyncMutex::new(None),
        }
    }

    /// Attach the vault used to clean up secrets of deleted profiles
    pub fn with_vault(mut self, vault: VaultHandle) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    /// Load the store from disk. Must run before any other operation.
    pub async fn initialize(&self) -> Result<LoadOutcome> {
        let load = load_store(&self.config.store_path).await;
        if let LoadOutcome::Migrated {
            persisted: SaveOutcome::Degraded(message),
            ..
        } = &load.outcome
        {
            *self.persist_warning.lock() = Some(message.clone());
        }

        let mut guard = self.store.lock().await;
        *guard = Some(load.store);
        info!(
            path = %self.config.store_path.display(),
            outcome = ?load.outcome,
            "Profile manager initialized"
        );
        Ok(load.outcome)
    }

    pub async fn is_initialized(&self) -> bool {
        self.store.lock().await.is_some()
    }

    pub fn register_adapter(&self, adapter: Arc<dyn ProviderAdapter>) {
        let kind = adapter.kind();
        if self.adapters.write().insert(kind, adapter).is_some() {
            debug!(provider = %kind, "Replaced provider adapter");
        }
    }

    pub fn get_adapter(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.read().get(&kind).cloned()
    }

    pub fn adapters(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        let mut adapters: Vec<_> = self.adapters.read().values().cloned().collect();
        adapters.sort_by_key(|adapter| adapter.kind());
        adapters
    }

    /// Snapshot of the whole document
    pub async fn snapshot(&self) -> Result<UnifiedStore> {
        self.read(|store| store.clone()).await
    }

    pub async fn list_profiles(&self, kind: ProviderKind) -> Result<Vec<Profile>> {
        self.read(|store| {
            store
                .provider(kind)
                .map(|state| state.profiles.clone())
                .unwrap_or_default()
        })
        .await
    }

    pub async fn get_profile(&self, kind: ProviderKind, id: &str) -> Result<Option<Profile>> {
        self.read(|store| store.provider(kind).and_then(|s| s.find(id)).cloned())
            .await
    }

    /// Active profile, or the first one if the active id is unset or stale.
    pub async fn get_active_profile(&self, kind: ProviderKind) -> Result<Option<Profile>> {
        self.read(|store| store.provider(kind).and_then(|s| s.active_profile()).cloned())
            .await
    }

    pub async fn add_profile(&self, kind: ProviderKind, input: NewProfile) -> Result<Profile> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ConductorError::InvariantViolation(
                "Profile name must not be empty".to_string(),
            ));
        }

        let profile = self
            .mutate(|store| {
                let state = store.provider_mut(kind);
                let id = loop {
                    let candidate = generate_profile_id(kind, &name);
                    if state.find(&candidate).is_none() {
                        break candidate;
                    }
                };

                let first = state.profiles.is_empty();
                let mut profile = Profile::new(id, name, kind, Utc::now().timestamp_millis());
                profile.email = input.email;
                profile.config_dir = input.config_dir;
                profile.description = input.description;
                profile.metadata = input.metadata;
                profile.is_default = first;

                if first {
                    state.active_profile_id = Some(profile.id.clone());
                }
                state.profiles.push(profile.clone());
                Ok(profile)
            })
            .await?;

        info!(provider = %kind, profile_id = %profile.id, "Profile added");
        Ok(profile)
    }

    pub async fn update_profile(
        &self,
        kind: ProviderKind,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<Profile> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ConductorError::InvariantViolation(
                "Profile name must not be empty".to_string(),
            ));
        }

        let profile = self
            .mutate(|store| {
                let profile = store
                    .provider_mut(kind)
                    .find_mut(id)
                    .ok_or_else(|| not_found(kind, id))?;
                update.apply_to(profile);
                Ok(profile.clone())
            })
            .await?;

        debug!(provider = %kind, profile_id = id, "Profile updated");
        Ok(profile)
    }

    /// Delete a profile. The last profile of a kind cannot be deleted.
    pub async fn delete_profile(&self, kind: ProviderKind, id: &str) -> Result<()> {
        self.mutate(|store| {
            let state = store.provider_mut(kind);
            let index = state
                .profiles
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| not_found(kind, id))?;
            if state.profiles.len() == 1 {
                return Err(ConductorError::InvariantViolation(format!(
                    "Cannot delete the last {} profile",
                    kind
                )));
            }

            let removed = state.profiles.remove(index);
            if removed.is_default
                && let Some(first) = state.profiles.first_mut()
            {
                first.is_default = true;
            }
            if state.active_profile_id.as_deref() == Some(id) {
                state.active_profile_id = state.profiles.first().map(|p| p.id.clone());
            }
            if let Some(order) = state.account_priority_order.as_mut() {
                order.retain(|entry| entry != id);
            }
            Ok(())
        })
        .await?;

        self.cache.invalidate(id);
        if let Some(vault) = &self.vault
            && let Err(e) = vault.delete(kind, id)
        {
            warn!(provider = %kind, profile_id = id, error = %e, "Failed to delete profile secrets");
        }
        info!(provider = %kind, profile_id = id, "Profile deleted");
        Ok(())
    }

    pub async fn set_active_profile(&self, kind: ProviderKind, id: &str) -> Result<()> {
        let previous = self
            .mutate(|store| {
                let state = store.provider_mut(kind);
                if state.find(id).is_none() {
                    return Err(not_found(kind, id));
                }
                let previous = state.active_profile().map(|p| p.id.clone());
                state.active_profile_id = Some(id.to_string());
                Ok(previous)
            })
            .await?;

        if let Some(previous) = previous.as_deref() {
            self.cache.invalidate(previous);
        }
        self.cache.invalidate(id);
        info!(provider = %kind, profile_id = id, previous = ?previous, "Active profile changed");
        Ok(())
    }

    /// Record the outcome of a credential check on a profile.
    pub async fn mark_authenticated(
        &self,
        kind: ProviderKind,
        id: &str,
        authenticated: bool,
    ) -> Result<Profile> {
        self.mutate(|store| {
            let profile = store
                .provider_mut(kind)
                .find_mut(id)
                .ok_or_else(|| not_found(kind, id))?;
            profile.is_authenticated = authenticated;
            if authenticated {
                profile.last_used_at = Some(Utc::now().timestamp_millis());
            }
            Ok(profile.clone())
        })
        .await
    }

    pub async fn get_auto_switch_settings(&self, kind: ProviderKind) -> Result<AutoSwitchPolicy> {
        self.read(|store| {
            store
                .provider(kind)
                .map(|s| s.auto_switch_policy.clone())
                .unwrap_or_default()
        })
        .await
    }

    pub async fn update_auto_switch_settings(
        &self,
        kind: ProviderKind,
        update: AutoSwitchUpdate,
    ) -> Result<AutoSwitchPolicy> {
        self.mutate(|store| {
            let policy = &mut store.provider_mut(kind).auto_switch_policy;
            policy.apply(&update);
            Ok(policy.clone())
        })
        .await
    }

    pub async fn get_global_settings(&self) -> Result<GlobalSettings> {
        self.read(|store| store.global_settings.clone()).await
    }

    pub async fn update_global_settings(
        &self,
        update: GlobalSettingsUpdate,
    ) -> Result<GlobalSettings> {
        self.mutate(|store| {
            store.global_settings.apply(&update);
            Ok(store.global_settings.clone())
        })
        .await
    }

    /// Preferred account order; profiles missing from the stored order
    /// follow in list order.
    pub async fn account_priority_order(&self, kind: ProviderKind) -> Result<Vec<String>> {
        self.read(|store| {
            let Some(state) = store.provider(kind) else {
                return Vec::new();
            };
            let mut order: Vec<String> = state
                .account_priority_order
                .iter()
                .flatten()
                .filter(|id| state.find(id).is_some())
                .cloned()
                .collect();
            for profile in &state.profiles {
                if !order.contains(&profile.id) {
                    order.push(profile.id.clone());
                }
            }
            order
        })
        .await
    }

    pub async fn set_account_priority_order(
        &self,
        kind: ProviderKind,
        order: Vec<String>,
    ) -> Result<()> {
        self.mutate(|store| {
            let state = store.provider_mut(kind);
            let mut deduped: Vec<String> = Vec::with_capacity(order.len());
            for id in order {
                if state.find(&id).is_none() {
                    return Err(not_found(kind, &id));
                }
                if !deduped.contains(&id) {
                    deduped.push(id);
                }
            }
            state.account_priority_order = Some(deduped);
            Ok(())
        })
        .await
    }

    /// Vault service name holding the secrets of a profile
    pub fn profile_service_name(&self, kind: ProviderKind, id: &str) -> String {
        match &self.vault {
            Some(vault) => vault.service_name(kind, id),
            None => vault_service_name(&self.config.vault_namespace, kind, id),
        }
    }

    /// Last degraded save, cleared on read
    pub fn take_persist_warning(&self) -> Option<String> {
        self.persist_warning.lock().take()
    }

    async fn read<T>(&self, f: impl FnOnce(&UnifiedStore) -> T) -> Result<T> {
        let guard = self.store.lock().await;
        let store = guard
            .as_ref()
            .ok_or(ConductorError::NotInitialized("Profile manager"))?;
        Ok(f(store))
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut UnifiedStore) -> Result<T>) -> Result<T> {
        let mut guard = self.store.lock().await;
        let mut next = guard
            .as_ref()
            .ok_or(ConductorError::NotInitialized("Profile manager"))?
            .clone();
        let value = f(&mut next)?;

        let outcome = save_store(&self.config.store_path, &next).await;
        *guard = Some(next);
        drop(guard);

        if let SaveOutcome::Degraded(message) = outcome {
            *self.persist_warning.lock() = Some(message);
        }
        Ok(value)
    }
}

fn not_found(kind: ProviderKind, id: &str) -> ConductorError {
    ConductorError::NotFound(format!("{} profile {}", kind, id))
}

/// `<kind>-<slug>-<6 lowercase alphanumerics>`
pub fn generate_profile_id(kind: ProviderKind, name: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", kind, slugify(name), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::ProviderCredentials;
    use crate::auth::vault::MemoryVault;
    use tempfile::{TempDir, tempdir};

    async fn manager() -> (UnifiedProfileManager, TempDir) {
        let dir = tempdir().unwrap();
        let config = ManagerConfig::new(dir.path().join("unified-profiles.json"));
        let manager = UnifiedProfileManager::new(config, Arc::new(CredentialCache::new()));
        manager.initialize().await.unwrap();
        (manager, dir)
    }

    #[tokio::test]
    async fn test_operations_before_initialize_fail() {
        let dir = tempdir().unwrap();
        let manager = UnifiedProfileManager::new(
            ManagerConfig::new(dir.path().join("p.json")),
            Arc::new(CredentialCache::new()),
        );

        let err = manager.list_profiles(ProviderKind::Claude).await.unwrap_err();
        assert_eq!(err.code(), "NOT_INITIALIZED");
        assert!(
            manager
                .add_profile(ProviderKind::Claude, NewProfile::named("Work"))
                .await
                .is_err()
        );
        assert!(!manager.is_initialized().await);
    }

    #[tokio::test]
    async fn test_first_profile_is_default_and_active() {
        let (manager, _dir) = manager().await;

        let first = manager
            .add_profile(ProviderKind::Gemini, NewProfile::named("Work Account"))
            .await
            .unwrap();
        let second = manager
            .add_profile(ProviderKind::Gemini, NewProfile::named("Home"))
            .await
            .unwrap();

        assert!(first.is_default);
        assert!(!second.is_default);
        assert!(first.id.starts_with("gemini-work-account-"));
        assert_eq!(first.id.len(), "gemini-work-account-".len() + ID_SUFFIX_LEN);
        let active = manager.get_active_profile(ProviderKind::Gemini).await.unwrap();
        assert_eq!(active.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let (manager, _dir) = manager().await;
        let err = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("   "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVARIANT_VIOLATION");
    }

    #[tokio::test]
    async fn test_update_unknown_profile_is_not_found() {
        let (manager, _dir) = manager().await;
        let err = manager
            .update_profile(ProviderKind::Claude, "missing", ProfileUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_update_merges_fields_and_persists() {
        let (manager, dir) = manager().await;
        let profile = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("Work"))
            .await
            .unwrap();

        let updated = manager
            .update_profile(
                ProviderKind::Claude,
                &profile.id,
                ProfileUpdate {
                    email: Some("dev@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Work");
        assert_eq!(updated.email.as_deref(), Some("dev@example.com"));

        let reloaded = UnifiedProfileManager::new(
            ManagerConfig::new(dir.path().join("unified-profiles.json")),
            Arc::new(CredentialCache::new()),
        );
        reloaded.initialize().await.unwrap();
        let stored = reloaded
            .get_profile(ProviderKind::Claude, &profile.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_delete_last_profile_is_rejected_and_store_unchanged() {
        let (manager, _dir) = manager().await;
        let only = manager
            .add_profile(ProviderKind::OpenAI, NewProfile::named("Only"))
            .await
            .unwrap();
        let before = manager.snapshot().await.unwrap();

        let err = manager
            .delete_profile(ProviderKind::OpenAI, &only.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVARIANT_VIOLATION");
        assert_eq!(manager.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_default_promotes_first_remaining() {
        let (manager, _dir) = manager().await;
        let a = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("A"))
            .await
            .unwrap();
        let b = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("B"))
            .await
            .unwrap();
        manager
            .set_account_priority_order(ProviderKind::Claude, vec![a.id.clone(), b.id.clone()])
            .await
            .unwrap();

        manager.delete_profile(ProviderKind::Claude, &a.id).await.unwrap();

        let profiles = manager.list_profiles(ProviderKind::Claude).await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert!(profiles[0].is_default);
        assert_eq!(
            manager.get_active_profile(ProviderKind::Claude).await.unwrap().unwrap().id,
            b.id
        );
        assert_eq!(
            manager.account_priority_order(ProviderKind::Claude).await.unwrap(),
            vec![b.id]
        );
    }

    #[tokio::test]
    async fn test_delete_invalidates_cache_and_vault() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(CredentialCache::new());
        let vault = VaultHandle::new(Arc::new(MemoryVault::new()), "Test");
        let manager = UnifiedProfileManager::new(
            ManagerConfig::new(dir.path().join("p.json")),
            cache.clone(),
        )
        .with_vault(vault.clone());
        manager.initialize().await.unwrap();

        let a = manager
            .add_profile(ProviderKind::Gemini, NewProfile::named("A"))
            .await
            .unwrap();
        let b = manager
            .add_profile(ProviderKind::Gemini, NewProfile::named("B"))
            .await
            .unwrap();
        let creds = ProviderCredentials::api_key(ProviderKind::Gemini, "key");
        cache.cache(&b.id, creds.clone());
        vault.store(ProviderKind::Gemini, &b.id, &creds).unwrap();

        manager.delete_profile(ProviderKind::Gemini, &b.id).await.unwrap();

        assert!(cache.get(&b.id).is_none());
        assert!(vault.load(ProviderKind::Gemini, &b.id).is_none());
        assert!(manager.get_profile(ProviderKind::Gemini, &a.id).await.unwrap().is_some());
        assert_eq!(
            manager.profile_service_name(ProviderKind::Gemini, &a.id),
            vault.service_name(ProviderKind::Gemini, &a.id)
        );
    }

    #[tokio::test]
    async fn test_set_active_invalidates_both_profiles() {
        let (manager, _dir) = manager().await;
        let a = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("A"))
            .await
            .unwrap();
        let b = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("B"))
            .await
            .unwrap();
        let creds = ProviderCredentials::oauth(ProviderKind::Claude, "t", None, None);
        manager.cache().cache(&a.id, creds.clone());
        manager.cache().cache(&b.id, creds);

        manager.set_active_profile(ProviderKind::Claude, &b.id).await.unwrap();

        assert!(manager.cache().is_empty());
        let err = manager
            .set_active_profile(ProviderKind::Claude, "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(
            manager.get_active_profile(ProviderKind::Claude).await.unwrap().unwrap().id,
            b.id
        );
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let (manager, dir) = manager().await;
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .add_profile(ProviderKind::Opencode, NewProfile::named(format!("P{}", i)))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let profiles = manager.list_profiles(ProviderKind::Opencode).await.unwrap();
        assert_eq!(profiles.len(), 16);
        assert_eq!(profiles.iter().filter(|p| p.is_default).count(), 1);

        let on_disk = load_store(&dir.path().join("unified-profiles.json")).await;
        assert_eq!(
            on_disk.store.provider(ProviderKind::Opencode).unwrap().profiles.len(),
            16
        );
    }

    #[tokio::test]
    async fn test_auto_switch_settings_are_per_kind() {
        let (manager, _dir) = manager().await;
        manager
            .update_auto_switch_settings(
                ProviderKind::Claude,
                AutoSwitchUpdate {
                    enabled: Some(true),
                    session_threshold_percent: Some(90),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let claude = manager.get_auto_switch_settings(ProviderKind::Claude).await.unwrap();
        let gemini = manager.get_auto_switch_settings(ProviderKind::Gemini).await.unwrap();
        assert!(claude.enabled);
        assert_eq!(claude.session_threshold_percent, 90);
        assert_eq!(gemini, AutoSwitchPolicy::default());
    }

    #[tokio::test]
    async fn test_global_settings_update() {
        let (manager, _dir) = manager().await;
        let settings = manager
            .update_global_settings(GlobalSettingsUpdate {
                cross_provider_fallback: Some(true),
            })
            .await
            .unwrap();
        assert!(settings.cross_provider_fallback);

        let unchanged = manager
            .update_global_settings(GlobalSettingsUpdate::default())
            .await
            .unwrap();
        assert!(unchanged.cross_provider_fallback);
    }

    #[tokio::test]
    async fn test_mark_authenticated_touches_last_used() {
        let (manager, _dir) = manager().await;
        let profile = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("Work"))
            .await
            .unwrap();
        assert!(profile.last_used_at.is_none());

        let marked = manager
            .mark_authenticated(ProviderKind::Claude, &profile.id, true)
            .await
            .unwrap();
        assert!(marked.is_authenticated);
        assert!(marked.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_priority_order_rejects_unknown_ids() {
        let (manager, _dir) = manager().await;
        let a = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("A"))
            .await
            .unwrap();
        let b = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("B"))
            .await
            .unwrap();

        let err = manager
            .set_account_priority_order(ProviderKind::Claude, vec!["nope".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        manager
            .set_account_priority_order(ProviderKind::Claude, vec![b.id.clone(), b.id.clone()])
            .await
            .unwrap();
        assert_eq!(
            manager.account_priority_order(ProviderKind::Claude).await.unwrap(),
            vec![b.id, a.id]
        );
    }

    #[tokio::test]
    async fn test_failed_save_sets_warning() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let manager = UnifiedProfileManager::new(
            ManagerConfig::new(blocker.join("unified-profiles.json")),
            Arc::new(CredentialCache::new()),
        );
        manager.initialize().await.unwrap();

        let profile = manager
            .add_profile(ProviderKind::Claude, NewProfile::named("Work"))
            .await
            .unwrap();

        assert!(manager.take_persist_warning().is_some());
        assert!(manager.take_persist_warning().is_none());
        assert!(
            manager
                .get_profile(ProviderKind::Claude, &profile.id)
                .await
                .unwrap()
                .is_some()
        );
    }
}
