//! Provider Registry
//!
//! Maps terminal ids to live provider instances. At most one binding exists
//! per terminal; creating a new one disposes the old one first.

mod provider;

pub use provider::{AdapterProvider, CliProvider, MODEL_METADATA_KEY};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::adapters::ProviderAdapter;
use crate::auth::cache::CredentialCache;
use crate::auth::types::ProviderKind;
use crate::error::{ConductorError, Result};
use crate::profiles::Profile;

/// Builds a fresh provider instance for a profile
pub type ProviderFactory = Arc<dyn Fn(&Profile) -> Arc<dyn CliProvider> + Send + Sync>;

/// Rate-limit state reported by the terminal's output classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_remaining: Option<u64>,
    /// Epoch milliseconds when the limit lifts
    pub reset_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RateLimitSnapshot {
    pub fn until(reset_at: i64) -> Self {
        Self {
            requests_remaining: None,
            tokens_remaining: None,
            reset_at,
            retry_after_ms: None,
        }
    }

    pub fn is_active_at(&self, now_ms: i64) -> bool {
        now_ms < self.reset_at
    }
}

struct TerminalBinding {
    provider: Arc<dyn CliProvider>,
    kind: ProviderKind,
    profile_id: String,
    session_id: Option<String>,
    rate_limit: Option<RateLimitSnapshot>,
    bound_at: i64,
}

/// Read-only view of a terminal binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingInfo {
    pub terminal_id: String,
    pub provider_kind: ProviderKind,
    pub profile_id: String,
    pub session_id: Option<String>,
    pub rate_limit: Option<RateLimitSnapshot>,
    pub bound_at: i64,
}

impl BindingInfo {
    fn from_binding(terminal_id: &str, binding: &TerminalBinding) -> Self {
        Self {
            terminal_id: terminal_id.to_string(),
            provider_kind: binding.kind,
            profile_id: binding.profile_id.clone(),
            session_id: binding.session_id.clone(),
            rate_limit: binding.rate_limit.clone(),
            bound_at: binding.bound_at,
        }
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<ProviderKind, ProviderFactory>>,
    bindings: Mutex<HashMap<String, TerminalBinding>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with an [`AdapterProvider`] factory for every adapter,
    /// sharing one credential cache.
    pub fn with_adapters(
        adapters: impl IntoIterator<Item = Arc<dyn ProviderAdapter>>,
        cache: Arc<CredentialCache>,
    ) -> Self {
        let registry = Self::new();
        for adapter in adapters {
            let kind = adapter.kind();
            let cache = cache.clone();
            registry.register(
                kind,
                Arc::new(move |_profile: &Profile| -> Arc<dyn CliProvider> {
                    Arc::new(AdapterProvider::new(adapter.clone(), cache.clone()))
                }),
            );
        }
        registry
    }

    pub fn register(&self, kind: ProviderKind, factory: ProviderFactory) {
        self.factories.write().insert(kind, factory);
        debug!(provider = %kind, "Provider factory registered");
    }

    pub fn unregister(&self, kind: ProviderKind) -> bool {
        self.factories.write().remove(&kind).is_some()
    }

    /// Kinds with a registered factory, in canonical order
    pub fn list_available_kinds(&self) -> Vec<ProviderKind> {
        let factories = self.factories.read();
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| factories.contains_key(kind))
            .collect()
    }

    /// Bind a fresh provider to `terminal_id`, disposing any existing one.
    ///
    /// When two calls race on one terminal, the one that finishes
    /// initializing last keeps the binding and the other is disposed.
    pub async fn create_for_terminal(
        &self,
        terminal_id: &str,
        kind: ProviderKind,
        profile: &Profile,
    ) -> Result<Arc<dyn CliProvider>> {
        let factory = self
            .factories
            .read()
            .get(&kind)
            .cloned()
            .ok_or_else(|| ConductorError::UnknownProvider(kind.to_string()))?;
        if profile.provider_kind != kind {
            return Err(ConductorError::InvariantViolation(format!(
                "Profile {} belongs to {}, not {}",
                profile.id, profile.provider_kind, kind
            )));
        }

        // The lock is never held across provider calls, so a slow
        // initialize only blocks its own terminal.
        let previous = self.bindings.lock().await.remove(terminal_id);
        if let Some(previous) = previous {
            previous.provider.dispose().await;
            debug!(
                terminal_id,
                provider = %previous.kind,
                "Disposed previous terminal provider"
            );
        }

        let provider = factory(profile);
        if provider.kind() != kind {
            provider.dispose().await;
            return Err(ConductorError::InvariantViolation(format!(
                "Factory for {} produced a {} provider",
                kind,
                provider.kind()
            )));
        }
        if let Err(err) = provider.initialize(profile).await {
            provider.dispose().await;
            return Err(err);
        }

        let displaced = self.bindings.lock().await.insert(
            terminal_id.to_string(),
            TerminalBinding {
                provider: provider.clone(),
                kind,
                profile_id: profile.id.clone(),
                session_id: None,
                rate_limit: None,
                bound_at: Utc::now().timestamp_millis(),
            },
        );
        if let Some(displaced) = displaced {
            displaced.provider.dispose().await;
            debug!(
                terminal_id,
                provider = %displaced.kind,
                "Disposed binding created while this one initialized"
            );
        }

        info!(
            terminal_id,
            provider = %kind,
            profile_id = %profile.id,
            authenticated = provider.is_authenticated(),
            "Terminal provider bound"
        );
        Ok(provider)
    }

    /// Same as [`Self::create_for_terminal`]; used when a running terminal
    /// changes provider.
    pub async fn switch_for_terminal(
        &self,
        terminal_id: &str,
        kind: ProviderKind,
        profile: &Profile,
    ) -> Result<Arc<dyn CliProvider>> {
        self.create_for_terminal(terminal_id, kind, profile).await
    }

    pub async fn get_for_terminal(&self, terminal_id: &str) -> Option<Arc<dyn CliProvider>> {
        self.bindings
            .lock()
            .await
            .get(terminal_id)
            .map(|binding| binding.provider.clone())
    }

    /// No-op when nothing is bound.
    pub async fn dispose_for_terminal(&self, terminal_id: &str) {
        let removed = self.bindings.lock().await.remove(terminal_id);
        if let Some(binding) = removed {
            binding.provider.dispose().await;
            debug!(terminal_id, provider = %binding.kind, "Terminal provider disposed");
        }
    }

    pub async fn dispose_all(&self) {
        let drained: Vec<_> = self.bindings.lock().await.drain().collect();
        let count = drained.len();
        for (_, binding) in drained {
            binding.provider.dispose().await;
        }
        if count > 0 {
            info!(count, "Disposed all terminal providers");
        }
    }

    pub async fn binding(&self, terminal_id: &str) -> Option<BindingInfo> {
        self.bindings
            .lock()
            .await
            .get(terminal_id)
            .map(|binding| BindingInfo::from_binding(terminal_id, binding))
    }

    pub async fn bindings(&self) -> Vec<BindingInfo> {
        let bindings = self.bindings.lock().await;
        let mut infos: Vec<_> = bindings
            .iter()
            .map(|(id, binding)| BindingInfo::from_binding(id, binding))
            .collect();
        infos.sort_by(|a, b| a.terminal_id.cmp(&b.terminal_id));
        infos
    }

    pub async fn record_rate_limit(
        &self,
        terminal_id: &str,
        snapshot: Option<RateLimitSnapshot>,
    ) -> Result<()> {
        let mut bindings = self.bindings.lock().await;
        let binding = bindings
            .get_mut(terminal_id)
            .ok_or_else(|| ConductorError::NotFound(format!("terminal binding {}", terminal_id)))?;
        if let Some(snapshot) = &snapshot {
            info!(
                terminal_id,
                provider = %binding.kind,
                reset_at = snapshot.reset_at,
                "Rate limit recorded"
            );
        }
        binding.rate_limit = snapshot;
        Ok(())
    }

    /// Attach a CLI session to the terminal's provider for later resume.
    pub async fn set_session(&self, terminal_id: &str, session_id: &str) -> Result<()> {
        let provider = self
            .get_for_terminal(terminal_id)
            .await
            .ok_or_else(|| ConductorError::NotFound(format!("terminal binding {}", terminal_id)))?;
        provider.resume_session(session_id).await?;

        // Only record the session if the terminal is still bound to the
        // same instance.
        if let Some(binding) = self.bindings.lock().await.get_mut(terminal_id)
            && Arc::ptr_eq(&binding.provider, &provider)
        {
            binding.session_id = Some(session_id.to_string());
        }
        Ok(())
    }

    /// Kinds with at least one binding still inside its rate-limit window
    pub async fn rate_limited_kinds_at(&self, now_ms: i64) -> BTreeSet<ProviderKind> {
        self.bindings
            .lock()
            .await
            .values()
            .filter(|binding| {
                binding
                    .rate_limit
                    .as_ref()
                    .is_some_and(|limit| limit.is_active_at(now_ms))
            })
            .map(|binding| binding.kind)
            .collect()
    }

    pub async fn rate_limited_kinds(&self) -> BTreeSet<ProviderKind> {
        self.rate_limited_kinds_at(Utc::now().timestamp_millis()).await
    }
}
