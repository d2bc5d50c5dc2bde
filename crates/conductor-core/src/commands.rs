//! Command surface consumed by the UI/IPC layer.
//!
//! Every call returns a payload or a serializable [`CommandError`]; nothing
//! panics across the boundary. Provider kinds arrive as strings and are
//! parsed here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::auth::adapters::{EnvSnapshot, default_adapters};
use crate::auth::cache::CredentialCache;
use crate::auth::types::{ProviderCapabilities, ProviderKind, mask_secret};
use crate::auth::vault::VaultHandle;
use crate::error::ConductorError;
use crate::paths::routing_settings_path;
use crate::profiles::{
    AutoSwitchPolicy, AutoSwitchUpdate, GlobalSettings, GlobalSettingsUpdate, LoadOutcome,
    ManagerConfig, NewProfile, Profile, ProfileUpdate, UnifiedProfileManager,
};
use crate::registry::{BindingInfo, ProviderRegistry, RateLimitSnapshot};
use crate::routing::{
    HandoffRequest, Phase, PhaseHandoff, PhaseOverrides, RoutingRecommendation, RoutingSettings,
    analyze_routing_recommendation, build_handoff_prompt, create_phase_handoff,
    get_task_model, get_task_provider, load_context_lineage, load_routing_settings,
    save_context_lineage, save_routing_settings,
};

/// Serializable error for the frontend
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<ConductorError> for CommandError {
    fn from(err: ConductorError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;

/// Payload plus any persistence warning raised while producing it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    pub executable: &'static str,
    pub default_model: &'static str,
    pub capabilities: ProviderCapabilities,
    pub auth_command: Option<String>,
}

/// Everything the terminal layer needs to spawn a provider CLI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalLaunch {
    pub binding: BindingInfo,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub authenticated: bool,
}

impl TerminalLaunch {
    /// Copy with secret environment values masked, for display
    pub fn masked(&self) -> Self {
        Self {
            env: self
                .env
                .iter()
                .map(|(key, value)| {
                    let secret = key.ends_with("_KEY") || key.contains("TOKEN");
                    let value = if secret { mask_secret(value) } else { value.clone() };
                    (key.clone(), value)
                })
                .collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingRequest {
    pub spec_content: String,
    pub overrides: PhaseOverrides,
    /// Extra kinds to treat as rate limited, on top of live bindings
    pub rate_limited: Vec<String>,
}

/// Provider and per-phase models chosen for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSelection {
    pub provider: ProviderKind,
    pub models: BTreeMap<Phase, String>,
}

/// A recorded handoff with the prompt for the receiving provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRecord {
    pub handoff: PhaseHandoff,
    pub prompt: String,
    pub lineage_path: PathBuf,
}

/// Application entry point owning the manager, registry and shared cache
pub struct Conductor {
    manager: Arc<UnifiedProfileManager>,
    registry: Arc<ProviderRegistry>,
}

impl Conductor {
    pub fn new(manager: Arc<UnifiedProfileManager>, registry: Arc<ProviderRegistry>) -> Self {
        Self { manager, registry }
    }

    /// Wire up default adapters over one credential cache and load the
    /// profile store.
    pub async fn open(
        config: ManagerConfig,
        vault: Option<VaultHandle>,
        env: &EnvSnapshot,
    ) -> CommandResult<Self> {
        let cache = Arc::new(config.credential_cache());
        let adapters = default_adapters(env, vault.clone());

        let mut manager = UnifiedProfileManager::new(config, cache.clone());
        if let Some(vault) = vault {
            manager = manager.with_vault(vault);
        }
        for adapter in &adapters {
            manager.register_adapter(adapter.clone());
        }
        let outcome = manager.initialize().await?;
        if let LoadOutcome::Degraded(reason) = &outcome {
            info!(reason = %reason, "Conductor opened with an empty profile store");
        }

        let registry = ProviderRegistry::with_adapters(adapters, cache);
        Ok(Self::new(Arc::new(manager), Arc::new(registry)))
    }

    pub fn manager(&self) -> &Arc<UnifiedProfileManager> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CredentialCache> {
        self.manager.cache()
    }

    pub fn list_provider_kinds(&self) -> Vec<ProviderInfo> {
        self.registry
            .list_available_kinds()
            .into_iter()
            .map(|kind| ProviderInfo {
                kind,
                display_name: kind.display_name(),
                executable: kind.executable(),
                default_model: kind.default_model(),
                capabilities: kind.capabilities(),
                auth_command: self
                    .manager
                    .get_adapter(kind)
                    .map(|adapter| adapter.auth_command_line()),
            })
            .collect()
    }

    pub async fn list_profiles(&self, kind: &str) -> CommandResult<Vec<Profile>> {
        Ok(self.manager.list_profiles(parse_kind(kind)?).await?)
    }

    pub async fn get_active_profile(&self, kind: &str) -> CommandResult<Option<Profile>> {
        Ok(self.manager.get_active_profile(parse_kind(kind)?).await?)
    }

    pub async fn add_profile(
        &self,
        kind: &str,
        input: NewProfile,
    ) -> CommandResult<CommandOutput<Profile>> {
        let profile = self.manager.add_profile(parse_kind(kind)?, input).await?;
        Ok(self.output(profile))
    }

    pub async fn update_profile(
        &self,
        kind: &str,
        id: &str,
        update: ProfileUpdate,
    ) -> CommandResult<CommandOutput<Profile>> {
        let profile = self
            .manager
            .update_profile(parse_kind(kind)?, id, update)
            .await?;
        Ok(self.output(profile))
    }

    pub async fn delete_profile(&self, kind: &str, id: &str) -> CommandResult<CommandOutput<()>> {
        self.manager.delete_profile(parse_kind(kind)?, id).await?;
        Ok(self.output(()))
    }

    pub async fn set_active_profile(
        &self,
        kind: &str,
        id: &str,
    ) -> CommandResult<CommandOutput<()>> {
        self.manager.set_active_profile(parse_kind(kind)?, id).await?;
        Ok(self.output(()))
    }

    pub async fn get_auto_switch_settings(&self, kind: &str) -> CommandResult<AutoSwitchPolicy> {
        Ok(self
            .manager
            .get_auto_switch_settings(parse_kind(kind)?)
            .await?)
    }

    pub async fn update_auto_switch_settings(
        &self,
        kind: &str,
        update: AutoSwitchUpdate,
    ) -> CommandResult<CommandOutput<AutoSwitchPolicy>> {
        let policy = self
            .manager
            .update_auto_switch_settings(parse_kind(kind)?, update)
            .await?;
        Ok(self.output(policy))
    }

    pub async fn get_global_settings(&self) -> CommandResult<GlobalSettings> {
        Ok(self.manager.get_global_settings().await?)
    }

    pub async fn update_global_settings(
        &self,
        update: GlobalSettingsUpdate,
    ) -> CommandResult<CommandOutput<GlobalSettings>> {
        let settings = self.manager.update_global_settings(update).await?;
        Ok(self.output(settings))
    }

    /// Bind a provider to a terminal. Uses the active profile when
    /// `profile_id` is `None`, and records the resulting auth state on the
    /// profile.
    pub async fn create_terminal_provider(
        &self,
        terminal_id: &str,
        kind: &str,
        profile_id: Option<&str>,
    ) -> CommandResult<CommandOutput<TerminalLaunch>> {
        let kind = parse_kind(kind)?;
        let profile = self.resolve_profile(kind, profile_id).await?;

        let provider = self
            .registry
            .create_for_terminal(terminal_id, kind, &profile)
            .await?;
        let authenticated = provider.is_authenticated();
        if profile.is_authenticated != authenticated {
            self.manager
                .mark_authenticated(kind, &profile.id, authenticated)
                .await?;
        }

        let binding = self.registry.binding(terminal_id).await.ok_or_else(|| {
            ConductorError::NotFound(format!("terminal binding {}", terminal_id))
        })?;
        let launch = TerminalLaunch {
            binding,
            command: provider.cli_command()?,
            env: provider.cli_env(),
            authenticated,
        };
        Ok(self.output(launch))
    }

    pub async fn switch_terminal_provider(
        &self,
        terminal_id: &str,
        kind: &str,
        profile_id: Option<&str>,
    ) -> CommandResult<CommandOutput<TerminalLaunch>> {
        self.create_terminal_provider(terminal_id, kind, profile_id)
            .await
    }

    pub async fn dispose_terminal_provider(&self, terminal_id: &str) {
        self.registry.dispose_for_terminal(terminal_id).await;
    }

    pub async fn report_rate_limit(
        &self,
        terminal_id: &str,
        snapshot: Option<RateLimitSnapshot>,
    ) -> CommandResult<()> {
        Ok(self
            .registry
            .record_rate_limit(terminal_id, snapshot)
            .await?)
    }

    /// Routing recommendation using the project's settings (or defaults)
    /// and every kind currently rate limited on a live terminal.
    pub async fn recommend_routing(
        &self,
        request: RoutingRequest,
        project_dir: Option<&Path>,
    ) -> CommandResult<RoutingRecommendation> {
        let mut rate_limited: BTreeSet<ProviderKind> = self.registry.rate_limited_kinds().await;
        for kind in &request.rate_limited {
            rate_limited.insert(parse_kind(kind)?);
        }
        let settings = match project_dir {
            Some(dir) => load_routing_settings(&routing_settings_path(dir)).await,
            None => RoutingSettings::default(),
        };

        Ok(analyze_routing_recommendation(
            &request.spec_content,
            &request.overrides,
            &rate_limited,
            &settings,
        ))
    }

    pub async fn get_routing_settings(&self, project_dir: &Path) -> RoutingSettings {
        load_routing_settings(&routing_settings_path(project_dir)).await
    }

    pub async fn save_routing_settings(
        &self,
        project_dir: &Path,
        settings: &RoutingSettings,
    ) -> CommandResult<()> {
        Ok(save_routing_settings(&routing_settings_path(project_dir), settings).await?)
    }

    /// Provider for a task in `spec_dir`, plus the model for each phase.
    /// `cli_model` applies to every phase.
    pub async fn select_task_provider(
        &self,
        spec_dir: &Path,
        cli_provider: Option<&str>,
        cli_model: Option<&str>,
    ) -> TaskSelection {
        let provider = get_task_provider(spec_dir, cli_provider).await;
        let mut models = BTreeMap::new();
        for phase in Phase::ALL {
            let model = get_task_model(spec_dir, phase, provider, cli_model).await;
            models.insert(phase, model);
        }
        TaskSelection { provider, models }
    }

    /// Build a handoff between phases and append it to the task's lineage.
    pub async fn record_phase_handoff(
        &self,
        spec_dir: &Path,
        request: HandoffRequest,
    ) -> CommandResult<HandoffRecord> {
        let handoff = create_phase_handoff(request);
        let lineage_path = save_context_lineage(spec_dir, &handoff).await?;
        info!(
            source = %handoff.source_provider,
            target = %handoff.target_provider,
            phase = %handoff.target_phase,
            "Phase handoff recorded"
        );
        Ok(HandoffRecord {
            prompt: build_handoff_prompt(&handoff),
            handoff,
            lineage_path,
        })
    }

    pub async fn get_context_lineage(&self, spec_dir: &Path) -> Vec<PhaseHandoff> {
        load_context_lineage(spec_dir).await
    }

    /// Dispose every terminal provider
    pub async fn shutdown(&self) {
        self.registry.dispose_all().await;
    }

    async fn resolve_profile(
        &self,
        kind: ProviderKind,
        profile_id: Option<&str>,
    ) -> CommandResult<Profile> {
        let profile = match profile_id {
            Some(id) => self.manager.get_profile(kind, id).await?,
            None => self.manager.get_active_profile(kind).await?,
        };
        profile.ok_or_else(|| {
            ConductorError::NotFound(match profile_id {
                Some(id) => format!("{} profile {}", kind, id),
                None => format!("{} has no profiles", kind),
            })
            .into()
        })
    }

    fn output<T>(&self, data: T) -> CommandOutput<T> {
        CommandOutput {
            data,
            warning: self.manager.take_persist_warning(),
        }
    }
}

fn parse_kind(kind: &str) -> CommandResult<ProviderKind> {
    Ok(kind.parse::<ProviderKind>()?)
}
