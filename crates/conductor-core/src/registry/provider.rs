//! Live provider instances bound to terminals.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::adapters::ProviderAdapter;
use crate::auth::cache::CredentialCache;
use crate::auth::resolver::{CredentialResolution, resolve_credentials};
use crate::auth::types::{ProviderCredentials, ProviderKind};
use crate::error::{ConductorError, Result};
use crate::profiles::Profile;

/// Metadata key a profile can use to pin its model
pub const MODEL_METADATA_KEY: &str = "model";

/// One provider CLI as seen by a terminal.
///
/// Produces the command line and environment the terminal layer spawns;
/// it never spawns anything itself.
#[async_trait]
pub trait CliProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Bind to `profile` and resolve its credentials. Credential problems
    /// do not fail initialization; they show up in `is_authenticated`.
    async fn initialize(&self, profile: &Profile) -> Result<()>;

    fn profile(&self) -> Option<Profile>;

    fn is_authenticated(&self) -> bool;

    fn cli_command(&self) -> Result<Vec<String>>;

    fn cli_env(&self) -> BTreeMap<String, String>;

    async fn resume_session(&self, session_id: &str) -> Result<()>;

    fn session_id(&self) -> Option<String>;

    /// Whether the CLI executable is on PATH
    async fn health_check(&self) -> bool;

    async fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

#[derive(Debug, Default)]
struct ProviderState {
    profile: Option<Profile>,
    credentials: Option<ProviderCredentials>,
    session_id: Option<String>,
    disposed: bool,
}

/// [`CliProvider`] backed by a [`ProviderAdapter`] with the credential
/// cache in front of it.
pub struct AdapterProvider {
    adapter: Arc<dyn ProviderAdapter>,
    cache: Arc<CredentialCache>,
    state: RwLock<ProviderState>,
}

impl AdapterProvider {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, cache: Arc<CredentialCache>) -> Self {
        Self {
            adapter,
            cache,
            state: RwLock::new(ProviderState::default()),
        }
    }

    /// Model from the profile's metadata, else the kind's default
    pub fn model(&self) -> String {
        let state = self.state.read();
        state
            .profile
            .as_ref()
            .and_then(|p| p.metadata_str(MODEL_METADATA_KEY))
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| self.kind().default_model())
            .to_string()
    }
}

#[async_trait]
impl CliProvider for AdapterProvider {
    fn kind(&self) -> ProviderKind {
        self.adapter.kind()
    }

    async fn initialize(&self, profile: &Profile) -> Result<()> {
        if profile.provider_kind != self.kind() {
            return Err(ConductorError::InvariantViolation(format!(
                "Profile {} belongs to {}, not {}",
                profile.id,
                profile.provider_kind,
                self.kind()
            )));
        }

        let resolution = resolve_credentials(self.adapter.as_ref(), &self.cache, profile).await;
        if let CredentialResolution::Failed(reason) = &resolution {
            warn!(
                provider = %self.kind(),
                profile_id = %profile.id,
                reason = ?reason,
                "Provider initialized without valid credentials"
            );
        }

        let mut state = self.state.write();
        state.profile = Some(profile.clone());
        state.credentials = resolution.into_credentials();
        state.session_id = None;
        state.disposed = false;
        debug!(provider = %self.kind(), profile_id = %profile.id, "Provider initialized");
        Ok(())
    }

    fn profile(&self) -> Option<Profile> {
        self.state.read().profile.clone()
    }

    fn is_authenticated(&self) -> bool {
        let state = self.state.read();
        !state.disposed
            && state
                .credentials
                .as_ref()
                .is_some_and(|creds| self.adapter.validate_token(creds))
    }

    fn cli_command(&self) -> Result<Vec<String>> {
        if self.state.read().profile.is_none() {
            return Err(ConductorError::NotInitialized("Provider"));
        }

        let kind = self.kind();
        let mut command = vec![
            kind.executable().to_string(),
            "--model".to_string(),
            self.model(),
        ];
        if kind.capabilities().supports_session_resume
            && let Some(session_id) = self.session_id()
        {
            command.push("--resume".to_string());
            command.push(session_id);
        }
        Ok(command)
    }

    fn cli_env(&self) -> BTreeMap<String, String> {
        let state = self.state.read();
        let Some(profile) = state.profile.as_ref() else {
            return BTreeMap::new();
        };
        match state.credentials.as_ref() {
            Some(credentials) => self.adapter.environment_for_cli(credentials),
            None => {
                let mut bare = ProviderCredentials::new(self.kind());
                bare.config_dir = profile.config_dir.clone();
                self.adapter.environment_for_cli(&bare)
            }
        }
    }

    async fn resume_session(&self, session_id: &str) -> Result<()> {
        if !self.kind().capabilities().supports_session_resume {
            return Err(ConductorError::InvariantViolation(format!(
                "{} does not support session resume",
                self.kind().display_name()
            )));
        }
        self.state.write().session_id = Some(session_id.to_string());
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.state.read().session_id.clone()
    }

    async fn health_check(&self) -> bool {
        let executable = self.kind().executable();
        match which::which(executable) {
            Ok(path) => {
                debug!(provider = %self.kind(), path = %path.display(), "CLI found");
                true
            }
            Err(e) => {
                warn!(provider = %self.kind(), executable, error = %e, "CLI not found on PATH");
                false
            }
        }
    }

    async fn dispose(&self) {
        let mut state = self.state.write();
        state.credentials = None;
        state.session_id = None;
        state.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.state.read().disposed
    }
}
