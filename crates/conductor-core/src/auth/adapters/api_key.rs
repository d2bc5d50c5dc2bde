use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use super::{EnvSnapshot, ProviderAdapter, first_env};
use crate::auth::types::{ProviderCredentials, ProviderKind};
use crate::auth::vault::VaultHandle;
use crate::paths::expand_tilde;
use crate::profiles::Profile;

/// Static description of an API-key driven CLI
#[derive(Debug)]
pub struct ApiKeySpec {
    pub kind: ProviderKind,
    /// Environment variables checked for the key, in order
    pub key_env_vars: &'static [&'static str],
    /// Variable the CLI itself reads the key from
    pub cli_key_var: &'static str,
    /// Variable the CLI reads its config directory from, if any
    pub cli_config_var: Option<&'static str>,
    /// Native credential files, relative to the home directory
    pub native_paths: &'static [&'static str],
    pub auth_command: &'static str,
    pub success_patterns: &'static [&'static str],
    pub failure_patterns: &'static [&'static str],
}

pub static GEMINI: ApiKeySpec = ApiKeySpec {
    kind: ProviderKind::Gemini,
    key_env_vars: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
    cli_key_var: "GEMINI_API_KEY",
    cli_config_var: None,
    native_paths: &[".gemini/oauth_creds.json"],
    auth_command: "gemini",
    success_patterns: &[r"(?i)authenticated (via|with)", r"(?i)logged in"],
    failure_patterns: &[r"(?i)api key not valid", r"(?i)authentication failed"],
};

pub static OPENAI: ApiKeySpec = ApiKeySpec {
    kind: ProviderKind::OpenAI,
    key_env_vars: &["OPENAI_API_KEY"],
    cli_key_var: "OPENAI_API_KEY",
    cli_config_var: Some("CODEX_HOME"),
    native_paths: &[".codex/auth.json"],
    auth_command: "codex login",
    success_patterns: &[r"(?i)successfully logged in", r"(?i)login successful"],
    failure_patterns: &[r"(?i)incorrect api key", r"(?i)login failed"],
};

pub static OPENCODE: ApiKeySpec = ApiKeySpec {
    kind: ProviderKind::Opencode,
    key_env_vars: &["OPENCODE_API_KEY"],
    cli_key_var: "OPENCODE_API_KEY",
    cli_config_var: None,
    native_paths: &[],
    auth_command: "opencode auth login",
    success_patterns: &[r"(?i)logged in", r"(?i)credential (added|saved)"],
    failure_patterns: &[r"(?i)(invalid|missing) api key", r"(?i)unauthorized"],
};

/// Adapter for CLIs authenticated by a static API key.
///
/// Keys do not expire, so refresh is the identity and revocation is a
/// no-op.
pub struct ApiKeyAdapter {
    spec: &'static ApiKeySpec,
    env: EnvSnapshot,
    vault: Option<VaultHandle>,
}

impl ApiKeyAdapter {
    pub fn new(spec: &'static ApiKeySpec, env: EnvSnapshot, vault: Option<VaultHandle>) -> Self {
        Self { spec, env, vault }
    }

    pub fn gemini(env: EnvSnapshot, vault: Option<VaultHandle>) -> Self {
        Self::new(&GEMINI, env, vault)
    }

    pub fn openai(env: EnvSnapshot, vault: Option<VaultHandle>) -> Self {
        Self::new(&OPENAI, env, vault)
    }

    pub fn opencode(env: EnvSnapshot, vault: Option<VaultHandle>) -> Self {
        Self::new(&OPENCODE, env, vault)
    }

    pub fn spec(&self) -> &'static ApiKeySpec {
        self.spec
    }
}

#[async_trait]
impl ProviderAdapter for ApiKeyAdapter {
    fn kind(&self) -> ProviderKind {
        self.spec.kind
    }

    fn native_credential_paths(&self, _profile: &Profile) -> Vec<PathBuf> {
        let Some(home) = dirs::home_dir() else {
            return Vec::new();
        };
        self.spec
            .native_paths
            .iter()
            .map(|relative| home.join(relative))
            .collect()
    }

    async fn read_native_credentials(&self, profile: &Profile) -> Option<ProviderCredentials> {
        let mut credentials = match first_env(&self.env, self.spec.key_env_vars) {
            Some(key) => {
                debug!(provider = %self.kind(), profile_id = %profile.id, "Using API key from environment");
                ProviderCredentials::api_key(self.spec.kind, key)
            }
            None => self
                .vault
                .as_ref()
                .and_then(|vault| vault.load(self.spec.kind, &profile.id))?,
        };

        if credentials.config_dir.is_none() {
            credentials.config_dir = profile.config_dir.clone();
        }
        Some(credentials)
    }

    fn auth_command_line(&self) -> String {
        self.spec.auth_command.to_string()
    }

    fn auth_success_patterns(&self) -> &'static [&'static str] {
        self.spec.success_patterns
    }

    fn auth_failure_patterns(&self) -> &'static [&'static str] {
        self.spec.failure_patterns
    }

    async fn refresh_token(&self, credentials: ProviderCredentials) -> ProviderCredentials {
        credentials
    }

    fn environment_for_cli(&self, credentials: &ProviderCredentials) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(secret) = credentials.primary_secret() {
            env.insert(self.spec.cli_key_var.to_string(), secret.to_string());
        }
        if let (Some(var), Some(dir)) = (self.spec.cli_config_var, credentials.config_dir.as_deref())
        {
            env.insert(
                var.to_string(),
                expand_tilde(dir).to_string_lossy().into_owned(),
            );
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::vault::MemoryVault;
    use std::sync::Arc;

    fn profile(kind: ProviderKind) -> Profile {
        Profile::new(format!("{}-default-xyz789", kind), "Default", kind, 0)
    }

    #[tokio::test]
    async fn test_gemini_reads_fallback_env_var() {
        let mut env = EnvSnapshot::new();
        env.insert("GOOGLE_API_KEY".to_string(), "google-key".to_string());
        let adapter = ApiKeyAdapter::gemini(env, None);

        let creds = adapter
            .read_native_credentials(&profile(ProviderKind::Gemini))
            .await
            .unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("google-key"));
        assert!(adapter.validate_token(&creds));
    }

    #[tokio::test]
    async fn test_falls_back_to_vault() {
        let vault = VaultHandle::new(Arc::new(MemoryVault::new()), "Test");
        let profile = profile(ProviderKind::Opencode);
        vault
            .store(
                ProviderKind::Opencode,
                &profile.id,
                &ProviderCredentials::api_key(ProviderKind::Opencode, "vault-key"),
            )
            .unwrap();
        let adapter = ApiKeyAdapter::opencode(EnvSnapshot::new(), Some(vault));

        let creds = adapter.read_native_credentials(&profile).await.unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("vault-key"));
    }

    #[tokio::test]
    async fn test_absent_without_env_or_vault() {
        let adapter = ApiKeyAdapter::openai(EnvSnapshot::new(), None);
        assert!(
            adapter
                .read_native_credentials(&profile(ProviderKind::OpenAI))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_refresh_is_identity() {
        let adapter = ApiKeyAdapter::openai(EnvSnapshot::new(), None);
        let creds = ProviderCredentials::api_key(ProviderKind::OpenAI, "sk-test");
        assert_eq!(adapter.refresh_token(creds.clone()).await, creds);
        adapter.revoke_token(&creds).await;
        assert!(adapter.fetch_usage(&creds).await.is_none());
    }

    #[test]
    fn test_openai_environment_includes_codex_home() {
        let adapter = ApiKeyAdapter::openai(EnvSnapshot::new(), None);
        let mut creds = ProviderCredentials::api_key(ProviderKind::OpenAI, "sk-test");
        creds.config_dir = Some("/data/codex".to_string());

        let env = adapter.environment_for_cli(&creds);
        assert_eq!(env.get("OPENAI_API_KEY").map(String::as_str), Some("sk-test"));
        assert_eq!(env.get("CODEX_HOME").map(String::as_str), Some("/data/codex"));
    }

    #[test]
    fn test_environment_without_secret_is_empty() {
        let adapter = ApiKeyAdapter::gemini(EnvSnapshot::new(), None);
        let creds = ProviderCredentials::new(ProviderKind::Gemini);
        assert!(adapter.environment_for_cli(&creds).is_empty());
        assert!(!adapter.validate_token(&creds));
    }

    #[test]
    fn test_opencode_has_no_native_paths() {
        let adapter = ApiKeyAdapter::opencode(EnvSnapshot::new(), None);
        assert!(
            adapter
                .native_credential_paths(&profile(ProviderKind::Opencode))
                .is_empty()
        );
    }
}
