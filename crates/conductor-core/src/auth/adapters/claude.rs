use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{EnvSnapshot, ProviderAdapter, first_env};
use crate::auth::refresh::{AnthropicRefresher, OAuthRefresher};
use crate::auth::types::{ProviderCredentials, ProviderKind};
use crate::auth::vault::VaultHandle;
use crate::paths::expand_tilde;
use crate::profiles::Profile;

const TOKEN_ENV_VARS: &[&str] = &["CLAUDE_CODE_OAUTH_TOKEN", "ANTHROPIC_AUTH_TOKEN"];
const CREDENTIALS_FILE: &str = ".credentials.json";
const ENTRYPOINT: &str = "conductor";

const SUCCESS_PATTERNS: &[&str] = &[
    r"(?i)login successful",
    r"(?i)successfully (logged in|authenticated)",
    r"(?i)long-lived authentication token",
];
const FAILURE_PATTERNS: &[&str] = &[
    r"(?i)login failed",
    r"(?i)invalid (api key|token)",
    r"(?i)oauth error",
    r"(?i)authentication_error",
];

/// Claude Code adapter (OAuth with refresh)
pub struct ClaudeAdapter {
    env: EnvSnapshot,
    vault: Option<VaultHandle>,
    refresher: Arc<dyn OAuthRefresher>,
}

impl ClaudeAdapter {
    pub fn new(env: EnvSnapshot, vault: Option<VaultHandle>) -> Self {
        Self::with_refresher(env, vault, Arc::new(AnthropicRefresher::default()))
    }

    pub fn with_refresher(
        env: EnvSnapshot,
        vault: Option<VaultHandle>,
        refresher: Arc<dyn OAuthRefresher>,
    ) -> Self {
        Self {
            env,
            vault,
            refresher,
        }
    }

    fn config_dir(profile: &Profile) -> PathBuf {
        match profile.config_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => expand_tilde(dir),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".claude"),
        }
    }
}

/// Claude Code credentials file structure
#[derive(Debug, Deserialize)]
struct ClaudeCredentialsFile {
    #[serde(rename = "claudeAiOauth")]
    claude_ai_oauth: Option<ClaudeOAuthCredential>,
}

#[derive(Debug, Deserialize)]
struct ClaudeOAuthCredential {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresAt")]
    expires_at: Option<i64>,
}

async fn read_credentials_file(path: &Path) -> Result<Option<ProviderCredentials>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context("Failed to read credentials file"),
    };
    let file: ClaudeCredentialsFile =
        serde_json::from_str(&content).context("Failed to parse credentials file")?;

    Ok(file.claude_ai_oauth.map(|oauth| {
        ProviderCredentials::oauth(
            ProviderKind::Claude,
            oauth.access_token,
            oauth.refresh_token,
            oauth.expires_at,
        )
    }))
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn native_credential_paths(&self, profile: &Profile) -> Vec<PathBuf> {
        vec![Self::config_dir(profile).join(CREDENTIALS_FILE)]
    }

    async fn read_native_credentials(&self, profile: &Profile) -> Option<ProviderCredentials> {
        let config_dir = profile.config_dir.clone();

        if let Some(token) = first_env(&self.env, TOKEN_ENV_VARS) {
            debug!(profile_id = %profile.id, "Using Claude token from environment");
            let mut credentials = ProviderCredentials::oauth(ProviderKind::Claude, token, None, None);
            credentials.config_dir = config_dir;
            return Some(credentials);
        }

        for path in self.native_credential_paths(profile) {
            match read_credentials_file(&path).await {
                Ok(Some(mut credentials)) => {
                    debug!(profile_id = %profile.id, path = ?path, "Read Claude credentials file");
                    credentials.config_dir = config_dir;
                    return Some(credentials);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(error = %error, path = ?path, "Ignoring unreadable Claude credentials");
                }
            }
        }

        self.vault.as_ref().and_then(|vault| {
            vault
                .load(ProviderKind::Claude, &profile.id)
                .map(|mut credentials| {
                    if credentials.config_dir.is_none() {
                        credentials.config_dir = config_dir;
                    }
                    credentials
                })
        })
    }

    fn auth_command_line(&self) -> String {
        "claude setup-token".to_string()
    }

    fn auth_success_patterns(&self) -> &'static [&'static str] {
        SUCCESS_PATTERNS
    }

    fn auth_failure_patterns(&self) -> &'static [&'static str] {
        FAILURE_PATTERNS
    }

    async fn refresh_token(&self, credentials: ProviderCredentials) -> ProviderCredentials {
        if !credentials.can_refresh() {
            return credentials;
        }

        match self.refresher.refresh(&credentials).await {
            Ok(refreshed) => {
                info!(provider = %self.kind(), "Refreshed OAuth token");
                refreshed.apply_to(&credentials)
            }
            Err(error) => {
                warn!(%error, provider = %self.kind(), "Failed to refresh OAuth token");
                credentials
            }
        }
    }

    fn environment_for_cli(&self, credentials: &ProviderCredentials) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("CLAUDE_CODE_ENTRYPOINT".to_string(), ENTRYPOINT.to_string());

        if let Some(dir) = credentials.config_dir.as_deref() {
            env.insert(
                "CLAUDE_CONFIG_DIR".to_string(),
                expand_tilde(dir).to_string_lossy().into_owned(),
            );
        }
        if let Some(token) = credentials.access_token.as_deref().filter(|t| !t.is_empty()) {
            env.insert("CLAUDE_CODE_OAUTH_TOKEN".to_string(), token.to_string());
        } else if let Some(key) = credentials.api_key.as_deref().filter(|k| !k.is_empty()) {
            env.insert("ANTHROPIC_API_KEY".to_string(), key.to_string());
        }
        env
    }
}
