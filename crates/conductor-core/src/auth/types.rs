//! Core types for provider credentials
//!
//! Defines provider kinds, their static capabilities, and the credential
//! material adapters resolve for a profile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConductorError;

/// Tokens are treated as expired this long before their real expiry.
pub const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

/// Supported third-party coding CLI providers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Claude Code CLI (OAuth)
    Claude,
    /// Gemini CLI (API key)
    Gemini,
    /// OpenAI Codex CLI (API key)
    #[serde(alias = "codex")]
    OpenAI,
    /// Opencode community CLI (API key)
    Opencode,
}

impl ProviderKind {
    /// Every known provider kind, in canonical order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Claude,
        ProviderKind::Gemini,
        ProviderKind::OpenAI,
        ProviderKind::Opencode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Opencode => "opencode",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "Claude Code",
            ProviderKind::Gemini => "Gemini CLI",
            ProviderKind::OpenAI => "OpenAI Codex",
            ProviderKind::Opencode => "Opencode",
        }
    }

    /// Executable name of the CLI on PATH
    pub fn executable(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAI => "codex",
            ProviderKind::Opencode => "opencode",
        }
    }

    /// Model used when neither the profile nor the caller picks one
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude-sonnet-4-20250514",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::OpenAI => "gpt-4o",
            ProviderKind::Opencode => "deepseek-v3",
        }
    }

    pub fn capabilities(&self) -> ProviderCapabilities {
        match self {
            ProviderKind::Claude => ProviderCapabilities {
                supports_extended_thinking: true,
                supports_mcp: true,
                supports_streaming: true,
                supports_tool_use: true,
                supports_vision: true,
                supports_session_resume: true,
            },
            ProviderKind::Gemini | ProviderKind::OpenAI => ProviderCapabilities {
                supports_extended_thinking: false,
                supports_mcp: false,
                supports_streaming: true,
                supports_tool_use: true,
                supports_vision: true,
                supports_session_resume: false,
            },
            ProviderKind::Opencode => ProviderCapabilities {
                supports_extended_thinking: false,
                supports_mcp: false,
                supports_streaming: true,
                supports_tool_use: true,
                supports_vision: false,
                supports_session_resume: false,
            },
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(ProviderKind::Claude),
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" | "codex" => Ok(ProviderKind::OpenAI),
            "opencode" => Ok(ProviderKind::Opencode),
            _ => Err(ConductorError::UnknownProvider(s.to_string())),
        }
    }
}

/// Static feature flags per provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub supports_extended_thinking: bool,
    pub supports_mcp: bool,
    pub supports_streaming: bool,
    pub supports_tool_use: bool,
    pub supports_vision: bool,
    pub supports_session_resume: bool,
}

/// Secret material resolved for one profile.
///
/// Only ever held in memory, in the credential cache, or in the secret
/// vault. It is never written to the unified profile store.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Access token expiry, epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ProviderCredentials {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            access_token: None,
            refresh_token: None,
            api_key: None,
            expires_at: None,
            config_dir: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn api_key(provider: ProviderKind, key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::new(provider)
        }
    }

    pub fn oauth(
        provider: ProviderKind,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<i64>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            expires_at,
            ..Self::new(provider)
        }
    }

    /// The value a CLI authenticates with: access token first, then API key.
    pub fn primary_secret(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .filter(|v| !v.is_empty())
            .or_else(|| self.api_key.as_deref().filter(|v| !v.is_empty()))
    }

    /// Whether the credential is expired (or about to be) at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now_ms + EXPIRY_BUFFER_MS >= expires_at,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Display-safe version of the primary secret
    pub fn masked(&self) -> String {
        self.primary_secret().map(mask_secret).unwrap_or_default()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("provider", &self.provider)
            .field("access_token", &self.access_token.as_deref().map(mask_secret))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("expires_at", &self.expires_at)
            .field("config_dir", &self.config_dir)
            .finish()
    }
}

/// Mask a secret for logs and CLI output, keeping 4 chars at each end.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Usage figures some providers expose for their subscription plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub session_percent: f64,
    pub weekly_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_resets_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_resets_at: Option<i64>,
    pub fetched_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse_is_case_insensitive() {
        assert_eq!("Claude".parse::<ProviderKind>().unwrap(), ProviderKind::Claude);
        assert_eq!(" GEMINI ".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("codex".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!("opencode".parse::<ProviderKind>().unwrap(), ProviderKind::Opencode);
    }

    #[test]
    fn test_provider_kind_parse_unknown() {
        let err = "cursor".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, ConductorError::UnknownProvider(ref name) if name == "cursor"));
    }

    #[test]
    fn test_provider_kind_serde_names() {
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAI).unwrap(), "\"openai\"");
        let kind: ProviderKind = serde_json::from_str("\"codex\"").unwrap();
        assert_eq!(kind, ProviderKind::OpenAI);
    }

    #[test]
    fn test_capabilities() {
        assert!(ProviderKind::Claude.capabilities().supports_session_resume);
        assert!(!ProviderKind::Gemini.capabilities().supports_mcp);
        assert!(!ProviderKind::Opencode.capabilities().supports_vision);
    }

    #[test]
    fn test_primary_secret_prefers_access_token() {
        let mut creds = ProviderCredentials::api_key(ProviderKind::Gemini, "key-123");
        assert_eq!(creds.primary_secret(), Some("key-123"));

        creds.access_token = Some("access".to_string());
        assert_eq!(creds.primary_secret(), Some("access"));

        creds.access_token = Some(String::new());
        assert_eq!(creds.primary_secret(), Some("key-123"));
    }

    #[test]
    fn test_expiry_buffer() {
        let now = 1_700_000_000_000;
        let creds = ProviderCredentials::oauth(
            ProviderKind::Claude,
            "token",
            None,
            Some(now + EXPIRY_BUFFER_MS + 1_000),
        );
        assert!(!creds.is_expired_at(now));
        assert!(creds.is_expired_at(now + 2_000));

        let no_expiry = ProviderCredentials::api_key(ProviderKind::OpenAI, "sk");
        assert!(!no_expiry.is_expired_at(now));
    }

    #[test]
    fn test_masked() {
        let creds = ProviderCredentials::api_key(ProviderKind::OpenAI, "sk-ant-api03-abcdefgh1234");
        let masked = creds.masked();
        assert!(masked.starts_with("sk-a"));
        assert!(masked.ends_with("1234"));
        assert!(masked.contains("..."));

        assert_eq!(mask_secret("short"), "*****");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = ProviderCredentials::oauth(
            ProviderKind::Claude,
            "sk-ant-REDACTED",
            Some("refresh-secret".to_string()),
            None,
        );
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("verysecret"));
        assert!(!debug.contains("refresh-secret"));
    }
}
