//! OAuth token refreshers.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::types::{ProviderCredentials, ProviderKind};

const ANTHROPIC_CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";
const ANTHROPIC_TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

/// Upper bound for one token refresh round trip
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Epoch milliseconds
    pub expires_at: Option<i64>,
}

impl RefreshedToken {
    /// Merge into existing credentials, keeping the old refresh token when
    /// the endpoint does not rotate it.
    pub fn apply_to(self, credentials: &ProviderCredentials) -> ProviderCredentials {
        ProviderCredentials {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token.or_else(|| credentials.refresh_token.clone()),
            expires_at: self.expires_at,
            ..credentials.clone()
        }
    }
}

#[async_trait]
pub trait OAuthRefresher: Send + Sync {
    fn provider(&self) -> ProviderKind;

    async fn refresh(&self, credentials: &ProviderCredentials) -> Result<RefreshedToken>;
}

#[derive(Debug, Clone)]
pub struct AnthropicRefresher {
    client: Client,
}

impl AnthropicRefresher {
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build HTTP client for token refresh")?;
        Ok(Self { client })
    }
}

impl Default for AnthropicRefresher {
    fn default() -> Self {
        Self::with_timeout(REFRESH_TIMEOUT).unwrap_or_else(|err| {
            warn!(error = %err, "Falling back to default HTTP client for token refresh");
            Self {
                client: Client::new(),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicRefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[async_trait]
impl OAuthRefresher for AnthropicRefresher {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    async fn refresh(&self, credentials: &ProviderCredentials) -> Result<RefreshedToken> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "OAuth credential missing refresh token for provider {}",
                    self.provider()
                )
            })?;

        let response = self
            .client
            .post(ANTHROPIC_TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", ANTHROPIC_CLIENT_ID),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .context("Failed to send refresh token request")?
            .error_for_status()
            .context("Refresh token request failed")?
            .json::<AnthropicRefreshResponse>()
            .await
            .context("Failed to parse refresh token response")?;

        let expires_at = response
            .expires_in
            .map(|seconds| Utc::now().timestamp_millis() + seconds * 1000);

        Ok(RefreshedToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
        })
    }
}
