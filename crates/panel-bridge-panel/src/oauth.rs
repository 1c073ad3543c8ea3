//! OAuth2 client-credentials token provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use panel_bridge_core::config::PanelConfig;
use panel_bridge_core::traits::{CredentialError, CredentialProvider, Token};
use panel_bridge_core::{Clock, SystemClock};
use serde::Deserialize;
use tokio::sync::Mutex;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

const fn default_expires_in() -> i64 {
    3600
}

/// Token provider using the panel's client-credentials grant.
///
/// Caches the issued token and reuses it until it nears expiry.
pub struct OauthTokenProvider {
    http: reqwest::Client,
    config: PanelConfig,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<Token>>,
}

impl OauthTokenProvider {
    /// Create a provider against the configured panel.
    #[must_use]
    pub fn new(config: PanelConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a provider with an injected clock.
    #[must_use]
    pub fn with_clock(config: PanelConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            clock,
            cached: Mutex::new(None),
        }
    }

    async fn request_token(&self) -> Result<Token, CredentialError> {
        let url = format!("{}{}", self.config.base(), self.config.oauth.token_endpoint);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.oauth.client_id.as_str()),
            ("client_secret", self.config.oauth.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Rejected(format!("{status}: {body}")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        tracing::debug!(expires_in = parsed.expires_in, "issued panel token");
        Ok(Token {
            access_token: parsed.access_token,
            expires_at: self.clock.now() + Duration::seconds(parsed.expires_in),
        })
    }
}

#[async_trait]
impl CredentialProvider for OauthTokenProvider {
    async fn token(&self) -> Result<Token, CredentialError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired(self.clock.now()) {
                return Ok(token.clone());
            }
        }

        let token = self.request_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn refresh(&self) -> Result<Token, CredentialError> {
        let mut cached = self.cached.lock().await;
        let token = self.request_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}
