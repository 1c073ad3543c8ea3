//! HTTP control client for the remote panel daemon.

use std::sync::Arc;

use async_trait::async_trait;
use panel_bridge_core::config::PanelConfig;
use panel_bridge_core::traits::{ControlApi, ControlError, CredentialProvider};
use panel_bridge_core::types::ServerStatus;
use reqwest::{Method, StatusCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    running: bool,
}

/// Control client against the panel's daemon proxy endpoints.
///
/// A 401 triggers exactly one token refresh and retry per request.
pub struct PanelClient {
    http: reqwest::Client,
    config: PanelConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl PanelClient {
    /// Create a client for the configured server.
    #[must_use]
    pub fn new(config: PanelConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            credentials,
        }
    }

    fn server_url(&self, tail: &str) -> String {
        format!(
            "{}/proxy/daemon/server/{}/{tail}",
            self.config.base(),
            self.config.server_id
        )
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
    ) -> Result<reqwest::Response, ControlError> {
        let token = self
            .credentials
            .token()
            .await
            .map_err(|e| ControlError::Auth(e.to_string()))?;

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&token.access_token);
        if let Some(body) = body {
            // The daemon console endpoint takes the raw command string.
            request = request.body(body.to_owned());
        }

        request
            .send()
            .await
            .map_err(|e| ControlError::Network(e.to_string()))
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
    ) -> Result<reqwest::Response, ControlError> {
        let response = self.send_once(method.clone(), url, body).await?;

        // Expired token: refresh once, retry once.
        let response = if response.status() == StatusCode::UNAUTHORIZED {
            self.credentials
                .refresh()
                .await
                .map_err(|e| ControlError::Auth(e.to_string()))?;
            self.send_once(method, url, body).await?
        } else {
            response
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ControlError::Auth("token rejected after refresh".into()));
        }
        if status.is_client_error() || status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(ControlError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ControlApi for PanelClient {
    async fn status(&self) -> Result<ServerStatus, ControlError> {
        let url = self.server_url("status");
        let response = self.request(Method::GET, &url, None).await?;

        // The daemon only reports a running flag; transitional states are
        // tracked by the controller around its own dispatches.
        match response.json::<StatusResponse>().await {
            Ok(parsed) if parsed.running => Ok(ServerStatus::Running),
            Ok(_) => Ok(ServerStatus::Stopped),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable status response");
                Ok(ServerStatus::Unknown)
            }
        }
    }

    async fn start(&self) -> Result<(), ControlError> {
        let url = self.server_url("start");
        self.request(Method::POST, &url, None).await?;
        tracing::info!("dispatched start");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ControlError> {
        let url = self.server_url("stop");
        self.request(Method::POST, &url, None).await?;
        tracing::info!("dispatched stop");
        Ok(())
    }

    async fn send_command(&self, command: &str) -> Result<(), ControlError> {
        let url = self.server_url("console");
        self.request(Method::POST, &url, Some(command)).await?;
        tracing::debug!(command, "forwarded console command");
        Ok(())
    }
}
