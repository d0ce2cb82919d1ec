//! Control service REST client.
//!
//! Uses reqwest to call the authorization endpoint and the public IP lookup
//! service used while presenting the approval URL.

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AuthError;

/// Per-request timeout for control service calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = "mailway-self-host";

/// Service answering with the caller's public address as plain text.
pub const IPIFY_URL: &str = "https://api.ipify.org?format=text";

/// Envelope returned by `GET /instance/{id}/authorize`.
#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    ok: bool,
    #[serde(default)]
    data: AuthorizeData,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorizeData {
    #[serde(default)]
    jwt: String,
}

/// Source of instance credentials.
pub trait ControlApi: Send + Sync + 'static {
    /// Ask the control service for the credential of `server_id`.
    ///
    /// An empty string means the instance has not been approved yet.
    fn fetch_credential(
        &self,
        server_id: &str,
    ) -> impl Future<Output = Result<String, AuthError>> + Send;
}

/// reqwest-backed control service client.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControlClient {
    pub fn new(base_url: &str) -> Result<Self, AuthError> {
        // reqwest is built with rustls-no-provider; `Err` means a provider is
        // already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn authorize_url(&self, server_id: &str) -> String {
        format!("{}/instance/{server_id}/authorize", self.base_url)
    }

    /// Public IP address of this machine as seen from the internet.
    pub async fn outbound_ip(&self) -> Result<IpAddr, AuthError> {
        self.outbound_ip_from(IPIFY_URL).await
    }

    pub(crate) async fn outbound_ip_from(&self, url: &str) -> Result<IpAddr, AuthError> {
        let body = self.http.get(url).send().await?.text().await?;
        body.trim()
            .parse()
            .map_err(|e| AuthError::Protocol(format!("invalid IP address {body:?}: {e}")))
    }
}

impl ControlApi for ControlClient {
    async fn fetch_credential(&self, server_id: &str) -> Result<String, AuthError> {
        let url = self.authorize_url(server_id);
        tracing::debug!(url = %url, "Requesting instance authorization");

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        let envelope: AuthorizeResponse = serde_json::from_slice(&body).map_err(|e| {
            AuthError::Protocol(format!("could not parse JSON (HTTP {status}): {e}"))
        })?;

        if !envelope.ok {
            tracing::warn!(status = %status, "Control service answered ok=false");
        }
        Ok(envelope.data.jwt)
    }
}
