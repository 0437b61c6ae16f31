use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use serde::Deserialize;
use tracing::{error, warn};
use url::Url;

use crate::mistral_client::NO_RESPONSE;
use crate::relay::RelayRequest;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000/api/mistral";

/// Reply shown when the relay cannot be reached at all.
pub const AI_UNAVAILABLE: &str = "Sorry, AI is unavailable.";

const RELAY_TIMEOUT: Duration = Duration::from_secs(90);

/// Body of any relay answer: `reply` on success, `error` on failure.
#[derive(Debug, Default, Deserialize)]
pub struct RelayResponse {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn relay(&self, message: &str) -> Result<RelayResponse>;
}

/// Talks to the relay endpoint over HTTP.
pub struct HttpRelayClient {
    url: Url,
    client: reqwest::Client,
}

impl HttpRelayClient {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).wrap_err_with(|| format!("invalid relay URL: {url}"))?;
        let client = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .wrap_err("failed to build HTTP client")?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn relay(&self, message: &str) -> Result<RelayResponse> {
        let request = RelayRequest {
            message: Some(message.to_string()),
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .wrap_err_with(|| format!("failed to reach relay at {}", self.url))?;

        let status = response.status();
        let body: RelayResponse = response
            .json()
            .await
            .wrap_err_with(|| format!("relay answered {status} with an unreadable body"))?;

        if let Some(reason) = &body.error {
            warn!(%status, "relay reported failure: {reason}");
        }
        Ok(body)
    }
}

/// Asks the relay for a reply. Never fails: any failure becomes fallback text.
pub async fn fetch_reply(client: &dyn RelayClient, message: &str) -> String {
    match client.relay(message).await {
        Ok(RelayResponse {
            reply: Some(reply), ..
        }) if !reply.is_empty() => reply,
        Ok(_) => NO_RESPONSE.to_string(),
        Err(e) => {
            error!("relay call failed: {e:#}");
            AI_UNAVAILABLE.to_string()
        }
    }
}
