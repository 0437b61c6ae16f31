use std::env;
use std::time::Duration;

use eyre::{Result, WrapErr};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::relay::RelayError;

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";
pub const DEFAULT_MODEL: &str = "mistral-small";
const COMPLETIONS_PATH: &str = "v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Reply substituted when the provider answers without a completion.
pub const NO_RESPONSE: &str = "No response received.";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Client for Mistral's chat-completions endpoint.
///
/// The API key is optional on purpose: the relay has to start without it and
/// report [`RelayError::Configuration`] per request instead.
pub struct MistralClient {
    api_key: Option<String>,
    model: String,
    url: Url,
    client: reqwest::Client,
}

impl MistralClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>, base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .wrap_err_with(|| format!("invalid provider base URL: {base_url}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let url = base.join(COMPLETIONS_PATH)?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            model: model.into(),
            url,
            client,
        })
    }

    /// Reads `MISTRAL_API_KEY`, `MISTRAL_BASE_URL` and `MISTRAL_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("MISTRAL_API_KEY").ok();
        let base_url = env::var("MISTRAL_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = env::var("MISTRAL_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let client = Self::new(api_key, model, &base_url)?;
        info!(
            "MISTRAL_API_KEY: {}",
            if client.has_api_key() { "Loaded" } else { "Not Found" }
        );
        Ok(client)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    /// Sends `message` as a single user turn and returns the first choice.
    ///
    /// No earlier turns are sent; every call is context-free for the provider.
    pub async fn complete(&self, message: &str) -> Result<String, RelayError> {
        let api_key = self.api_key.as_deref().ok_or(RelayError::Configuration)?;

        let request_body = CompletionRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: message,
            }],
        };

        debug!(model = %self.model, url = %self.url, "sending completion request");

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Mistral API returned {status}: {error_text}");
            return Err(RelayError::Upstream {
                status: status.as_u16(),
            });
        }

        let response_json: Value = response.json().await?;
        debug!("Received response from Mistral API: {response_json}");

        Ok(extract_reply(&response_json))
    }
}

/// Pulls `choices[0].message.content` out of a completion payload.
fn extract_reply(response: &Value) -> String {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}
