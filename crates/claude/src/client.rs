//! Decision oracle backed by the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use deskpilot_core::{DecisionOracle, DecisionRecord, Error, Observation};

use crate::output::{
    ApiErrorResponse, MessagesRequest, MessagesResponse, RequestBlock, RequestMessage,
};
use crate::prompts::{build_user_prompt, SYSTEM_PROMPT};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connection settings for [`ClaudeClient`].
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ClaudeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Messages API client.
pub struct ClaudeClient {
    client: reqwest::Client,
    config: ClaudeConfig,
}

impl ClaudeClient {
    pub fn new(config: ClaudeConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Decision(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send one request and return the parsed response.
    pub async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, Error> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Decision(format!("HTTP error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|body| format!("{}: {}", body.error.kind, body.error.message))
                .unwrap_or(text);
            return Err(Error::Decision(format!(
                "Anthropic API error: {status} - {detail}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::Decision(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl DecisionOracle for ClaudeClient {
    async fn decide(
        &self,
        goal: &str,
        observation: &Observation,
        history: &[DecisionRecord],
    ) -> Result<String, Error> {
        let prompt = build_user_prompt(goal, history);
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: SYSTEM_PROMPT,
            messages: vec![RequestMessage::user(vec![
                RequestBlock::Text { text: &prompt },
                RequestBlock::image_base64(&observation.media_type, &observation.data),
            ])],
        };

        debug!(
            model = %self.config.model,
            history = history.len(),
            image_bytes = observation.data.len(),
            "Requesting decision"
        );
        let response = self.send(&request).await?;
        info!(
            stop_reason = ?response.stop_reason,
            total_tokens = response.total_tokens(),
            "Model responded"
        );

        if response.content.is_empty() {
            return Err(Error::Decision("empty response from model".into()));
        }
        response
            .text()
            .map(str::to_owned)
            .ok_or_else(|| Error::Decision("no text response from model".into()))
    }
}
