//! Slack Web API adapter for posting paper notifications.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{NotificationChannel, ServiceError};

const SLACK_API_URL: &str = "https://slack.com/api";

/// Slack Web API client
pub struct SlackClient {
    /// Bot token
    bot_token: String,
    /// API root
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response from chat.postMessage
#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

impl SlackClient {
    /// Create a new Slack client
    pub fn new(bot_token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            bot_token: bot_token.into(),
            base_url: SLACK_API_URL.to_string(),
            client,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }
}

#[async_trait]
impl NotificationChannel for SlackClient {
    async fn post(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&[serde_json::Value]>,
    ) -> Result<String, ServiceError> {
        let mut body = serde_json::json!({
            "channel": channel,
            "text": text,
        });
        if let Some(blocks) = blocks {
            body["blocks"] = serde_json::Value::Array(blocks.to_vec());
        }

        debug!(channel, "Slack chat.postMessage");

        let response = self
            .client
            .post(self.api_url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status("Slack", status, &text));
        }

        let result: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(format!("Failed to parse Slack response: {}", e)))?;

        interpret_post_response(result)
    }
}

fn interpret_post_response(result: PostMessageResponse) -> Result<String, ServiceError> {
    if !result.ok {
        let error = result.error.unwrap_or_default();
        // Slack reports rate limiting in-band as well as via HTTP 429
        if error == "ratelimited" {
            return Err(ServiceError::Transient(format!("Slack API error: {}", error)));
        }
        return Err(ServiceError::Rejected(format!("Slack API error: {}", error)));
    }

    result
        .ts
        .ok_or_else(|| ServiceError::Malformed("Slack response missing ts".to_string()))
}
