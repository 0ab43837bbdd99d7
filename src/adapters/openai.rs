//! OpenAI chat-completions adapter for paper enrichment.
//!
//! Asks the model for a single JSON object (`response_format: json_object`)
//! and hands the raw content back; schema validation happens in the enricher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EnrichmentService, ServiceError};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

const SYSTEM_PROMPT: &str = "You are a helpful research assistant.";

/// OpenAI client
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_URL.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap, ServiceError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| ServiceError::Rejected(format!("Invalid API key header: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

/// Prompt asking for the four required fields
pub fn build_prompt(title: &str, abstract_text: &str) -> String {
    format!(
        r#"You are an expert in spatial statistics and privacy. Analyze the paper below and answer with a single JSON object.
Title: {title}
Abstract: {abstract_text}

## Fields
- importance: integer 1-5 (5 is highest)
- theme_id: 1 (representation learning), 3 (privacy preservation) or 0 (other)
- summary: the paper's key points for practitioners, in three lines
- reason: the mathematical and practical reasoning behind the score and theme

Output JSON format example:
{{
    "summary": "...",
    "importance": 5,
    "theme_id": 1,
    "reason": "..."
}}"#
    )
}

#[async_trait]
impl EnrichmentService for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn summarize(&self, title: &str, abstract_text: &str) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                WireMessage {
                    role: "user",
                    content: build_prompt(title, abstract_text),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        debug!(model = %self.model, "OpenAI chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status("OpenAI", status, &error_text));
        }

        let body = response.text().await?;
        let chat: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::Malformed(format!("Unexpected OpenAI response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::Malformed("No content in OpenAI response".to_string()))
    }
}
