//! Slack message layout and sequential posting.
//!
//! `build_message` is pure: for the same candidate, result, index and
//! timestamp it yields the same blocks. `Notifier` owns pacing so posts to
//! the channel are spaced by a fixed delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::{json, Value};
use tracing::debug;

use crate::adapters::{NotificationChannel, ServiceError};
use crate::domain::enrichment::truncate_chars;
use crate::domain::{Candidate, EnrichmentResult, Importance, Theme};

/// Header titles are cut to this many characters (Slack caps headers at 150)
pub const HEADER_TITLE_CHARS: usize = 140;

/// Trailing line of the bundle message
pub const DEFAULT_BUNDLE_PROMPT: &str = "What makes these papers remarkable? Explain each one.";

const STAR: &str = "⭐️";

/// UTC+9, the zone of the footer timestamp
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix())
}

/// A formatted notification ready to post
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub blocks: Vec<Value>,
    /// Plain-text fallback shown by clients that cannot render blocks
    pub text: String,
}

/// Display label for a theme
pub fn theme_label(theme: Theme) -> &'static str {
    match theme {
        Theme::RepresentationLearning => "Representation Learning",
        Theme::Privacy => "Privacy",
        Theme::Unknown => "Unknown (?)",
        Theme::Other => "Other",
    }
}

/// One star per importance point, or the raw marker
pub fn importance_stars(importance: Importance) -> String {
    match importance {
        Importance::Score(score) => STAR.repeat(score as usize),
        Importance::Unknown => importance.to_string(),
    }
}

/// Block Kit layout for one paper
pub fn build_message(
    candidate: &Candidate,
    result: &EnrichmentResult,
    index: usize,
    posted_at: DateTime<FixedOffset>,
) -> NotificationMessage {
    let (title, _) = truncate_chars(&candidate.title, HEADER_TITLE_CHARS);

    let blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("📄 Paper {}: {}", index, title),
                "emoji": true
            }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Category:*\n{}", theme_label(result.theme)) },
                { "type": "mrkdwn", "text": format!("*Importance:*\n{}", importance_stars(result.importance)) },
                { "type": "mrkdwn", "text": format!("*Published:*\n{}", candidate.published_date()) }
            ]
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Summary:*\n{}", result.summary) }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Reason:*\n{}", result.rationale) }
        }),
        json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": { "type": "plain_text", "text": "Read Paper", "emoji": true },
                "url": candidate.url()
            }]
        }),
        json!({ "type": "divider" }),
        json!({
            "type": "context",
            "elements": [{
                "type": "plain_text",
                "text": format!("Posted at: {} (JST)", posted_at.format("%Y-%m-%d %H:%M")),
                "emoji": true
            }]
        }),
    ];

    NotificationMessage {
        blocks,
        text: format!("New Paper: {}", candidate.title),
    }
}

/// Bundle body: one URL per line, then the prompt line
pub fn bundle_text(urls: &[String], prompt: &str) -> String {
    let mut text = urls.join("\n");
    text.push('\n');
    text.push_str(prompt);
    text
}

/// Posts formatted messages with a fixed delay between posts
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
    post_delay: Duration,
    /// Set after the first post of this notifier
    has_posted: AtomicBool,
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>, post_delay: Duration) -> Self {
        Self {
            channel,
            post_delay,
            has_posted: AtomicBool::new(false),
        }
    }

    /// Post one message; returns the channel-issued message identifier
    pub async fn post(
        &self,
        channel_id: &str,
        message: &NotificationMessage,
    ) -> Result<String, ServiceError> {
        self.pace().await;
        let ts = self
            .channel
            .post(channel_id, &message.text, Some(&message.blocks))
            .await?;
        debug!(channel = channel_id, %ts, "Notification posted");
        Ok(ts)
    }

    /// Post the plain-text bundle listing this run's papers
    pub async fn post_bundle(
        &self,
        channel_id: &str,
        urls: &[String],
        prompt: &str,
    ) -> Result<String, ServiceError> {
        self.pace().await;
        self.channel
            .post(channel_id, &bundle_text(urls, prompt), None)
            .await
    }

    async fn pace(&self) {
        if self.has_posted.swap(true, Ordering::SeqCst) && !self.post_delay.is_zero() {
            tokio::time::sleep(self.post_delay).await;
        }
    }
}
