//! Inbound Slack Events API payloads.

use serde::Deserialize;

/// What the listener does with a verified request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Endpoint handshake; echo the challenge
    UrlVerification { challenge: String },

    /// A reaction was added to a message
    ReactionAdded { ts: String, reaction: String },

    /// Anything else is acknowledged and ignored
    Ignored,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    challenge: Option<String>,
    event: Option<EventBody>,
}

#[derive(Debug, Deserialize)]
struct EventBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    reaction: Option<String>,
    item: Option<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    ts: Option<String>,
}

impl Inbound {
    /// Classify a raw body; only invalid JSON is an error
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(body)?;

        // Valid JSON with an unexpected shape is ignored, not rejected
        let Ok(envelope) = serde_json::from_value::<Envelope>(value) else {
            return Ok(Self::Ignored);
        };

        if envelope.kind.as_deref() == Some("url_verification") {
            return Ok(Self::UrlVerification {
                challenge: envelope.challenge.unwrap_or_default(),
            });
        }

        let reaction = envelope
            .event
            .filter(|event| event.kind.as_deref() == Some("reaction_added"))
            .and_then(|event| {
                let ts = event
                    .item
                    .and_then(|item| item.ts)
                    .filter(|ts| !ts.trim().is_empty())?;
                let reaction = event.reaction.filter(|r| !r.trim().is_empty())?;
                Some(Self::ReactionAdded { ts, reaction })
            });

        Ok(reaction.unwrap_or(Self::Ignored))
    }
}
