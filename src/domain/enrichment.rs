//! AI enrichment results and their wire schema.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker rendered wherever a value is unknown (importance or theme).
pub const UNKNOWN_MARKER: &str = "?";

/// Length of the abstract excerpt used as a fallback summary
pub const FALLBACK_SUMMARY_CHARS: usize = 500;

/// Importance score assigned by the AI service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    /// A validated score in 1..=5
    Score(u8),

    /// The explicit "unknown" marker
    Unknown,
}

impl Importance {
    /// Validate a raw score; anything outside 1..=5 is rejected
    pub fn from_score(score: i64) -> Option<Self> {
        (1..=5)
            .contains(&score)
            .then(|| Self::Score(score as u8))
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Score(score) => write!(f, "{}", score),
            Self::Unknown => f.write_str(UNKNOWN_MARKER),
        }
    }
}

/// Theme category of a paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    /// theme_id 1
    RepresentationLearning,

    /// theme_id 3
    Privacy,

    /// theme_id 0
    Other,

    /// Produced only by the fallback path
    Unknown,
}

impl Theme {
    /// Map a wire theme_id; only 0, 1 and 3 are valid
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::RepresentationLearning),
            3 => Some(Self::Privacy),
            0 => Some(Self::Other),
            _ => None,
        }
    }

    /// Value stored in the ledger's theme column
    pub fn ledger_value(&self) -> String {
        match self {
            Self::RepresentationLearning => "1".to_string(),
            Self::Privacy => "3".to_string(),
            Self::Other => "0".to_string(),
            Self::Unknown => UNKNOWN_MARKER.to_string(),
        }
    }
}

/// Why the deterministic fallback was used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retries exhausted or the service rejected the request
    ProcessingFailed,

    /// The response did not match the expected schema
    MalformedResponse,

    /// No AI credential configured
    MissingApiKey,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProcessingFailed => "LLM Processing Failed",
            Self::MalformedResponse => "Malformed Response",
            Self::MissingApiKey => "Missing API Key",
        })
    }
}

/// AI-derived summary/importance/theme/rationale for a candidate.
///
/// Produced once per candidate per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub importance: Importance,
    pub theme: Theme,
    pub summary: String,
    pub rationale: String,
}

impl EnrichmentResult {
    /// Deterministic substitute used when the AI call fails.
    ///
    /// Same abstract and same failure class always give the same result.
    pub fn fallback(abstract_text: &str, class: FailureClass) -> Self {
        let (excerpt, truncated) = truncate_chars(abstract_text, FALLBACK_SUMMARY_CHARS);
        let summary = if truncated {
            format!("{}...", excerpt)
        } else {
            excerpt.to_string()
        };

        Self {
            importance: Importance::Unknown,
            theme: Theme::Unknown,
            summary,
            rationale: format!("System Error: {}. Showing raw abstract.", class),
        }
    }

    /// Whether this result came from the fallback path
    pub fn is_fallback(&self) -> bool {
        self.importance == Importance::Unknown && self.theme == Theme::Unknown
    }
}

/// Wire schema of the AI service's JSON object.
///
/// Every field is required; serde rejects objects missing any of them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentPayload {
    pub summary: String,
    pub importance: i64,
    pub theme_id: i64,
    pub reason: String,
}

impl EnrichmentPayload {
    /// Parse and validate a raw JSON object into a result
    pub fn parse(raw: &str) -> Result<EnrichmentResult, String> {
        let payload: EnrichmentPayload =
            serde_json::from_str(raw.trim()).map_err(|e| format!("invalid payload: {}", e))?;
        payload.validate()
    }

    /// Check value ranges and convert
    pub fn validate(self) -> Result<EnrichmentResult, String> {
        let importance = Importance::from_score(self.importance)
            .ok_or_else(|| format!("importance out of range: {}", self.importance))?;
        let theme = Theme::from_id(self.theme_id)
            .ok_or_else(|| format!("unknown theme_id: {}", self.theme_id))?;

        Ok(EnrichmentResult {
            importance,
            theme,
            summary: self.summary,
            rationale: self.reason,
        })
    }
}

/// Truncate to at most `max` characters without splitting a code point.
///
/// Returns the prefix and whether anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}
