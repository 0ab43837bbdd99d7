//! Configuration for paperfeed.
//!
//! Every setting is layered: built-in default, then the YAML file, then the
//! environment. Credentials are read from the environment and nowhere else.
//!
//! Without `--config`, the nearest `.paperfeed/config.yaml` walking up from
//! the working directory is used. A relative `paths.home` is taken relative
//! to that `.paperfeed/` directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::core::enricher::EnrichmentSettings;
use crate::core::notifier::DEFAULT_BUNDLE_PROMPT;
use crate::core::retry::RetryPolicy;

/// Default arXiv search: ML methods applied to networks, mobility and spatial data
pub const DEFAULT_QUERY: &str = r#"("Deep Learning" OR "Machine Learning" OR "Neural Network" OR "Graph Neural Network" OR "GNN" OR "Transformer" OR "Representation Learning") AND ("Network Traffic" OR "Traffic Prediction" OR "Mobile Network" OR "5G" OR "6G" OR "Geospatial" OR "Spatiotemporal" OR "Urban Computing" OR "Human Mobility" OR "Spatial Trajectory" OR "Smart City" OR "Crowd Flow" OR "Intelligent Transportation" OR "SIGSPATIAL" OR "KDD" OR "Ubicomp" OR "PerCom" OR "RecSys" OR "WWW conference" OR "TheWebConf" OR "ICDM")"#;

pub const DEFAULT_MAX_RESULTS: usize = 100;
pub const DEFAULT_NUM_PAPERS: usize = 3;
pub const DEFAULT_SLACK_CHANNEL: &str = "#general";
pub const DEFAULT_BUNDLE_CHANNEL: &str = "#all-arxiv-paper-notification";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

const CONFIG_DIR: &str = ".paperfeed";

// Environment variables
pub const ENV_HOME: &str = "PAPERFEED_HOME";
pub const ENV_SLACK_TOKEN: &str = "SLACK_API_TOKEN";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";
pub const ENV_SPREADSHEET_ID: &str = "SPREADSHEET_ID";
pub const ENV_SERVICE_ACCOUNT: &str = "GOOGLE_SERVICE_ACCOUNT_JSON";
pub const ENV_SIGNING_SECRET: &str = "SLACK_SIGNING_SECRET";
pub const ENV_SLACK_CHANNEL: &str = "SLACK_CHANNEL";
pub const ENV_BUNDLE_CHANNEL: &str = "SLACK_PROMPT_CHANNEL";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_LISTEN_ADDR: &str = "PAPERFEED_LISTEN_ADDR";

/// Missing or invalid configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("missing required secret: {0}")]
    MissingSecret(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// On-disk YAML layout. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub enrichment: Option<EnrichmentSettings>,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    /// Fixed RNG seed for candidate selection
    #[serde(default)]
    pub selection_seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .paperfeed/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConfig {
    pub query: Option<String>,
    pub max_results: Option<usize>,
    pub num_papers: Option<usize>,
    pub page_size: Option<usize>,
    pub page_delay_secs: Option<u64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackConfig {
    pub channel: Option<String>,
    pub bundle_channel: Option<String>,
    pub bundle_prompt: Option<String>,
    pub post_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetsConfig {
    /// Numeric tab id used for row insertion
    pub sheet_id: Option<i64>,
    /// Tab name prefixed to A1 ranges
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenerConfig {
    pub address: Option<String>,
}

/// Credentials read from the environment
#[derive(Clone, Default)]
pub struct Secrets {
    pub slack_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub service_account_json: Option<String>,
    pub signing_secret: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |s: &Option<String>| if s.is_some() { "set" } else { "unset" };
        f.debug_struct("Secrets")
            .field("slack_token", &state(&self.slack_token))
            .field("openai_api_key", &state(&self.openai_api_key))
            .field("spreadsheet_id", &state(&self.spreadsheet_id))
            .field("service_account_json", &state(&self.service_account_json))
            .field("signing_secret", &state(&self.signing_secret))
            .finish()
    }
}

impl Secrets {
    fn from_lookup(env: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            slack_token: env(ENV_SLACK_TOKEN),
            openai_api_key: env(ENV_OPENAI_KEY),
            spreadsheet_id: env(ENV_SPREADSHEET_ID),
            service_account_json: env(ENV_SERVICE_ACCOUNT),
            signing_secret: env(ENV_SIGNING_SECRET),
        }
    }
}

/// arXiv pacing and retry
#[derive(Debug, Clone, PartialEq)]
pub struct ArxivSettings {
    pub page_size: usize,
    pub page_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for ArxivSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            page_delay: Duration::from_secs(3),
            retry: RetryPolicy::exponential(5, Duration::from_secs(3)),
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// State directory (journals, run lock)
    pub home: PathBuf,
    /// Path to config file (if one was used)
    pub config_file: Option<PathBuf>,
    pub query: String,
    pub max_results: usize,
    pub num_papers: usize,
    pub slack_channel: String,
    pub bundle_channel: Option<String>,
    pub bundle_prompt: String,
    pub post_delay: Duration,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub enrichment: EnrichmentSettings,
    pub arxiv: ArxivSettings,
    pub sheet_id: i64,
    pub sheet_name: Option<String>,
    pub listen_addr: String,
    pub selection_seed: Option<u64>,
    pub secrets: Secrets,
}

impl Settings {
    /// Load from the process environment and the given or discovered file
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };

        let file = match &config_file {
            Some(path) => Some((path.clone(), load_config_file(path)?)),
            None => None,
        };

        // Without a home directory, fall back to the working directory.
        let default_home = dirs::home_dir().unwrap_or_default().join(CONFIG_DIR);

        Self::resolve(file, default_home, &|key| std::env::var(key).ok())
    }

    /// Merge a parsed file, defaults and an environment lookup.
    ///
    /// Blank env values count as unset, except `SLACK_PROMPT_CHANNEL` where
    /// a blank value disables the bundle.
    pub fn resolve(
        file: Option<(PathBuf, ConfigFile)>,
        default_home: PathBuf,
        raw_env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| raw_env(key).filter(|v| !v.trim().is_empty());
        let (config_file, config) = match file {
            Some((path, config)) => (Some(path), config),
            None => (None, ConfigFile::default()),
        };

        let home = if let Some(env_home) = env(ENV_HOME) {
            PathBuf::from(env_home)
        } else if let (Some(home_path), Some(path)) = (&config.paths.home, &config_file) {
            let config_dir = path.parent().unwrap_or(Path::new("."));
            resolve_path(config_dir, home_path)
        } else {
            default_home
        };

        let defaults = ArxivSettings::default();
        let search = &config.search;
        let arxiv = ArxivSettings {
            page_size: search.page_size.unwrap_or(defaults.page_size),
            page_delay: search
                .page_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.page_delay),
            retry: match search.max_attempts {
                Some(attempts) => RetryPolicy {
                    max_attempts: attempts,
                    ..defaults.retry
                },
                None => defaults.retry,
            },
        };

        let settings = Self {
            home,
            config_file,
            query: config.search.query.clone().unwrap_or_else(|| DEFAULT_QUERY.to_string()),
            max_results: config.search.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            num_papers: config.search.num_papers.unwrap_or(DEFAULT_NUM_PAPERS),
            slack_channel: env(ENV_SLACK_CHANNEL)
                .or(config.slack.channel.clone())
                .unwrap_or_else(|| DEFAULT_SLACK_CHANNEL.to_string()),
            bundle_channel: raw_env(ENV_BUNDLE_CHANNEL)
                .or(config.slack.bundle_channel.clone())
                .or_else(|| Some(DEFAULT_BUNDLE_CHANNEL.to_string()))
                // An empty value disables the bundle
                .filter(|c| !c.trim().is_empty()),
            bundle_prompt: config
                .slack
                .bundle_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_BUNDLE_PROMPT.to_string()),
            post_delay: Duration::from_secs(config.slack.post_delay_secs.unwrap_or(2)),
            openai_model: env(ENV_OPENAI_MODEL)
                .or(config.openai.model.clone())
                .unwrap_or_else(|| crate::adapters::openai::DEFAULT_MODEL.to_string()),
            openai_base_url: config.openai.base_url.clone(),
            enrichment: config.enrichment.clone().unwrap_or_default(),
            arxiv,
            sheet_id: config.sheets.sheet_id.unwrap_or(0),
            sheet_name: config.sheets.sheet_name.clone(),
            listen_addr: env(ENV_LISTEN_ADDR)
                .or(config.listener.address.clone())
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            selection_seed: config.selection_seed,
            secrets: Secrets::from_lookup(&env),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |key: &str, message: &str| ConfigurationError::Invalid {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.query.trim().is_empty() {
            return Err(invalid("search.query", "must not be empty"));
        }
        if self.arxiv.retry.max_attempts == 0 {
            return Err(invalid("search.max_attempts", "must be at least 1"));
        }
        if self.enrichment.retry.max_attempts == 0 {
            return Err(invalid("enrichment.retry.max_attempts", "must be at least 1"));
        }
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid("listener.address", "not a socket address"));
        }
        Ok(())
    }

    /// Run journals ($PAPERFEED_HOME/runs)
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }

    /// Run lock file ($PAPERFEED_HOME/run.lock)
    pub fn lock_path(&self) -> PathBuf {
        self.home.join("run.lock")
    }

    pub fn require_slack_token(&self) -> Result<&str, ConfigurationError> {
        self.secrets
            .slack_token
            .as_deref()
            .ok_or(ConfigurationError::MissingSecret(ENV_SLACK_TOKEN))
    }

    pub fn require_signing_secret(&self) -> Result<&str, ConfigurationError> {
        self.secrets
            .signing_secret
            .as_deref()
            .ok_or(ConfigurationError::MissingSecret(ENV_SIGNING_SECRET))
    }

    /// Spreadsheet id and service-account JSON, when both are set
    pub fn sheets_credentials(&self) -> Option<(&str, &str)> {
        Some((
            self.secrets.spreadsheet_id.as_deref()?,
            self.secrets.service_account_json.as_deref()?,
        ))
    }

    /// Like `sheets_credentials` but names the first missing secret
    pub fn require_sheets_credentials(&self) -> Result<(&str, &str), ConfigurationError> {
        let id = self
            .secrets
            .spreadsheet_id
            .as_deref()
            .ok_or(ConfigurationError::MissingSecret(ENV_SPREADSHEET_ID))?;
        let key = self
            .secrets
            .service_account_json
            .as_deref()
            .ok_or(ConfigurationError::MissingSecret(ENV_SERVICE_ACCOUNT))?;
        Ok((id, key))
    }
}

/// Nearest `.paperfeed/config.yaml` from the working directory upward
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(CONFIG_DIR).join("config.yaml"))
        .find(|candidate| candidate.is_file())
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;

    serde_yaml::from_str(&raw).with_context(|| format!("Invalid YAML in {}", path.display()))
}

/// Anchor a relative `paths.home` at `base`; absolute paths pass through
fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    match Path::new(raw) {
        p if p.is_absolute() => p.to_path_buf(),
        p => base.join(p),
    }
}
