//! Configuration file handling.
//!
//! Settings are layered: built-in defaults, then `.cadence.toml`, then
//! environment variables, then command-line flags.

use crate::cli::{Args, Command};
use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".cadence.toml";

/// Tokens kept free for the instructions wrapped around the notes.
pub const PROMPT_OVERHEAD_TOKENS: usize = 1024;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Google Calendar / Drive settings.
    #[serde(default)]
    pub google: GoogleConfig,

    /// Summarization model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Theme analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Main participant of the calendar entries to look at.
    #[serde(default)]
    pub email: Option<String>,

    /// Number of batches analyzed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            email: None,
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Google API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client secrets file downloaded from the Google console.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    /// Calendar to read events from.
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// Events fetched per API page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// OAuth scopes requested during consent.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Pre-issued access token; skips the OAuth flow entirely.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            calendar_id: default_calendar_id(),
            page_size: default_page_size(),
            scopes: default_scopes(),
            access_token: None,
        }
    }
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/calendar.readonly",
        "https://www.googleapis.com/auth/drive.readonly",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Summarization model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Gemini model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// API key. Prefer the GEMINI_API_KEY environment variable.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Generative Language API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Model context window in tokens.
    #[serde(default = "default_context_window")]
    pub context_window_tokens: usize,

    /// Tokens reserved for the response when sizing batches.
    #[serde(default = "default_response_reserve")]
    pub response_reserve_tokens: usize,

    /// Maximum tokens requested per response.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            api_key: None,
            api_base: default_api_base(),
            temperature: default_temperature(),
            context_window_tokens: default_context_window(),
            response_reserve_tokens: default_response_reserve(),
            max_output_tokens: default_max_output_tokens(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_context_window() -> usize {
    32_768
}

fn default_response_reserve() -> usize {
    4_096
}

fn default_max_output_tokens() -> u32 {
    2_048
}

fn default_timeout() -> u64 {
    120
}

/// Theme analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Explicit batch budget; derived from the model settings when unset.
    #[serde(default)]
    pub max_tokens_per_batch: Option<usize>,

    /// Deadline for the whole analysis run in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// How many days of notes to include.
    #[serde(default = "default_days")]
    pub days: u32,

    /// Optional file describing the user, included in the prompt.
    #[serde(default)]
    pub profile_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_batch: None,
            run_timeout_seconds: default_run_timeout(),
            days: default_days(),
            profile_path: None,
        }
    }
}

fn default_run_timeout() -> u64 {
    600
}

fn default_days() -> u32 {
    30
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(email) = get("EMAIL") {
            self.general.email = Some(email);
        }
        if let Some(path) = get("GOOGLE_CREDS_PATH") {
            self.google.credentials_path = Some(PathBuf::from(path));
        }
        if let Some(token) = get("GOOGLE_ACCESS_TOKEN") {
            self.google.access_token = Some(token);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.model.name = model;
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file and environment values.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Command::AnalyzeThemes(ref analyze) = args.command {
            if let Some(ref model) = analyze.model {
                self.model.name = model.clone();
            }
            if let Some(days) = analyze.days {
                self.analysis.days = days;
            }
            if let Some(budget) = analyze.max_batch_tokens {
                self.analysis.max_tokens_per_batch = Some(budget);
            }
            if let Some(concurrency) = analyze.concurrency {
                self.general.concurrency = concurrency;
            }
            if let Some(timeout) = analyze.timeout {
                self.analysis.run_timeout_seconds = timeout;
            }
            if let Some(ref profile) = analyze.profile {
                self.analysis.profile_path = Some(profile.clone());
            }
        }

        if let Command::Ask(ref ask) = args.command {
            if let Some(ref model) = ask.model {
                self.model.name = model.clone();
            }
            if let Some(days) = ask.days {
                self.analysis.days = days;
            }
            if let Some(budget) = ask.max_batch_tokens {
                self.analysis.max_tokens_per_batch = Some(budget);
            }
            if let Some(ref profile) = ask.profile {
                self.analysis.profile_path = Some(profile.clone());
            }
        }
    }

    /// Path of the cached OAuth token, next to the client secrets.
    pub fn token_path(&self) -> Option<PathBuf> {
        self.google.credentials_path.as_ref().map(|path| {
            let mut name = path.as_os_str().to_owned();
            name.push(".token.json");
            PathBuf::from(name)
        })
    }

    /// Batch budget: explicit override, or context window minus the
    /// response reserve and prompt overhead.
    pub fn max_tokens_per_batch(&self) -> Result<usize, ConfigError> {
        let budget = match self.analysis.max_tokens_per_batch {
            Some(budget) => budget,
            None => self
                .model
                .context_window_tokens
                .saturating_sub(self.model.response_reserve_tokens)
                .saturating_sub(PROMPT_OVERHEAD_TOKENS),
        };

        if budget == 0 {
            return Err(ConfigError::Invalid(
                "batch token budget must be at least 1; raise [model].context_window_tokens \
                 or set [analysis].max_tokens_per_batch"
                    .to_string(),
            ));
        }
        Ok(budget)
    }

    /// Check everything the Google commands need.
    pub fn validate_google(&self) -> Result<(), ConfigError> {
        if self.general.email.is_none() {
            return Err(ConfigError::MissingEmail);
        }
        if self.google.page_size == 0 {
            return Err(ConfigError::Invalid("[google].page_size must be at least 1".into()));
        }

        // A pre-issued token makes the client secrets unnecessary.
        if self.google.access_token.is_some() {
            return Ok(());
        }

        let path = self
            .google
            .credentials_path
            .as_ref()
            .ok_or(ConfigError::MissingCredentialsPath)?;
        if !path.exists() {
            return Err(ConfigError::CredentialsNotFound(path.clone()));
        }
        Ok(())
    }

    /// Check everything the summarization model needs.
    pub fn validate_model(&self) -> Result<(), ConfigError> {
        if self.model.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        if !self.model.api_base.starts_with("http://") && !self.model.api_base.starts_with("https://")
        {
            return Err(ConfigError::Invalid(
                "[model].api_base must start with 'http://' or 'https://'".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid(
                "[model].temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.general.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        self.max_tokens_per_batch()?;
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
