//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/weeknotes/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/weeknotes/` (~/.config/weeknotes/)
//! - Data: `$XDG_DATA_HOME/weeknotes/` (~/.local/share/weeknotes/)
//! - State/Logs: `$XDG_STATE_HOME/weeknotes/` (~/.local/state/weeknotes/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Note vault location and discovery patterns
    #[serde(default)]
    pub vault: VaultConfig,

    /// Bounds on text sent to the LLM
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// LLM configuration (optional, offline heuristics are used without it)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Report generation
    #[serde(default)]
    pub report: ReportConfig,

    /// Issue tracker publishing
    #[serde(default)]
    pub publish: PublishConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Note vault configuration
#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    /// Vault root (can be overridden on the command line)
    pub path: Option<PathBuf>,

    /// Glob patterns relative to the vault root
    #[serde(default = "default_vault_patterns")]
    pub patterns: Vec<String>,

    /// Skip files under dot-directories (.git, .obsidian, .trash)
    #[serde(default = "default_true")]
    pub ignore_hidden: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: None,
            patterns: default_vault_patterns(),
            ignore_hidden: true,
        }
    }
}

fn default_vault_patterns() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

fn default_true() -> bool {
    true
}

/// Limits that keep every single LLM call bounded
#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    /// Maximum characters of document text per summarize call
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Maximum levels of chunk-summary reduction before hard truncation
    #[serde(default = "default_max_reduce_depth")]
    pub max_reduce_depth: usize,

    /// Maximum characters of summaries per topic clustering call
    #[serde(default = "default_max_batch_chars")]
    pub max_batch_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            max_reduce_depth: default_max_reduce_depth(),
            max_batch_chars: default_max_batch_chars(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    12_000
}

fn default_max_reduce_depth() -> usize {
    4
}

fn default_max_batch_chars() -> usize {
    24_000
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_timeout() -> u64 {
    120
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

/// Report generation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    /// Where report artifacts are written (defaults to the data dir)
    pub output_dir: Option<PathBuf>,

    /// Length of the trailing report period in days
    #[serde(default = "default_period_days")]
    pub period_days: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            period_days: default_period_days(),
        }
    }
}

fn default_period_days() -> u32 {
    7
}

/// Supported issue trackers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackerProvider {
    #[default]
    Linear,
}

/// Issue tracker configuration
///
/// Publishing stays disabled until an API key is available, either here or
/// through `LINEAR_API_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    #[serde(default)]
    pub provider: TrackerProvider,

    /// API key (falls back to `LINEAR_API_KEY`)
    pub api_key: Option<String>,

    /// Team to file issues under (first visible team when unset)
    pub team_id: Option<String>,

    /// GraphQL endpoint override
    pub endpoint: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_publish_max_retries")]
    pub max_retries: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            provider: TrackerProvider::default(),
            api_key: None,
            team_id: None,
            endpoint: None,
            timeout_secs: default_publish_timeout(),
            max_retries: default_publish_max_retries(),
        }
    }
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_publish_max_retries() -> usize {
    3
}

impl PublishConfig {
    /// API key from config, then environment
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| match self.provider {
            TrackerProvider::Linear => std::env::var("LINEAR_API_KEY").ok(),
        })
    }

    /// Check if publishing has the credentials it needs
    pub fn is_ready(&self) -> bool {
        self.resolved_api_key().is_some()
    }

    /// GraphQL endpoint for the configured tracker
    pub fn endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| match self.provider {
            TrackerProvider::Linear => "https://api.linear.app/graphql".to_string(),
        })
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.vault.patterns.is_empty() {
            return Err(Error::Config(
                "vault.patterns must contain at least one glob".to_string(),
            ));
        }
        if self.summarizer.max_chunk_chars < 256 {
            return Err(Error::Config(
                "summarizer.max_chunk_chars must be at least 256".to_string(),
            ));
        }
        if self.summarizer.max_batch_chars < self.summarizer.max_chunk_chars / 4 {
            return Err(Error::Config(
                "summarizer.max_batch_chars is too small for max_chunk_chars".to_string(),
            ));
        }
        if self.report.period_days == 0 {
            return Err(Error::Config(
                "report.period_days must be at least 1".to_string(),
            ));
        }
        if let Some(llm) = &self.llm {
            if llm.model.trim().is_empty() {
                return Err(Error::Config("llm.model must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Directory report artifacts are written to
    pub fn report_dir(&self) -> PathBuf {
        self.report
            .output_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("reports"))
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/weeknotes/config.toml` (~/.config/weeknotes/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("weeknotes").join("config.toml")
    }

    /// Returns the data directory path (summary log, run state, reports)
    ///
    /// `$XDG_DATA_HOME/weeknotes/` (~/.local/share/weeknotes/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("weeknotes")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/weeknotes/` (~/.local/state/weeknotes/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("weeknotes")
    }

    /// Returns the summary log path
    ///
    /// `$XDG_DATA_HOME/weeknotes/summaries.jsonl`
    pub fn summary_log_path() -> PathBuf {
        Self::data_dir().join("summaries.jsonl")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/weeknotes/weeknotes.log` (~/.local/state/weeknotes/weeknotes.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("weeknotes.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
