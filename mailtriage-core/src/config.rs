//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/mailtriage/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/mailtriage/` (~/.config/mailtriage/)
//! - Data: `$XDG_DATA_HOME/mailtriage/` (~/.local/share/mailtriage/)
//! - State/Logs: `$XDG_STATE_HOME/mailtriage/` (~/.local/state/mailtriage/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

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
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Mailbox identity and digest delivery
    #[serde(default)]
    pub mail: MailConfig,

    /// Per-cycle limits and toggles
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Waiting-on-reply scan
    #[serde(default)]
    pub followup: FollowupConfig,

    /// Domain set, labels and schema location
    #[serde(default)]
    pub triage: TriageConfig,

    /// Classifier mode and delegated endpoint
    #[serde(default)]
    pub llm: LlmConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Mailbox configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    /// Provider name stored on thread and task rows
    #[serde(default = "default_provider_name")]
    pub provider_name: String,

    /// Mailbox user id for API paths ("me" for the authorized account)
    #[serde(default = "default_mail_user")]
    pub user: String,

    /// My own address; messages whose From contains it count as outbound
    pub my_email: Option<String>,

    /// Digest recipient
    pub digest_to: Option<String>,

    /// Prefix for the digest subject line
    #[serde(default = "default_subject_prefix")]
    pub digest_subject_prefix: String,

    /// Override for the stored bearer token file
    pub credentials_path: Option<PathBuf>,

    /// Newest N messages fetched per thread
    #[serde(default = "default_max_messages")]
    pub max_messages_per_thread: usize,

    /// Override for the provider API base URL
    pub api_base: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider_name: default_provider_name(),
            user: default_mail_user(),
            my_email: None,
            digest_to: None,
            digest_subject_prefix: default_subject_prefix(),
            credentials_path: None,
            max_messages_per_thread: default_max_messages(),
            api_base: None,
        }
    }
}

fn default_provider_name() -> String {
    "gmail".to_string()
}

fn default_mail_user() -> String {
    "me".to_string()
}

fn default_subject_prefix() -> String {
    "MAILTRIAGE DIGEST".to_string()
}

fn default_max_messages() -> usize {
    6
}

/// Cycle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CycleConfig {
    /// How far back to list candidate threads
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Maximum candidate threads per cycle
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Ignore outputs at or above this confidence create no tasks
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Send the digest at the end of each cycle
    #[serde(default = "default_true")]
    pub send_digest: bool,

    /// Minutes between poll iterations (floored at one minute)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            max_threads: default_max_threads(),
            confidence_threshold: default_confidence_threshold(),
            send_digest: true,
            poll_interval_minutes: default_poll_interval(),
        }
    }
}

fn default_lookback_days() -> u32 {
    2
}

fn default_max_threads() -> usize {
    50
}

fn default_confidence_threshold() -> f64 {
    0.55
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    10
}

/// Follow-up scan configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FollowupConfig {
    /// Enable/disable the waiting-on-reply scan
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How far back to look for unanswered outbound mail
    #[serde(default = "default_followup_lookback")]
    pub lookback_days: u32,

    /// Maximum threads scanned per cycle
    #[serde(default = "default_followup_max_threads")]
    pub max_threads: usize,

    /// Days without a reply before a thread is considered stale
    #[serde(default = "default_stale_days")]
    pub stale_days: i64,

    /// Bucket assigned to stale threads
    #[serde(default = "default_followup_bucket")]
    pub bucket: String,

    /// Priority for follow-up tasks
    #[serde(default = "default_followup_priority")]
    pub priority: String,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback_days: default_followup_lookback(),
            max_threads: default_followup_max_threads(),
            stale_days: default_stale_days(),
            bucket: default_followup_bucket(),
            priority: default_followup_priority(),
        }
    }
}

fn default_followup_lookback() -> u32 {
    90
}

fn default_followup_max_threads() -> usize {
    300
}

fn default_stale_days() -> i64 {
    14
}

fn default_followup_bucket() -> String {
    "followup".to_string()
}

fn default_followup_priority() -> String {
    "normal".to_string()
}

/// Triage domain configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TriageConfig {
    /// Configured domains, in digest order
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,

    /// Bucket for tasks whose thread domain is not configured
    #[serde(default = "default_domain")]
    pub default_domain: String,

    /// Override for the base schema file
    pub schema_path: Option<PathBuf>,

    /// Per-bucket display labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            domains: default_domains(),
            default_domain: default_domain(),
            schema_path: None,
            labels: HashMap::new(),
        }
    }
}

fn default_domains() -> Vec<String> {
    ["expiry", "audit", "followup", "payment", "other"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_domain() -> String {
    "other".to_string()
}

/// How threads are classified
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    /// Deterministic keyword rules, no network
    #[default]
    Simulate,
    /// OpenAI-compatible completion endpoint
    Delegated,
}

impl LlmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmMode::Simulate => "simulate",
            LlmMode::Delegated => "delegated",
        }
    }
}

/// Completion provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Classifier mode
    #[serde(default)]
    pub mode: LlmMode,
    /// API base URL, e.g. `https://api.openai.com/v1`
    pub base_url: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: LlmMode::default(),
            base_url: None,
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// API key from config, falling back to `LLM_API_KEY`
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("LLM_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Model identifier recorded on triage runs
    pub fn run_model_name(&self) -> String {
        match self.mode {
            LlmMode::Simulate => "simulate".to_string(),
            LlmMode::Delegated => self.model.clone(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
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
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Check the settings a live cycle cannot run without.
    pub fn validate_for_cycle(&self) -> Result<()> {
        let my_email = self.mail.my_email.as_deref().unwrap_or("").trim();
        if my_email.is_empty() {
            return Err(Error::Config("mail.my_email is required".to_string()));
        }
        if self.cycle.send_digest
            && self.mail.digest_to.as_deref().unwrap_or("").trim().is_empty()
        {
            return Err(Error::Config(
                "mail.digest_to is required when cycle.send_digest is enabled".to_string(),
            ));
        }
        self.validate_llm()
    }

    /// Check the delegated-mode settings.
    pub fn validate_llm(&self) -> Result<()> {
        if self.llm.mode != LlmMode::Delegated {
            return Ok(());
        }
        if self.llm.base_url.as_deref().unwrap_or("").trim().is_empty() {
            return Err(Error::Config(
                "llm.base_url is required when llm.mode = \"delegated\"".to_string(),
            ));
        }
        if self.llm.resolved_api_key().is_none() {
            return Err(Error::Config(
                "llm.api_key (or LLM_API_KEY) is required when llm.mode = \"delegated\""
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Base schema file: `triage.schema_path` or `<config dir>/schema.json`
    pub fn schema_path(&self) -> PathBuf {
        self.triage
            .schema_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("schema.json"))
    }

    /// Bearer token file: `mail.credentials_path` or `<config dir>/credentials.json`
    pub fn credentials_path(&self) -> PathBuf {
        self.mail
            .credentials_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("credentials.json"))
    }

    /// Returns the config directory path
    ///
    /// `$XDG_CONFIG_HOME/mailtriage/` (~/.config/mailtriage/)
    pub fn config_dir() -> PathBuf {
        xdg_config_home().join("mailtriage")
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/mailtriage/config.toml` (~/.config/mailtriage/config.toml)
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/mailtriage/` (~/.local/share/mailtriage/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("mailtriage")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/mailtriage/` (~/.local/state/mailtriage/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("mailtriage")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/mailtriage/state.db` (~/.local/share/mailtriage/state.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("state.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/mailtriage/mailtriage.log` (~/.local/state/mailtriage/mailtriage.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("mailtriage.log")
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

/// Starter config written by `mailtriage init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# mailtriage configuration

[mail]
provider_name = "gmail"
user = "me"
# my_email = "me@example.com"
# digest_to = "me@example.com"
digest_subject_prefix = "MAILTRIAGE DIGEST"
max_messages_per_thread = 6

[cycle]
lookback_days = 2
max_threads = 50
confidence_threshold = 0.55
send_digest = true
poll_interval_minutes = 10

[followup]
enabled = true
lookback_days = 90
max_threads = 300
stale_days = 14
bucket = "followup"
priority = "normal"

[triage]
domains = ["expiry", "audit", "followup", "payment", "other"]
default_domain = "other"

[llm]
mode = "simulate"
# base_url = "https://api.openai.com/v1"
model = "gpt-4.1-mini"

[logging]
level = "info"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.mode, LlmMode::Simulate);
        assert_eq!(config.cycle.lookback_days, 2);
        assert_eq!(config.cycle.max_threads, 50);
        assert!(config.cycle.send_digest);
        assert_eq!(config.followup.stale_days, 14);
        assert_eq!(config.triage.default_domain, "other");
        assert_eq!(config.mail.max_messages_per_thread, 6);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[mail]
my_email = "me@x.com"
digest_to = "me@x.com"

[cycle]
lookback_days = 5
confidence_threshold = 0.8

[triage]
domains = ["payment", "legal"]
default_domain = "misc"

[triage.labels]
legal = "Legal Matters"

[llm]
mode = "delegated"
base_url = "https://llm.example.com/v1"
api_key = "sk-test"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.mail.my_email.as_deref(), Some("me@x.com"));
        assert_eq!(config.cycle.lookback_days, 5);
        assert_eq!(config.cycle.max_threads, 50);
        assert_eq!(config.triage.domains, vec!["payment", "legal"]);
        assert_eq!(
            config.triage.labels.get("legal").map(String::as_str),
            Some("Legal Matters")
        );
        assert_eq!(config.llm.mode, LlmMode::Delegated);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate_for_cycle().is_ok());
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config.triage.domains.len(), 5);
        assert_eq!(config.llm.mode, LlmMode::Simulate);
    }

    #[test]
    fn test_cycle_validation_requires_identity() {
        let config = Config::default();
        assert!(matches!(config.validate_for_cycle(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.mail.my_email = Some("me@x.com".to_string());
        config.cycle.send_digest = false;
        assert!(config.validate_for_cycle().is_ok());

        config.cycle.send_digest = true;
        assert!(config.validate_for_cycle().is_err());
    }

    #[test]
    fn test_delegated_mode_requires_endpoint() {
        let mut config = Config::default();
        config.llm.mode = LlmMode::Delegated;
        config.llm.api_key = Some("sk-test".to_string());
        assert!(config.validate_llm().is_err());

        config.llm.base_url = Some("https://llm.example.com/v1".to_string());
        assert!(config.validate_llm().is_ok());
        assert_eq!(config.llm.run_model_name(), "gpt-4.1-mini");
    }
}
