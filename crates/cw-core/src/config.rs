use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Env var that overrides `agent.gateway_url`.
pub const GATEWAY_ENV: &str = "CHOREWRIGHT_GATEWAY";
/// Env var that overrides `agent.canister_id`.
pub const CANISTER_ENV: &str = "CHOREWRIGHT_CANISTER";

/// Top-level configuration loaded from `~/.chorewright/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
}

impl Config {
    /// Load config from the default path, falling back to defaults when the
    /// file does not exist. Environment overrides are applied last.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            Self::read(&path)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific path. The file must exist.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let mut cfg = Self::read(&path)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn read(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.agent.validate()?;
        self.refresh.validate()?;
        self.verify.validate()?;
        Ok(())
    }

    /// `CHOREWRIGHT_GATEWAY` and `CHOREWRIGHT_CANISTER` win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_non_empty(GATEWAY_ENV) {
            self.agent.gateway_url = url;
        }
        if let Some(canister) = env_non_empty(CANISTER_ENV) {
            self.agent.canister_id = Some(canister);
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chorewright")
            .join("config.toml")
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "general.log_level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Chore-owning canister. Required for any remote command.
    #[serde(default)]
    pub canister_id: Option<String>,
    /// Unset means the transport's own default.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            canister_id: None,
            request_timeout_secs: None,
        }
    }
}

impl AgentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.gateway_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "agent.gateway_url '{}' must start with http:// or https://",
                self.gateway_url
            )));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "agent.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:4943".into()
}

/// Poll delays for the refresh loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Delay while any chore is executing.
    #[serde(default = "default_active_poll_ms")]
    pub active_poll_ms: u64,
    /// Delay when nothing is due; also the cap for due-run wakeups.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Added to the soonest due run so the poll lands just after it.
    #[serde(default = "default_due_slack_ms")]
    pub due_slack_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            active_poll_ms: default_active_poll_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            due_slack_ms: default_due_slack_ms(),
        }
    }
}

impl RefreshConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.active_poll_ms == 0 || self.idle_poll_ms == 0 {
            return Err(ConfigError::Validation(
                "refresh.active_poll_ms and refresh.idle_poll_ms must be greater than 0"
                    .to_string(),
            ));
        }
        if self.active_poll_ms > self.idle_poll_ms {
            return Err(ConfigError::Validation(format!(
                "refresh.active_poll_ms ({}) must not exceed refresh.idle_poll_ms ({})",
                self.active_poll_ms, self.idle_poll_ms
            )));
        }
        Ok(())
    }
}

fn default_active_poll_ms() -> u64 {
    5_000
}
fn default_idle_poll_ms() -> u64 {
    60_000
}
fn default_due_slack_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Wait before re-fetching authoritative state after a write.
    #[serde(default = "default_verify_delay_ms")]
    pub delay_ms: u64,
    /// Largest difference between requested and confirmed timestamps that
    /// still counts as a match. Zero compares exactly.
    #[serde(default = "default_verify_tolerance_ms")]
    pub tolerance_ms: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_verify_delay_ms(),
            tolerance_ms: default_verify_tolerance_ms(),
        }
    }
}

impl VerifyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.delay_ms == 0 {
            return Err(ConfigError::Validation(
                "verify.delay_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_verify_delay_ms() -> u64 {
    2_500
}
fn default_verify_tolerance_ms() -> u64 {
    0
}
