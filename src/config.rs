use crate::errors::{AppError, AppResult};
use crate::models::FrameRole;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
const MAX_REQUEST_TIMEOUT_MS: u64 = 120_000;
const MIN_POLL_INTERVAL_MS: u64 = 50;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellConfig {
    pub api_base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: FrameRole,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_errors: u32,
    pub state_db_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://127.0.0.1/".to_string(),
            username: None,
            password: None,
            role: FrameRole::Host,
            request_timeout_ms: 5_000,
            poll_interval_ms: 500,
            max_poll_errors: 120,
            state_db_path: None,
            log_dir: None,
        }
    }
}

impl ShellConfig {
    /// Reads the YAML file (if any), applies `PMM_SHELL_*` overrides from the
    /// process environment and validates the result.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|err| AppError::Config(format!("cannot read {}: {}", path.display(), err)))?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())?.validated()
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PMM_SHELL_API_BASE_URL") {
            self.api_base_url = value;
        }
        if let Some(value) = lookup("PMM_SHELL_USERNAME") {
            self.username = Some(value);
        }
        if let Some(value) = lookup("PMM_SHELL_PASSWORD") {
            self.password = Some(value);
        }
        if let Some(value) = lookup("PMM_SHELL_ROLE") {
            self.role = match value.trim().to_ascii_lowercase().as_str() {
                "host" => FrameRole::Host,
                "embedded" => FrameRole::Embedded,
                other => return Err(AppError::Config(format!("unknown role '{}'", other))),
            };
        }
        if let Some(value) = lookup("PMM_SHELL_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_number("PMM_SHELL_REQUEST_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("PMM_SHELL_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_number("PMM_SHELL_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("PMM_SHELL_MAX_POLL_ERRORS") {
            self.max_poll_errors = parse_number("PMM_SHELL_MAX_POLL_ERRORS", &value)?;
        }
        if let Some(value) = lookup("PMM_SHELL_STATE_DB") {
            self.state_db_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("PMM_SHELL_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(value));
        }
        Ok(self)
    }

    pub fn validated(self) -> AppResult<Self> {
        if self.api_base_url.trim().is_empty() {
            return Err(AppError::Config("apiBaseUrl cannot be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "requestTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(AppError::Config(
                "username and password must be set together".to_string(),
            ));
        }
        Ok(Self {
            request_timeout_ms: self
                .request_timeout_ms
                .clamp(MIN_REQUEST_TIMEOUT_MS, MAX_REQUEST_TIMEOUT_MS),
            poll_interval_ms: self
                .poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
            ..self
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> AppResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::Config(format!("{} must be a number, got '{}'", key, raw)))
}
