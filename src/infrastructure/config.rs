use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;

pub const DEFAULT_TOKEN_URL: &str = "https://tim7.pythonanywhere.com/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub period_seconds: u64,
    pub poll_interval_millis: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 12,
            period_seconds: 60,
            poll_interval_millis: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_retries: u32,
    pub default_retry_after_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            default_retry_after_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalendarConfig {
    pub calendar_id: String,
    pub base_url: String,
    pub include_transparent: bool,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_id: "primary".to_string(),
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            include_transparent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u64,
    pub timezone: String,
    pub public_base_url: String,
    pub internal_base_url: String,
    pub token_file: PathBuf,
    pub token_storage: TokenStorage,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub calendar: CalendarConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            timezone: "UTC".to_string(),
            public_base_url: "https://api.usemotion.com/v1".to_string(),
            internal_base_url: "https://internal.usemotion.com".to_string(),
            token_file: PathBuf::from("state").join("token.txt"),
            token_storage: TokenStorage::File,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.rate_limit.max_requests < 1 {
            return Err(InfraError::InvalidConfig(
                "rateLimit.maxRequests must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.period_seconds < 1 {
            return Err(InfraError::InvalidConfig(
                "rateLimit.periodSeconds must be at least 1".to_string(),
            ));
        }
        self.time_zone()?;
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("invalid timezone '{}': {error}", self.timezone))
        })
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.retry.default_retry_after_seconds)
    }

    /// Token file location; relative paths are resolved against the workspace
    /// root.
    pub fn token_path(&self, workspace_root: &Path) -> PathBuf {
        if self.token_file.is_absolute() {
            self.token_file.clone()
        } else {
            workspace_root.join(&self.token_file)
        }
    }
}

/// Values that never live in the config file.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub api_key: String,
    pub token_url: String,
    pub token_key: Option<String>,
    pub google_access_token: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("token_key", &self.token_key.as_ref().map(|_| "<redacted>"))
            .field(
                "google_access_token",
                &self.google_access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

pub fn load_secrets_from_env() -> Result<Secrets, InfraError> {
    load_secrets_from_lookup(|key| std::env::var(key).ok())
}

pub fn load_secrets_from_lookup<F>(lookup: F) -> Result<Secrets, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = required_lookup_value(
        &lookup,
        &["TASKLEDGER_MOTION_API_KEY", "MOTION_API_KEY"],
        "task service api key",
    )?;
    let token_url = optional_lookup_value(&lookup, &["TASKLEDGER_TOKEN_URL", "NEW_MOTION_TOKEN_URL"])
        .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
    let token_key = optional_lookup_value(&lookup, &["TASKLEDGER_TOKEN_KEY", "NEW_MOTION_TOKEN_KEY"]);
    let google_access_token = optional_lookup_value(
        &lookup,
        &["TASKLEDGER_GOOGLE_ACCESS_TOKEN", "GOOGLE_ACCESS_TOKEN"],
    );

    Ok(Secrets {
        api_key,
        token_url,
        token_key,
        google_access_token,
    })
}

fn required_lookup_value<F>(
    lookup: &F,
    keys: &[&str],
    field_name: &str,
) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let config: AppConfig = serde_json::from_value(read_config(&path)?)?;
    config.validate()?;
    Ok(config)
}
