//! TOML-based application configuration.
//!
//! Stores the tunables of the blocking policy:
//! - Local-day anchor (UTC offset)
//! - Soft-task grace period
//! - Penalty defaults and anti-tamper tolerance
//! - Worker retry policy and daemon interval
//! - Quest templates
//! - Log level
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::blocking::EngineConfig;
use crate::day::DayBoundary;
use crate::error::ConfigError;
use crate::penalty::PenaltyPolicy;
use crate::workers::RetryPolicy;

/// Local-day configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DayConfig {
    /// Minutes east of UTC used for every "local day" computation.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Decision engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EnforcementConfig {
    /// Minutes a non-hard task may run past its deadline before blocking.
    #[serde(default)]
    pub soft_grace_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PenaltyConfig {
    #[serde(default = "default_penalty_minutes")]
    pub default_duration_minutes: u32,
    #[serde(default = "default_tamper_tolerance")]
    pub tamper_tolerance_secs: u64,
    #[serde(default = "default_cas_retries")]
    pub max_cas_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemindersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Retry policy and cadence of the scheduled workers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkersConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Attempt after which quest refresh gives up instead of retrying.
    #[serde(default = "default_quest_max_attempts")]
    pub quest_max_attempts: u32,
    #[serde(default = "default_daemon_interval")]
    pub daemon_interval_secs: u64,
}

/// Quest templates generated by the refresh worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestConfig {
    #[serde(default = "default_daily_quests")]
    pub daily: Vec<String>,
    #[serde(default = "default_weekly_chain")]
    pub weekly_chain: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub day: DayConfig,
    #[serde(default)]
    pub engine: EnforcementConfig,
    #[serde(default)]
    pub penalty: PenaltyConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub quests: QuestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_penalty_minutes() -> u32 {
    60
}
fn default_tamper_tolerance() -> u64 {
    10
}
fn default_cas_retries() -> u32 {
    8
}
fn default_true() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_quest_max_attempts() -> u32 {
    3
}
fn default_daemon_interval() -> u64 {
    60
}
fn default_daily_quests() -> Vec<String> {
    vec![
        "Finish one task before noon".into(),
        "Clear every overdue task".into(),
    ]
}
fn default_weekly_chain() -> Vec<String> {
    vec![
        "Plan the week".into(),
        "Three blocker-free days".into(),
        "Weekly review".into(),
    ]
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: default_penalty_minutes(),
            tamper_tolerance_secs: default_tamper_tolerance(),
            max_cas_retries: default_cas_retries(),
        }
    }
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            quest_max_attempts: default_quest_max_attempts(),
            daemon_interval_secs: default_daemon_interval(),
        }
    }
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            daily: default_daily_quests(),
            weekly_chain: default_weekly_chain(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    /// Location of the config file in the data directory.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing defaults if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Change a value in memory by dot-separated key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse or
    /// validate. `self` is unchanged on error.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let next: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Set a value by key and save. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Reject values that would make the policy meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.day_boundary()?;
        if self.workers.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers.max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        let multiplier = self.workers.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "workers.backoff_multiplier".into(),
                message: "must be at least 1.0".into(),
            });
        }
        Ok(())
    }

    pub fn day_boundary(&self) -> Result<DayBoundary, ConfigError> {
        DayBoundary::from_offset_minutes(self.day.utc_offset_minutes)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            soft_grace: chrono::Duration::minutes(i64::from(self.engine.soft_grace_minutes)),
        }
    }

    pub fn penalty_policy(&self) -> PenaltyPolicy {
        PenaltyPolicy {
            tamper_tolerance: Duration::from_secs(self.penalty.tamper_tolerance_secs),
            max_cas_retries: self.penalty.max_cas_retries,
        }
    }

    pub fn default_penalty_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.penalty.default_duration_minutes) * 60)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.workers.max_attempts,
            initial_backoff: Duration::from_millis(self.workers.initial_backoff_ms),
            multiplier: self.workers.backoff_multiplier,
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
