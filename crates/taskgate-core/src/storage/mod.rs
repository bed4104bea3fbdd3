mod bonus_db;
mod config;
mod contribution_db;
pub mod database;
pub mod migrations;
mod penalty_db;
mod quest_db;
mod task_db;

pub use config::{
    Config, DayConfig, EnforcementConfig, LoggingConfig, PenaltyConfig, QuestConfig, RemindersConfig,
    WorkersConfig,
};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `TASKGATE_DATA_DIR` wins when set. Otherwise `~/.config/taskgate/`, or
/// `~/.config/taskgate-dev/` with `TASKGATE_ENV=dev`.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TASKGATE_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TASKGATE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("taskgate-dev")
            } else {
                base_dir.join("taskgate")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::NoDataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
