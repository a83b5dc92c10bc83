//! # Back Office Configuration
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`TALLY_*`)
//! 2. Config file (`--config`, or `config.toml` in the platform config dir)
//! 3. Defaults (this file)
//!
//! ## Platform Paths
//! - **Linux**: `~/.config/tally-pos/config.toml`, `~/.local/share/tally-pos/tally.db`
//! - **macOS**: `~/Library/Application Support/com.tally.pos/`
//! - **Windows**: `%APPDATA%\tally\pos\`
//!
//! ```toml
//! database_path = "/srv/tally/tally.db"
//! max_connections = 5
//! user_id = "u-backoffice"
//! user_name = "Back Office"
//! ```

use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::{CliError, CliResult};

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "tally.db";

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    /// Operator recorded on transactions and adjustments.
    pub user_id: String,
    pub user_name: String,
}

/// The config file; every key optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub database_path: Option<PathBuf>,
    pub max_connections: Option<u32>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl FileConfig {
    pub fn parse(path: &Path, text: &str) -> CliResult<Self> {
        toml::from_str(text).map_err(|source| CliError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "tally", "pos")
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
}

fn parsed<T: FromStr>(key: &str, value: String) -> CliResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::ConfigValue {
            key: key.to_string(),
            value,
        })
}

impl AppConfig {
    /// Loads the config file (if any) and applies `TALLY_*` overrides.
    ///
    /// An explicit `--config` path must exist; the default location may not.
    pub fn load(explicit: Option<&Path>) -> CliResult<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => project_dirs()
                .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
                .filter(|p| p.exists()),
        };

        let file = match path {
            Some(path) => {
                debug!(path = %path.display(), "Reading config file");
                let text = std::fs::read_to_string(&path).map_err(|source| CliError::Io {
                    path: path.clone(),
                    source,
                })?;
                FileConfig::parse(&path, &text)?
            }
            None => FileConfig::default(),
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Layers `env` over `file` over the defaults.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> CliResult<Self> {
        let max_connections = match env("TALLY_MAX_CONNECTIONS") {
            Some(value) => parsed("TALLY_MAX_CONNECTIONS", value)?,
            None => file.max_connections.unwrap_or(5),
        };
        if max_connections == 0 {
            return Err(CliError::ConfigValue {
                key: "max_connections".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(AppConfig {
            database_path: env("TALLY_DB_PATH")
                .map(PathBuf::from)
                .or(file.database_path)
                .unwrap_or_else(default_database_path),
            max_connections,
            user_id: env("TALLY_USER_ID")
                .or(file.user_id)
                .unwrap_or_else(|| "backoffice".to_string()),
            user_name: env("TALLY_USER_NAME")
                .or(file.user_name)
                .unwrap_or_else(|| "Back Office".to_string()),
        })
    }
}
