//! # CLI Error Type
//!
//! Every failure a command can hit, with the exit code it maps to.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EngineError ──┐                                                       │
//! │  DbError ──────┼──► CliError ──► stderr + exit code                    │
//! │  io / toml ────┘                                                       │
//! │                                                                         │
//! │  exit 1  usage or validation      exit 3  partial failure              │
//! │  exit 2  backend or config        exit 4  not found                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use tally_db::DbError;
use tally_engine::{EngineError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    ConfigValue { key: String, value: String },

    /// A command-line argument that clap accepted but the command cannot use.
    #[error("{0}")]
    Usage(String),

    #[error("Could not render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        CliError::Usage(message.into())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(e) => match e.kind() {
                ErrorKind::PartialFailure => 3,
                ErrorKind::NotFound => 4,
                ErrorKind::Validation | ErrorKind::Consistency | ErrorKind::Unauthenticated => 1,
                ErrorKind::Backend | ErrorKind::Internal => 2,
            },
            CliError::Database(DbError::NotFound { .. }) => 4,
            CliError::Usage(_) => 1,
            CliError::Database(_)
            | CliError::Io { .. }
            | CliError::ConfigFile { .. }
            | CliError::ConfigValue { .. }
            | CliError::Output(_) => 2,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::ValidationError;

    #[test]
    fn test_exit_codes() {
        let partial = EngineError::PartialFailure {
            workflow: "record_sale",
            message: "sale voided".to_string(),
            entity_ids: vec!["t1".to_string()],
            source: Box::new(EngineError::Internal("lots".to_string())),
        };
        assert_eq!(CliError::from(partial).exit_code(), 3);
        assert_eq!(
            CliError::from(EngineError::from(ValidationError::required("sku"))).exit_code(),
            1
        );
        assert_eq!(CliError::from(DbError::not_found("Variant", "v1")).exit_code(), 4);
        assert_eq!(CliError::usage("bad line").exit_code(), 1);
    }
}
