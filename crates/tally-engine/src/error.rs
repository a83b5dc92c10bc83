//! # Engine Errors
//!
//! What a workflow reports back to the operator.
//!
//! ## Clean vs. Partial Failure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Validation / Consistency / NotFound / Unauthenticated                  │
//! │      rejected before any write; nothing to clean up                     │
//! │                                                                         │
//! │  Backend                                                                │
//! │      the store failed on the first write (or a read); nothing written   │
//! │                                                                         │
//! │  PartialFailure                                                         │
//! │      at least one write committed before a later step failed; carries   │
//! │      the ids of what was written and tells the operator what to fix     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use tally_core::{CoreError, ValidationError};
use tally_db::DbError;
use thiserror::Error;

/// Errors returned by every engine workflow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A business rule rejected the request.
    #[error("{0}")]
    Core(CoreError),

    /// The record store failed before anything was written.
    #[error("Backend error: {0}")]
    Backend(DbError),

    /// A later step failed after earlier writes were committed.
    ///
    /// The committed rows are left in place; `message` tells the operator
    /// what to reconcile by hand.
    #[error("{workflow}: {message}")]
    PartialFailure {
        workflow: &'static str,
        message: String,
        /// Ids of the records written before the failure.
        entity_ids: Vec<String>,
        #[source]
        source: Box<EngineError>,
    },

    /// Stored data contradicts the request (e.g. a SKU bound to another product).
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// No signed-in user.
    #[error("No user is signed in")]
    Unauthenticated,

    /// The detached write task died.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Backend,
    PartialFailure,
    Consistency,
    NotFound,
    Unauthenticated,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::Core(_) => ErrorKind::Validation,
            EngineError::Backend(_) => ErrorKind::Backend,
            EngineError::PartialFailure { .. } => ErrorKind::PartialFailure,
            EngineError::Consistency(_) => ErrorKind::Consistency,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Unauthenticated => ErrorKind::Unauthenticated,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when some writes were committed and need manual reconciliation.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, EngineError::PartialFailure { .. })
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        EngineError::Consistency(message.into())
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => EngineError::Validation(e),
            other => EngineError::Core(other),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Backend(other),
        }
    }
}

/// Convenience type alias for Results with EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
