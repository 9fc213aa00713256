//! Typed error hierarchy for the task board.
//!
//! `BoardError` is the single error type returned by the reordering core and
//! the service layer. Each variant maps to a stable machine-readable kind so
//! HTTP clients can branch on `kind` rather than parsing messages.

use thiserror::Error;

/// Errors from board, column, task and membership operations.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Position {requested} is out of range (max {max})")]
    OutOfRange { requested: i64, max: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("Board membership limit of {limit} reached")]
    LimitExceeded { limit: u32 },

    #[error("Missing or invalid actor identity")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0:#}")]
    Database(#[from] anyhow::Error),
}

impl BoardError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::Conflict(_) => "CONFLICT",
            Self::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::LockPoisoned | Self::Database(_) => "INTERNAL",
        }
    }
}

impl From<rusqlite::Error> for BoardError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.into())
    }
}

pub type BoardResult<T> = Result<T, BoardError>;
