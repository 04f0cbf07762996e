//! Error taxonomy for the orchestration engine.
//!
//! Each subsystem gets its own `thiserror` enum; [`OrchestratorError`]
//! aggregates them with `#[from]` conversions so call sites can use `?`
//! freely. [`OrchestratorError::code`] maps every variant onto the wire-level
//! error code taxonomy (E1xx–E5xx) the MCP transport reports to callers.

use thiserror::Error;

use crate::types::ids::SessionId;

/// Top-level error type returned by every public operation in this crate.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Wire-level error code, per spec §7's Exxx taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "E101",
            OrchestratorError::Processing(e) => e.code(),
            OrchestratorError::Storage(e) => e.code(),
            OrchestratorError::Session(e) => e.code(),
        }
    }

    /// Whether a caller could plausibly retry this operation unchanged.
    /// Per spec §7, nothing in this taxonomy is server-side retryable.
    pub fn retryable(&self) -> bool {
        false
    }
}

/// Malformed input, empty required field, enum violation. Non-retryable.
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("required field '{field}' was empty or missing")]
    EmptyField { field: String },

    #[error("invalid value '{value}' for field '{field}': {reason}")]
    InvalidEnum {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Internal operator failure during extraction/validation/conflict-detect.
#[derive(Error, Debug, Clone)]
pub enum ProcessingError {
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("conflict detection failed: {0}")]
    ConflictDetection(String),

    /// `auto_process_data`'s `input_dir` doesn't exist or isn't a directory.
    #[error("invalid input directory: {0}")]
    InvalidInputDir(String),

    #[error("{0}")]
    Other(String),
}

impl ProcessingError {
    fn code(&self) -> &'static str {
        match self {
            ProcessingError::InvalidInputDir(_) => "E301",
            ProcessingError::Extraction(_) | ProcessingError::ConflictDetection(_) | ProcessingError::Other(_) => "E102",
        }
    }
}

/// Embedded-store read/write failure.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("schema migration failed at version {from} -> {to}: {reason}")]
    MigrationFailed { from: i64, to: i64, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

impl StorageError {
    fn code(&self) -> &'static str {
        "E401"
    }
}

/// Session lifecycle and locking errors.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("session {session_id} is locked by '{locked_by}' since {locked_at}")]
    LockContention {
        session_id: SessionId,
        locked_by: String,
        locked_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("invalid status transition for session {session_id}: {from} -> {to}")]
    InvalidStatus {
        session_id: SessionId,
        from: String,
        to: String,
    },
}

impl SessionError {
    fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "E501",
            SessionError::LockContention { .. } => "E502",
            SessionError::InvalidStatus { .. } => "E503",
        }
    }
}

impl From<rusqlite::Error> for OrchestratorError {
    fn from(e: rusqlite::Error) -> Self {
        OrchestratorError::Storage(StorageError::Sqlite(e))
    }
}
