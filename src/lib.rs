pub mod bio;
pub mod cli;
pub mod core;
pub mod download;
pub mod enrich;
pub mod graph;
pub mod report;
pub mod resilience;
pub mod storage;
pub mod utils;

pub use crate::core::{pipeline::Pipeline, resolver::EntityResolver};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FloraError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Type mismatch in row {row}, column '{column}': {value:?}")]
    TypeMismatch {
        row: u64,
        column: String,
        value: String,
    },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unresolved conflict: {0}")]
    Conflict(String),

    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Graph store error: {0}")]
    Graph(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl FloraError {
    /// Whether the failure is transient and the operation may be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            FloraError::Network { retryable, .. } => *retryable,
            FloraError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            FloraError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Whether the failure is a uniqueness/primary-key violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            FloraError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<reqwest::Error> for FloraError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .map(|s| s.is_server_error() || s.as_u16() == 429)
                .unwrap_or(false);
        FloraError::Network {
            message: err.to_string(),
            retryable,
        }
    }
}

impl From<zip::result::ZipError> for FloraError {
    fn from(err: zip::result::ZipError) -> Self {
        FloraError::Archive(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FloraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let transient = FloraError::Network {
            message: "connection refused".to_string(),
            retryable: true,
        };
        assert!(transient.is_retryable());

        let fatal = FloraError::Network {
            message: "401 Unauthorized".to_string(),
            retryable: false,
        };
        assert!(!fatal.is_retryable());

        assert!(!FloraError::Schema("no such table: taxon".to_string()).is_retryable());
        assert!(!FloraError::TypeMismatch {
            row: 3,
            column: "plant_name_id".to_string(),
            value: "abc".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_busy_database_is_retryable() {
        let busy = FloraError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_retryable());
        assert!(!busy.is_constraint_violation());
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = FloraError::TypeMismatch {
            row: 12,
            column: "introduced".to_string(),
            value: "maybe".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch in row 12, column 'introduced': \"maybe\""
        );
    }
}
