use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid schema version: {0}")]
    InvalidVersion(String),

    #[error("invalid migration registry: {0}")]
    InvalidRegistry(String),

    #[error("migration {version} checksum mismatch: expected {expected}, found {actual}")]
    IntegrityMismatch {
        version: String,
        expected: String,
        actual: String,
    },

    #[error("database schema {found} is newer than supported {latest}")]
    IncompatibleSchema { found: String, latest: String },

    #[error("ledger secret unavailable: {0}")]
    Secret(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Crypto(#[from] failsafe_core::crypto::CryptoError),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
