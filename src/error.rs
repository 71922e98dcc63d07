//! Error types for MADI

use thiserror::Error;

use crate::login::{AuthError, Role};

/// Common result type for MADI operations
pub type Result<T> = std::result::Result<T, MadiError>;

/// Every failure an action can report.
///
/// None of these are fatal to the process: a failed action leaves previously
/// stored data intact.
#[derive(Error, Debug)]
pub enum MadiError {
    /// An uploaded file could not be read or parsed
    #[error("error reading file '{file}': {reason}")]
    Read { file: String, reason: String },

    /// An uploaded file does not carry enough of the required columns
    #[error(
        "file '{file}' does not have enough required columns ({found} of {required} found, missing: {})",
        missing.join(", ")
    )]
    SchemaMismatch {
        file: String,
        missing: Vec<String>,
        found: usize,
        required: usize,
    },

    /// Every file of an upload was rejected; the store was not touched
    #[error("no file could be loaded: {0}")]
    NoBatches(String),

    /// Login failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The session has no authenticated identity
    #[error("not signed in")]
    NotAuthenticated,

    /// The session's role may not perform the requested action
    #[error("action not allowed for role {0}")]
    Forbidden(Role),

    /// SQLite failure (wraps rusqlite::Error)
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O failure (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Spreadsheet export failure
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rust_xlsxwriter::XlsxError> for MadiError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        MadiError::Spreadsheet(err.to_string())
    }
}
