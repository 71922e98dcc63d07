//! Runtime configuration.
//!
//! Every knob has a default matching how the application behaves out of the
//! box; the `website` binary overrides them from command line flags or
//! `MADI_*` environment variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::MadiError;

/// Default location of the SQLite database
pub const DEFAULT_DB_PATH: &str = "database/madi.db";

/// Default listen address of the web server
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Minimum matched columns accepted in lenient mode
pub const DEFAULT_MIN_COLUMNS: usize = 4;

/// Session lifetime in seconds (24 hours)
pub const SESSION_DURATION: u64 = 24 * 60 * 60;

/// Longest accepted session lifetime in seconds (one year)
pub const MAX_SESSION_DURATION: u64 = 365 * 24 * 60 * 60;

/// Largest request body accepted by the upload endpoints
pub const DEFAULT_UPLOAD_LIMIT: usize = 64 * 1024 * 1024;

/// Where the consolidated table lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// SQLite file shared by every session, survives restarts
    #[default]
    Durable,
    /// One table per browser session, lost when the session ends
    Session,
}

/// How many of the required columns an upload must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPolicy {
    /// All required columns must be present
    Strict,
    /// At least `min_columns` of the required columns must be present
    Lenient { min_columns: usize },
}

impl Default for ColumnPolicy {
    fn default() -> Self {
        ColumnPolicy::Lenient {
            min_columns: DEFAULT_MIN_COLUMNS,
        }
    }
}

impl ColumnPolicy {
    /// Build a policy from its name (`strict` or `lenient`)
    pub fn from_name(name: &str, min_columns: usize) -> Result<Self, MadiError> {
        match name.trim().to_lowercase().as_str() {
            "strict" => Ok(ColumnPolicy::Strict),
            "lenient" => Ok(ColumnPolicy::Lenient { min_columns }),
            other => Err(MadiError::Config(format!("unknown column policy '{}'", other))),
        }
    }
}

/// What a successful upload does to the stored table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// New rows are added after the existing ones
    #[default]
    Append,
    /// The stored table is replaced by the latest consolidation
    Replace,
}

/// How passwords are kept in the user table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    /// Salted Argon2 PHC string
    #[default]
    Argon2,
    /// Password stored as given and compared for equality
    Plaintext,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file (durable persistence only)
    pub db_path: PathBuf,

    /// Web server listen address
    pub bind: String,

    pub persistence: Persistence,
    pub columns: ColumnPolicy,
    pub merge: MergePolicy,
    pub credentials: CredentialMode,

    /// Lifetime of a browser session
    pub session_ttl: Duration,

    /// Request body limit for uploads, in bytes
    pub upload_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind: DEFAULT_BIND.to_string(),
            persistence: Persistence::default(),
            columns: ColumnPolicy::default(),
            merge: MergePolicy::default(),
            credentials: CredentialMode::default(),
            session_ttl: Duration::from_secs(SESSION_DURATION),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
        }
    }
}

impl Config {
    /// Check values that the type system cannot rule out.
    pub fn validate(&self) -> Result<(), MadiError> {
        if let ColumnPolicy::Lenient { min_columns } = self.columns {
            let total = crate::schema::CanonicalField::ALL.len();
            if min_columns == 0 || min_columns > total {
                return Err(MadiError::Config(format!(
                    "min_columns must be between 1 and {}, got {}",
                    total, min_columns
                )));
            }
        }
        if self.session_ttl.is_zero() {
            return Err(MadiError::Config("session lifetime must be positive".into()));
        }
        if self.session_ttl.as_secs() > MAX_SESSION_DURATION {
            return Err(MadiError::Config(format!(
                "session lifetime must be at most {} seconds, got {}",
                MAX_SESSION_DURATION,
                self.session_ttl.as_secs()
            )));
        }
        Ok(())
    }
}

impl FromStr for Persistence {
    type Err = MadiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "durable" | "sqlite" => Ok(Persistence::Durable),
            "session" | "memory" => Ok(Persistence::Session),
            other => Err(MadiError::Config(format!("unknown persistence '{}'", other))),
        }
    }
}

impl FromStr for MergePolicy {
    type Err = MadiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(MergePolicy::Append),
            "replace" => Ok(MergePolicy::Replace),
            other => Err(MadiError::Config(format!("unknown merge policy '{}'", other))),
        }
    }
}

impl FromStr for CredentialMode {
    type Err = MadiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "argon2" => Ok(CredentialMode::Argon2),
            "plaintext" => Ok(CredentialMode::Plaintext),
            other => Err(MadiError::Config(format!("unknown credential mode '{}'", other))),
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Persistence::Durable => write!(f, "durable"),
            Persistence::Session => write!(f, "session"),
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Append => write!(f, "append"),
            MergePolicy::Replace => write!(f, "replace"),
        }
    }
}
