#![cfg(not(tarpaulin_include))]

use clap::Parser;
use madi::app;
use madi::config::{
    ColumnPolicy, Config, DEFAULT_BIND, DEFAULT_DB_PATH, DEFAULT_MIN_COLUMNS,
    DEFAULT_UPLOAD_LIMIT, SESSION_DURATION,
};
use std::path::PathBuf;
use std::time::Duration;

/// MADI enrollment records browser
#[derive(Parser, Debug)]
#[command(name = "website", version, about)]
struct Args {
    /// SQLite database file (durable persistence)
    #[arg(long, env = "MADI_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Listen address
    #[arg(long, env = "MADI_BIND", default_value = DEFAULT_BIND)]
    bind: String,

    /// Where uploaded data lives: durable or session
    #[arg(long, env = "MADI_PERSISTENCE", default_value = "durable")]
    persistence: String,

    /// Column matching: strict or lenient
    #[arg(long, env = "MADI_COLUMNS", default_value = "lenient")]
    columns: String,

    /// Required columns that must match in lenient mode
    #[arg(long, env = "MADI_MIN_COLUMNS", default_value_t = DEFAULT_MIN_COLUMNS)]
    min_columns: usize,

    /// What an upload does to stored data: append or replace
    #[arg(long, env = "MADI_MERGE", default_value = "append")]
    merge: String,

    /// Password storage: argon2 or plaintext
    #[arg(long, env = "MADI_CREDENTIALS", default_value = "argon2")]
    credentials: String,

    /// Session lifetime in seconds
    #[arg(long, env = "MADI_SESSION_SECS", default_value_t = SESSION_DURATION)]
    session_secs: u64,

    /// Upload size limit in bytes
    #[arg(long, env = "MADI_UPLOAD_LIMIT", default_value_t = DEFAULT_UPLOAD_LIMIT)]
    upload_limit: usize,
}

impl Args {
    fn into_config(self) -> Result<Config, madi::MadiError> {
        Ok(Config {
            db_path: self.db,
            bind: self.bind,
            persistence: self.persistence.parse()?,
            columns: ColumnPolicy::from_name(&self.columns, self.min_columns)?,
            merge: self.merge.parse()?,
            credentials: self.credentials.parse()?,
            session_ttl: Duration::from_secs(self.session_secs),
            upload_limit: self.upload_limit,
        })
    }
}

/// Main entry point for the web application
///
/// Reads the configuration from flags and `MADI_*` variables, initializes
/// logging from `RUST_LOG` (default `info`) and serves until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    app::run(config).await
}
