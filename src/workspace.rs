//! The application-state object.
//!
//! A [`Workspace`] owns the configuration and the store. Every user action is
//! a method taking the caller's [`Session`] explicitly; nothing is kept in
//! globals.

use log::info;
use std::sync::{Mutex, MutexGuard};

use crate::config::{Config, Persistence};
use crate::database::SqliteStore;
use crate::error::{MadiError, Result};
use crate::login::{self, RegisterOutcome, Role};
use crate::normalize::{self, IngestionReport, Upload};
use crate::query::{self, FilterOptions, Filters, QueryOutcome};
use crate::schema::ConsolidatedTable;
use crate::session::{Identity, Session};
use crate::store::{EnrollmentStore, MemoryStore, Store};

pub struct Workspace {
    config: Config,
    store: Mutex<Box<dyn Store>>,
}

impl Workspace {
    /// Open the store named by `config` and seed the default administrator
    ///
    /// Durable persistence opens the SQLite file at `config.db_path`; session
    /// persistence keeps accounts in memory for the life of the process.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store: Box<dyn Store> = match config.persistence {
            Persistence::Durable => Box::new(SqliteStore::open(&config.db_path)?),
            Persistence::Session => Box::new(MemoryStore::new()),
        };
        Self::with_store(config, store)
    }

    /// Build a workspace around an already opened store
    pub fn with_store(config: Config, mut store: Box<dyn Store>) -> Result<Self> {
        config.validate()?;
        login::seed_default_admin(&mut *store, config.credentials)?;
        info!(
            "workspace ready: {} persistence, {} merge",
            config.persistence, config.merge
        );
        Ok(Self {
            config,
            store: Mutex::new(store),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn store(&self) -> Result<MutexGuard<'_, Box<dyn Store>>> {
        self.store
            .lock()
            .map_err(|_| MadiError::Internal("store lock poisoned".into()))
    }

    /// Sign `session` in; on failure the session is left as it was
    pub fn login(&self, session: &mut Session, email: &str, password: &str) -> Result<Role> {
        let role = {
            let store = self.store()?;
            login::login(&**store, self.config.credentials, email, password)?
        };
        session.sign_in(email.trim(), role);
        Ok(role)
    }

    pub fn logout(&self, session: &mut Session) {
        session.sign_out();
    }

    pub fn register(&self, email: &str, password: &str, role: Role) -> Result<RegisterOutcome> {
        let mut store = self.store()?;
        login::register(&mut **store, self.config.credentials, email, password, role)
    }

    /// Ingest uploaded files and merge the consolidation into the table
    ///
    /// Administrator only. Files that cannot be used are listed as warnings in
    /// the report. When none can be used, or the accepted ones hold no usable
    /// row, the table is left untouched.
    pub fn upload(&self, session: &mut Session, uploads: &[Upload]) -> Result<IngestionReport> {
        require_role(session, Role::Administrator)?;

        let ingestion = normalize::ingest(uploads, self.config.columns)?;
        if ingestion.table.is_empty() {
            info!("upload accepted without usable rows, table left as it was");
            return Ok(ingestion.report);
        }
        match self.config.persistence {
            Persistence::Durable => self
                .store()?
                .merge_table(&ingestion.table, self.config.merge)?,
            Persistence::Session => session
                .volatile_mut()
                .merge_table(&ingestion.table, self.config.merge)?,
        }
        Ok(ingestion.report)
    }

    /// The table visible to `session`, whatever its role
    pub fn table(&self, session: &Session) -> Result<ConsolidatedTable> {
        match self.config.persistence {
            Persistence::Durable => self.store()?.load_table(),
            Persistence::Session => session.volatile().load_table(),
        }
    }

    /// Selector values for the current table, `None` when nothing is loaded
    ///
    /// User only.
    pub fn filter_options(&self, session: &Session) -> Result<Option<FilterOptions>> {
        require_role(session, Role::User)?;
        let table = self.table(session)?;
        if table.is_empty() {
            return Ok(None);
        }
        Ok(Some(FilterOptions::from_table(&table)))
    }

    /// Filter the table and sum the headcount
    ///
    /// User only.
    pub fn query(&self, session: &Session, filters: &Filters) -> Result<QueryOutcome> {
        require_role(session, Role::User)?;
        let table = self.table(session)?;
        Ok(query::query(&table, filters))
    }
}

/// The session's identity, if it holds `role`
pub fn require_role(session: &Session, role: Role) -> Result<&Identity> {
    let identity = session.identity().ok_or(MadiError::NotAuthenticated)?;
    if identity.role != role {
        return Err(MadiError::Forbidden(identity.role));
    }
    Ok(identity)
}
