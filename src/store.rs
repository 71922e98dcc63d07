//! Storage seams for user accounts and the consolidated table.
//!
//! [`crate::database::SqliteStore`] is the durable implementation;
//! [`MemoryStore`] backs the volatile per-session table and the user roster
//! when nothing should touch disk.

use std::collections::BTreeMap;

use crate::config::MergePolicy;
use crate::error::Result;
use crate::login::UserAccount;
use crate::schema::ConsolidatedTable;

/// User accounts keyed by email
pub trait UserStore {
    fn find_user(&self, email: &str) -> Result<Option<UserAccount>>;

    /// Insert a new account. Returns `false` without touching the existing
    /// account when the email is already taken.
    fn insert_user(&mut self, account: &UserAccount) -> Result<bool>;
}

/// The consolidated enrollment table
pub trait EnrollmentStore {
    fn load_table(&self) -> Result<ConsolidatedTable>;

    /// Merge a freshly consolidated table according to `policy`
    fn merge_table(&mut self, table: &ConsolidatedTable, policy: MergePolicy) -> Result<()>;
}

/// Both concerns behind one object, as a single SQLite file holds both tables
pub trait Store: UserStore + EnrollmentStore + Send {}

impl<T: UserStore + EnrollmentStore + Send> Store for T {}

/// In-memory store, empty when created and gone when dropped
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: BTreeMap<String, UserAccount>,
    table: ConsolidatedTable,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &ConsolidatedTable {
        &self.table
    }
}

impl UserStore for MemoryStore {
    fn find_user(&self, email: &str) -> Result<Option<UserAccount>> {
        Ok(self.users.get(email).cloned())
    }

    fn insert_user(&mut self, account: &UserAccount) -> Result<bool> {
        if self.users.contains_key(&account.email) {
            return Ok(false);
        }
        self.users.insert(account.email.clone(), account.clone());
        Ok(true)
    }
}

impl EnrollmentStore for MemoryStore {
    fn load_table(&self) -> Result<ConsolidatedTable> {
        Ok(self.table.clone())
    }

    fn merge_table(&mut self, table: &ConsolidatedTable, policy: MergePolicy) -> Result<()> {
        match policy {
            MergePolicy::Append => self.table.extend_from(table),
            MergePolicy::Replace => self.table = table.clone(),
        }
        Ok(())
    }
}
