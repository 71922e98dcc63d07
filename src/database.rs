use log::info;
use rusqlite::{Connection, ErrorCode, params};
use std::fs::create_dir_all;
use std::path::Path;

use crate::config::MergePolicy;
use crate::error::Result;
use crate::login::{Role, UserAccount};
use crate::schema::{ConsolidatedTable, EnrollmentRecord};
use crate::store::{EnrollmentStore, UserStore};

const CREATE_USERS: &str = "
    CREATE TABLE IF NOT EXISTS users (
        email TEXT PRIMARY KEY,
        password TEXT NOT NULL,
        role TEXT NOT NULL
    )";

const CREATE_ENROLLMENT: &str = "
    CREATE TABLE IF NOT EXISTS enrollment (
        year INTEGER,
        institution TEXT,
        program TEXT,
        semester TEXT,
        sex TEXT,
        enrolled INTEGER
    )";

/// Durable store: one SQLite file holding the `users` and `enrollment` tables
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and create if needed) the database at `path`
    ///
    /// The parent directory is created when missing and both tables are
    /// created if they do not exist yet. There are no migrations.
    ///
    /// # Examples
    /// ```no_run
    /// use madi::database::SqliteStore;
    ///
    /// let store = SqliteStore::open("database/madi.db").expect("open database");
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                create_dir_all(parent)?;
            }
        }
        info!("opening database {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// Private database that disappears with the store
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(CREATE_USERS, [])?;
        conn.execute(CREATE_ENROLLMENT, [])?;
        Ok(Self { conn })
    }

    /// Number of stored enrollment rows
    pub fn enrollment_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM enrollment", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl UserStore for SqliteStore {
    fn find_user(&self, email: &str) -> Result<Option<UserAccount>> {
        let mut stmt = self
            .conn
            .prepare("SELECT email, password, role FROM users WHERE email = ?1")?;
        let mut rows = stmt.query(params![email])?;

        match rows.next()? {
            Some(row) => {
                let role: String = row.get(2)?;
                let role = role.parse::<Role>().map_err(|_| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        rusqlite::types::Type::Text,
                        format!("unknown role '{}'", role).into(),
                    )
                })?;
                Ok(Some(UserAccount {
                    email: row.get(0)?,
                    password: row.get(1)?,
                    role,
                }))
            }
            None => Ok(None),
        }
    }

    fn insert_user(&mut self, account: &UserAccount) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO users (email, password, role) VALUES (?1, ?2, ?3)",
            params![account.email, account.password, account.role.stored_label()],
        );

        match inserted {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl EnrollmentStore for SqliteStore {
    fn load_table(&self) -> Result<ConsolidatedTable> {
        let mut stmt = self.conn.prepare(
            "SELECT year, institution, program, semester, sex, enrolled
             FROM enrollment ORDER BY rowid",
        )?;

        let records = stmt
            .query_map([], |row| {
                let enrolled: i64 = row.get(5)?;
                Ok(EnrollmentRecord {
                    year: row.get(0)?,
                    institution: row.get(1)?,
                    program: row.get(2)?,
                    semester: row.get(3)?,
                    sex: row.get(4)?,
                    enrolled: u64::try_from(enrolled)
                        .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(5, enrolled))?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ConsolidatedTable::from_records(records))
    }

    fn merge_table(&mut self, table: &ConsolidatedTable, policy: MergePolicy) -> Result<()> {
        let tx = self.conn.transaction()?;

        if policy == MergePolicy::Replace {
            tx.execute("DELETE FROM enrollment", [])?;
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO enrollment (year, institution, program, semester, sex, enrolled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in table {
                stmt.execute(params![
                    record.year,
                    record.institution,
                    record.program,
                    record.semester,
                    record.sex,
                    i64::try_from(record.enrolled).unwrap_or(i64::MAX),
                ])?;
            }
        }

        tx.commit()?;
        info!("stored {} enrollment rows ({})", table.len(), policy);
        Ok(())
    }
}
