use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::CredentialMode;
use crate::error::{MadiError, Result};
use crate::store::UserStore;

/// Email of the administrator created on first start
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@madi.com";

/// Password of the administrator created on first start
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// What an authenticated identity may do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May upload data
    Administrator,
    /// May query data
    User,
}

impl Role {
    /// Label written to the `users.role` column
    pub fn stored_label(self) -> &'static str {
        match self {
            Role::Administrator => "Administrador",
            Role::User => "Usuario",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Administrator => write!(f, "Administrator"),
            Role::User => write!(f, "User"),
        }
    }
}

impl FromStr for Role {
    type Err = MadiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "administrador" | "administrator" | "admin" => Ok(Role::Administrator),
            "usuario" | "user" => Ok(Role::User),
            other => Err(MadiError::Config(format!("unknown role '{}'", other))),
        }
    }
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Unique key
    pub email: String,

    /// Stored credential: an Argon2 PHC string, or the password itself in
    /// plaintext mode
    pub password: String,

    pub role: Role,
}

/// Login failure
///
/// There is a single variant on purpose: an unknown email and a wrong
/// password must be indistinguishable to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("incorrect email or password")]
    Denied,
}

/// Why a registration was refused before touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    EmptyFields,
}

/// Result of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegisterOutcome {
    Accepted,
    DuplicateEmail,
    Rejected(RejectReason),
}

/// Verify credentials and return the account's role
///
/// Email and password are trimmed before comparison.
///
/// # Errors
/// * `MadiError::Auth(AuthError::Denied)` for an unknown email or a wrong password
/// * `MadiError::Database` if the user table cannot be read
pub fn login<U: UserStore + ?Sized>(
    users: &U,
    mode: CredentialMode,
    email: &str,
    password: &str,
) -> Result<Role> {
    let email = email.trim();
    let password = password.trim();

    if let Some(account) = users.find_user(email)? {
        if credential_matches(mode, password, &account.password) {
            info!("login accepted for {} ({})", account.email, account.role);
            return Ok(account.role);
        }
    }

    warn!("login denied for {}", email);
    Err(AuthError::Denied.into())
}

/// Register a new account
///
/// Email and password are trimmed; either being empty rejects the request.
/// An email that is already registered leaves the existing account untouched.
///
/// # Errors
/// * `MadiError::Database` if the user table cannot be written
/// * `MadiError::Internal` if password hashing fails
pub fn register<U: UserStore + ?Sized>(
    users: &mut U,
    mode: CredentialMode,
    email: &str,
    password: &str,
    role: Role,
) -> Result<RegisterOutcome> {
    let email = email.trim();
    let password = password.trim();

    if email.is_empty() || password.is_empty() {
        return Ok(RegisterOutcome::Rejected(RejectReason::EmptyFields));
    }

    if users.find_user(email)?.is_some() {
        return Ok(RegisterOutcome::DuplicateEmail);
    }

    let account = UserAccount {
        email: email.to_string(),
        password: store_credential(mode, password)?,
        role,
    };

    if users.insert_user(&account)? {
        info!("registered {} as {}", account.email, account.role);
        Ok(RegisterOutcome::Accepted)
    } else {
        Ok(RegisterOutcome::DuplicateEmail)
    }
}

/// Create the default administrator if it does not exist yet
///
/// # Returns
/// * `Result<bool>` - true if the account was created by this call
pub fn seed_default_admin<U: UserStore + ?Sized>(
    users: &mut U,
    mode: CredentialMode,
) -> Result<bool> {
    if users.find_user(DEFAULT_ADMIN_EMAIL)?.is_some() {
        return Ok(false);
    }

    let account = UserAccount {
        email: DEFAULT_ADMIN_EMAIL.to_string(),
        password: store_credential(mode, DEFAULT_ADMIN_PASSWORD)?,
        role: Role::Administrator,
    };
    let created = users.insert_user(&account)?;
    if created {
        info!("seeded default administrator {}", DEFAULT_ADMIN_EMAIL);
    }
    Ok(created)
}

fn store_credential(mode: CredentialMode, password: &str) -> Result<String> {
    match mode {
        CredentialMode::Argon2 => hash_password(password),
        CredentialMode::Plaintext => Ok(password.to_string()),
    }
}

fn credential_matches(mode: CredentialMode, password: &str, stored: &str) -> bool {
    match mode {
        CredentialMode::Argon2 => verify_password(password, stored),
        CredentialMode::Plaintext => password == stored,
    }
}

/// Hash a password using Argon2
///
/// Creates a salted Argon2id hash in PHC string format.
///
/// # Errors
/// * Returns an error if the password hashing fails
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MadiError::Internal(format!("password hashing failed: {}", e)))
}

/// Verify a password against a stored Argon2 hash
///
/// A stored value that is not a valid PHC string (for instance a row written
/// in plaintext mode) never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => {
            warn!("stored credential is not an Argon2 hash");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
