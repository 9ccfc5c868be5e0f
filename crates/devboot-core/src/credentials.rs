//! Credential gate: reads database credentials from the environment and
//! refuses to continue when a required value is missing.

use crate::error::{DevbootError, Result};
use std::collections::HashMap;
use std::fmt;

pub const DB_USER: &str = "DB_USER";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const DB_NAME: &str = "DB_NAME";

/// Variables that must be present before any database step runs.
pub const REQUIRED: &[&str] = &[DB_PASSWORD];

/// Environment variable the database tools read the password from. Keeps the
/// secret out of argv and therefore out of process listings.
pub const PASSWORD_CHANNEL: &str = "MYSQL_PWD";

const DEFAULT_USER: &str = "root";
const DEFAULT_NAME: &str = "myprojectdb";

// ---------------------------------------------------------------------------
// EnvSource
// ---------------------------------------------------------------------------

pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub name: String,
    password: String,
}

impl Credentials {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            name: name.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Hand the password to a child process through [`PASSWORD_CHANNEL`].
    pub fn apply(&self, cmd: &mut std::process::Command) {
        cmd.env(PASSWORD_CHANNEL, &self.password);
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validate that every name in `required` is set (and non-blank), then build
/// the credentials. All missing names are reported together.
pub fn require<E: EnvSource + ?Sized>(env: &E, required: &[&str]) -> Result<Credentials> {
    let present = |name: &str| env.var(name).filter(|v| !v.trim().is_empty());

    let missing: Vec<String> = required
        .iter()
        .filter(|&&name| present(name).is_none())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DevbootError::MissingCredential(missing));
    }

    let password = present(DB_PASSWORD)
        .ok_or_else(|| DevbootError::MissingCredential(vec![DB_PASSWORD.to_string()]))?;
    let user = present(DB_USER).unwrap_or_else(|| DEFAULT_USER.to_string());
    let name = present(DB_NAME).unwrap_or_else(|| DEFAULT_NAME.to_string());

    Ok(Credentials::new(user, password, name))
}
