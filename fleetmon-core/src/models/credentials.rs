//! Credential references and in-memory credentials.
//!
//! Only [`CredentialRef`] is ever persisted. It names the user and how they
//! authenticate; for key authentication it stores the key *path*, never key
//! material. Passwords exist only inside [`Credentials`] for the lifetime of
//! the process.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// How a host authenticates its SSH session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password supplied at connect time (never stored)
    #[default]
    Password,
    /// Private key file
    KeyFile {
        /// Path to the private key, may start with `~`
        path: PathBuf,
    },
    /// Keys offered by a running ssh-agent
    Agent,
}

/// Persistable reference to the credentials of one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    /// Remote login user
    pub username: String,
    /// Authentication method
    #[serde(flatten)]
    pub auth: AuthMethod,
}

impl CredentialRef {
    /// Password login for `username`
    #[must_use]
    pub fn password(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            auth: AuthMethod::Password,
        }
    }

    /// Key-file login for `username`
    #[must_use]
    pub fn key_file(username: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            auth: AuthMethod::KeyFile { path: path.into() },
        }
    }

    /// Agent login for `username`
    #[must_use]
    pub fn agent(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            auth: AuthMethod::Agent,
        }
    }

    /// Returns true if connecting requires a password from the operator
    #[must_use]
    pub const fn needs_password(&self) -> bool {
        matches!(self.auth, AuthMethod::Password)
    }
}

impl Default for CredentialRef {
    fn default() -> Self {
        Self::agent("root")
    }
}

/// Secret half of [`Credentials`]
#[derive(Debug, Clone)]
pub enum CredentialSecret {
    /// Login password
    Password(SecretString),
    /// Private key file (tilde already expanded)
    KeyFile(PathBuf),
    /// ssh-agent
    Agent,
}

/// Credentials used for one connect attempt; held in memory only
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Remote login user
    pub username: String,
    /// Password, key path, or agent
    pub secret: CredentialSecret,
}

impl Credentials {
    /// Password credentials
    #[must_use]
    pub fn with_password(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            secret: CredentialSecret::Password(password),
        }
    }

    /// Key-file credentials; a leading `~` is expanded
    #[must_use]
    pub fn with_key_file(username: impl Into<String>, path: &Path) -> Self {
        Self {
            username: username.into(),
            secret: CredentialSecret::KeyFile(expand_key_path(path)),
        }
    }

    /// Agent credentials
    #[must_use]
    pub fn with_agent(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: CredentialSecret::Agent,
        }
    }

    /// Builds credentials from a stored reference
    ///
    /// Returns `None` when the reference requires a password and none was
    /// given.
    #[must_use]
    pub fn from_ref(reference: &CredentialRef, password: Option<SecretString>) -> Option<Self> {
        match &reference.auth {
            AuthMethod::Password => {
                password.map(|pw| Self::with_password(reference.username.clone(), pw))
            }
            AuthMethod::KeyFile { path } => {
                Some(Self::with_key_file(reference.username.clone(), path))
            }
            AuthMethod::Agent => Some(Self::with_agent(reference.username.clone())),
        }
    }

    /// Returns the persistable reference for these credentials
    #[must_use]
    pub fn to_ref(&self) -> CredentialRef {
        let auth = match &self.secret {
            CredentialSecret::Password(_) => AuthMethod::Password,
            CredentialSecret::KeyFile(path) => AuthMethod::KeyFile { path: path.clone() },
            CredentialSecret::Agent => AuthMethod::Agent,
        };
        CredentialRef {
            username: self.username.clone(),
            auth,
        }
    }
}

fn expand_key_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
