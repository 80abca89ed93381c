//! Session handling: which repository to show and which credential to use.
//!
//! Two storage strategies exist and a deployment uses exactly one
//! ([`crate::config::SessionMode`]):
//!
//! - **local**: the triple lives in a key-value file on this machine
//!   ([`store::FileStore`]). A [`SessionContext`] owns the store plus an
//!   in-memory mirror and is the single handle every consumer receives.
//! - **cookie**: the server never stores anything; the browser holds
//!   HttpOnly cookies produced by [`cookies`] and presents them per request.
//!
//! "No session" is a state, not a failure: [`SessionContext::current`]
//! returns `Ok(None)` when there is no token.

pub mod cookies;
pub mod store;

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::errors::BoardError;
use store::KeyValueStore;

pub const TOKEN_KEY: &str = "token";
pub const OWNER_KEY: &str = "owner";
pub const REPO_KEY: &str = "repo";
pub const DISPLAY_NAME_KEY: &str = "display_name";

/// Credential plus the repository it scopes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub owner: String,
    pub repo: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish()
    }
}

impl Session {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Result<Self, BoardError> {
        let session = Self {
            token: token.into().trim().to_string(),
            owner: owner.into().trim().to_string(),
            repo: repo.into().trim().to_string(),
        };
        if session.token.is_empty() {
            return Err(BoardError::InvalidSession("token is required".into()));
        }
        if session
            .token
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | ',' | '"'))
        {
            return Err(BoardError::InvalidSession(
                "token contains invalid characters".into(),
            ));
        }
        validate_name("owner", &session.owner)?;
        validate_name("repo", &session.repo)?;
        Ok(session)
    }

    /// `owner/repo`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// GitHub account and repository names: ASCII alphanumerics, `-`, `_`, `.`.
fn validate_name(field: &str, value: &str) -> Result<(), BoardError> {
    if value.is_empty() {
        return Err(BoardError::InvalidSession(format!("{} is required", field)));
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid || value == "." || value == ".." {
        return Err(BoardError::InvalidSession(format!(
            "{} '{}' is not a valid GitHub name",
            field, value
        )));
    }
    Ok(())
}

/// Owner/repo used when the store has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDefaults {
    pub owner: String,
    pub repo: String,
}

/// Explicit session handle, created once at start-up and cloned into every
/// consumer. Reads prefer the in-memory mirror, then the persistent store,
/// then [`SessionDefaults`] for owner/repo.
#[derive(Clone)]
pub struct SessionContext {
    mirror: Arc<RwLock<Option<Session>>>,
    store: Arc<dyn KeyValueStore>,
    defaults: SessionDefaults,
}

impl SessionContext {
    pub fn new(store: Arc<dyn KeyValueStore>, defaults: SessionDefaults) -> Self {
        Self {
            mirror: Arc::new(RwLock::new(None)),
            store,
            defaults,
        }
    }

    pub fn current(&self) -> Result<Option<Session>, BoardError> {
        if let Some(session) = self
            .mirror
            .read()
            .map_err(|_| BoardError::LockPoisoned)?
            .clone()
        {
            return Ok(Some(session));
        }

        let token = match self.store.get(TOKEN_KEY)? {
            Some(token) if !token.trim().is_empty() => token,
            _ => return Ok(None),
        };
        let (owner, repo) = self.target()?;
        let session = Session::new(token, owner, repo)?;
        self.set_mirror(Some(session.clone()))?;
        Ok(Some(session))
    }

    /// Like [`current`](Self::current) but a missing session is an error.
    pub fn require(&self) -> Result<Session, BoardError> {
        self.current()?.ok_or(BoardError::MissingSession)
    }

    /// Owner and repository the board points at, with or without a token.
    pub fn target(&self) -> Result<(String, String), BoardError> {
        if let Some(session) = self
            .mirror
            .read()
            .map_err(|_| BoardError::LockPoisoned)?
            .as_ref()
        {
            return Ok((session.owner.clone(), session.repo.clone()));
        }
        let owner = self
            .store
            .get(OWNER_KEY)?
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.defaults.owner.clone());
        let repo = self
            .store
            .get(REPO_KEY)?
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.defaults.repo.clone());
        Ok((owner, repo))
    }

    pub fn display_name(&self) -> Result<Option<String>, BoardError> {
        Ok(self.store.get(DISPLAY_NAME_KEY)?.filter(|v| !v.is_empty()))
    }

    /// Persist `session` and refresh the mirror.
    pub fn establish(&self, session: Session, display_name: Option<&str>) -> Result<(), BoardError> {
        self.store.set(TOKEN_KEY, &session.token)?;
        self.store.set(OWNER_KEY, &session.owner)?;
        self.store.set(REPO_KEY, &session.repo)?;
        match display_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => self.store.set(DISPLAY_NAME_KEY, name)?,
            None => self.store.remove(DISPLAY_NAME_KEY)?,
        }
        tracing::info!(repo = %session.slug(), "session established");
        self.set_mirror(Some(session))
    }

    /// Populate the mirror only, leaving the persistent store untouched.
    /// Used for credentials supplied through the environment.
    pub fn prime(&self, session: Session) -> Result<(), BoardError> {
        self.set_mirror(Some(session))
    }

    /// Logout: forget the credential everywhere.
    pub fn clear(&self) -> Result<(), BoardError> {
        for key in [TOKEN_KEY, OWNER_KEY, REPO_KEY, DISPLAY_NAME_KEY] {
            self.store.remove(key)?;
        }
        tracing::info!("session cleared");
        self.set_mirror(None)
    }

    fn set_mirror(&self, value: Option<Session>) -> Result<(), BoardError> {
        let mut mirror = self.mirror.write().map_err(|_| BoardError::LockPoisoned)?;
        *mirror = value;
        Ok(())
    }
}
