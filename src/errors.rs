//! Typed error hierarchy for the board.
//!
//! `BoardError` covers every failure the library surfaces:
//! - missing or malformed sessions
//! - remote rejections (non-success HTTP status from GitHub)
//! - transport failures and undecodable payloads
//! - local lookups (unknown column names, issues absent from the board)
//!
//! Conflicts while creating a label are not errors at all; `ensure_label`
//! swallows them before they reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("No active session: provide a token, owner and repository")]
    MissingSession,

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("GitHub API error {status} {status_text}: {body}")]
    Remote {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid column '{0}': expected one of todo, doing, done")]
    InvalidColumn(String),

    #[error("Issue #{number} is not on the board")]
    IssueNotFound { number: u64 },

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Session lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BoardError {
    /// HTTP status reported by GitHub, if this is a remote rejection.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            BoardError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether GitHub rejected a create because the resource already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self.remote_status(), Some(409) | Some(422))
    }

    pub(crate) fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        BoardError::Decode {
            context: context.into(),
            source,
        }
    }
}
