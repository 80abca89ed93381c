//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                 |
//! |-----------|----------------------------------|
//! | `serve`   | `Serve`                          |
//! | `session` | `Login`, `Logout`, `Whoami`      |
//! | `board`   | `Board`, `Show`, `Move`          |
//! | `labels`  | `Labels`                         |
//! | `config`  | `Config`                         |

pub mod board;
pub mod config;
pub mod labels;
pub mod serve;
pub mod session;

pub use board::{cmd_board, cmd_move, cmd_show};
pub use config::cmd_config;
pub use labels::cmd_labels;
pub use serve::cmd_serve;
pub use session::{cmd_login, cmd_logout, cmd_whoami};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;

use labelboard::config::BoardConfig;
use labelboard::github::{GitHubClient, IssueTracker};
use labelboard::session::store::FileStore;
use labelboard::session::{Session, SessionContext};

/// Everything a command needs, wired once per invocation.
pub struct Runtime {
    pub config: BoardConfig,
    pub sessions: SessionContext,
    /// Whether `GITHUB_TOKEN` was valid and now backs the session.
    pub env_session: bool,
}

impl Runtime {
    /// Load config and open the local session file. A `GITHUB_TOKEN` in the
    /// environment takes precedence over a stored token without being written.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config = BoardConfig::new(project_dir.to_path_buf())?;
        let store = Arc::new(FileStore::new(config.session_file()));
        let sessions = SessionContext::new(store, config.toml.session_defaults());

        let mut env_session = false;
        if let Some(token) = &config.env_token {
            let (owner, repo) = sessions.target()?;
            match Session::new(token.as_str(), owner, repo) {
                Ok(session) => {
                    sessions.prime(session)?;
                    env_session = true;
                }
                Err(e) => tracing::warn!("ignoring GITHUB_TOKEN: {}", e),
            }
        }

        Ok(Self {
            config,
            sessions,
            env_session,
        })
    }

    pub fn tracker(&self) -> Result<Arc<dyn IssueTracker>> {
        let client = GitHubClient::new(&self.config.toml.github)
            .context("Failed to build GitHub client")?;
        Ok(Arc::new(client))
    }

    /// The current session, or `None` after printing how to create one.
    pub fn session_or_hint(&self) -> Result<Option<Session>> {
        let session = self.sessions.current()?;
        if session.is_none() {
            println!("No session. Run 'labelboard login --token <token> --repo <owner/repo>' first.");
        }
        Ok(session)
    }
}

pub(crate) fn warn_line(msg: &str) {
    println!("{} {}", style("warning:").yellow().bold(), msg);
}
