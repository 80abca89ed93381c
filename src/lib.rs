//! Kanban board over GitHub issues.
//!
//! Column membership lives on the issue itself as one of the reserved labels
//! `kb:todo`, `kb:doing` or `kb:done`; nothing else is persisted. Moving a
//! card rewrites the issue's full label set through the GitHub REST API.

pub mod board;
pub mod config;
pub mod errors;
pub mod github;
pub mod logging;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
