//! The three-column board derived from issue labels.
//!
//! Columns are encoded on the tracker as the reserved labels `kb:todo`,
//! `kb:doing` and `kb:done`. [`classifier`] maps an issue to exactly one
//! column, [`state`] builds immutable boards from fetched issues, and
//! [`mutator`] writes column changes back by replacing the issue's labels.

pub mod classifier;
pub mod models;
pub mod mutator;
pub mod state;

pub use classifier::classify;
pub use models::{Column, Issue, IssueState};
pub use mutator::{MoveOutcome, ReconcileStrategy, StatusMutator, plan_labels};
pub use state::{Board, ColumnCounts, ColumnView};
