//! Issue → column mapping.
//!
//! Precedence, first match wins:
//!
//! 1. `kb:todo` present  → `todo`
//! 2. `kb:doing` present → `doing`
//! 3. `kb:done` present  → `done`
//! 4. issue closed       → `done`
//! 5. otherwise          → `todo`
//!
//! Label presence always beats lifecycle state, so a closed issue carrying
//! `kb:todo` stays in `todo`. Multiple reserved labels (possible after manual
//! edits on GitHub) resolve by the same fixed order.

use super::models::{Column, Issue, IssueState};

pub fn classify(issue: &Issue) -> Column {
    classify_labels(&issue.labels, issue.state)
}

pub fn classify_labels<S: AsRef<str>>(labels: &[S], state: IssueState) -> Column {
    for column in Column::ALL {
        if labels.iter().any(|l| l.as_ref() == column.label()) {
            return column;
        }
    }
    match state {
        IssueState::Closed => Column::Done,
        IssueState::Open => Column::Todo,
    }
}
