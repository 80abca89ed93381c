use serde::{Deserialize, Serialize};

use super::classifier::classify;
use super::models::{Column, Issue, dedup_labels};
use crate::errors::BoardError;

/// Derived partition of the fetched issues into the three columns.
///
/// A `Board` is a value: every change produces a new board built from the
/// full issue set, so the "each issue in exactly one column" invariant holds
/// by construction. Pull requests never enter a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnView {
    pub id: Column,
    pub title: String,
    pub label: String,
    pub issues: Vec<Issue>,
}

impl ColumnView {
    fn empty(id: Column) -> Self {
        Self {
            id,
            title: id.title().to_string(),
            label: id.label().to_string(),
            issues: Vec::new(),
        }
    }
}

/// Per-column issue counts, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnCounts {
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
}

impl ColumnCounts {
    pub fn total(&self) -> usize {
        self.todo + self.doing + self.done
    }
}

impl Board {
    pub fn empty() -> Self {
        Self {
            columns: Column::ALL.into_iter().map(ColumnView::empty).collect(),
        }
    }

    /// Classify `issues` into columns, newest (highest number) first.
    pub fn from_issues<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = Issue>,
    {
        let mut board = Self::empty();
        for mut issue in issues.into_iter().filter(|i| !i.is_pull_request) {
            issue.labels = dedup_labels(std::mem::take(&mut issue.labels));
            let column = classify(&issue);
            board.columns[column.index()].issues.push(issue);
        }
        for column in &mut board.columns {
            column.issues.sort_by(|a, b| b.number.cmp(&a.number));
        }
        board
    }

    pub fn column(&self, id: Column) -> &ColumnView {
        &self.columns[id.index()]
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.columns.iter().flat_map(|c| c.issues.iter())
    }

    pub fn find(&self, number: u64) -> Option<&Issue> {
        self.issues().find(|i| i.number == number)
    }

    /// Column currently holding issue `number`.
    pub fn locate(&self, number: u64) -> Option<Column> {
        self.columns
            .iter()
            .find(|c| c.issues.iter().any(|i| i.number == number))
            .map(|c| c.id)
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(|c| c.issues.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> ColumnCounts {
        ColumnCounts {
            todo: self.column(Column::Todo).issues.len(),
            doing: self.column(Column::Doing).issues.len(),
            done: self.column(Column::Done).issues.len(),
        }
    }

    /// A new board where issue `number` carries exactly `labels`.
    pub fn with_issue_labels(&self, number: u64, labels: Vec<String>) -> Result<Board, BoardError> {
        let mut issue = self
            .find(number)
            .cloned()
            .ok_or(BoardError::IssueNotFound { number })?;
        issue.labels = labels;
        Ok(self.replace_issue(issue))
    }

    /// A new board with `issue` inserted, replacing any issue with the same number.
    pub fn replace_issue(&self, issue: Issue) -> Board {
        let number = issue.number;
        let rest = self.issues().filter(|i| i.number != number).cloned();
        Board::from_issues(rest.chain(std::iter::once(issue)))
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}
