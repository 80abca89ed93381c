use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::BoardError;

pub const TODO_LABEL: &str = "kb:todo";
pub const DOING_LABEL: &str = "kb:doing";
pub const DONE_LABEL: &str = "kb:done";

/// One of the three fixed board columns. Membership is encoded by a reserved
/// label on the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Todo,
    Doing,
    Done,
}

impl Column {
    /// Columns in display order.
    pub const ALL: [Column; 3] = [Column::Todo, Column::Doing, Column::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::Doing => "Doing",
            Self::Done => "Done",
        }
    }

    /// The reserved label that places an issue in this column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Todo => TODO_LABEL,
            Self::Doing => DOING_LABEL,
            Self::Done => DONE_LABEL,
        }
    }

    /// Position of the column in [`Column::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Todo => 0,
            Self::Doing => 1,
            Self::Done => 2,
        }
    }

    /// The two columns that are not `self`.
    pub fn others(&self) -> [Column; 2] {
        match self {
            Self::Todo => [Self::Doing, Self::Done],
            Self::Doing => [Self::Todo, Self::Done],
            Self::Done => [Self::Todo, Self::Doing],
        }
    }

    /// Map a label name back to the column it reserves, if any.
    pub fn from_label(label: &str) -> Option<Column> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    pub fn is_reserved_label(label: &str) -> bool {
        Self::from_label(label).is_some()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            _ => Err(BoardError::InvalidColumn(s.to_string())),
        }
    }
}

/// Lifecycle state owned by the tracker. Read-only from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// A tracker issue as the board sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: IssueState,
    /// Label names with set semantics; see [`dedup_labels`].
    pub labels: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// GitHub serves pull requests through the issues endpoint too.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_pull_request: bool,
}

impl Issue {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }

    /// Labels that do not encode column membership.
    pub fn passenger_labels(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .map(String::as_str)
            .filter(|l| !Column::is_reserved_label(l))
    }
}

/// Collapse duplicate label names, keeping the first occurrence of each.
pub fn dedup_labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.into();
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_round_trips_through_str() {
        for column in Column::ALL {
            assert_eq!(column.as_str().parse::<Column>().unwrap(), column);
        }
    }

    #[test]
    fn column_parse_is_case_insensitive_and_trims() {
        assert_eq!(" Doing ".parse::<Column>().unwrap(), Column::Doing);
        assert_eq!("DONE".parse::<Column>().unwrap(), Column::Done);
    }

    #[test]
    fn column_parse_rejects_unknown() {
        let err = "backlog".parse::<Column>().unwrap_err();
        assert!(matches!(err, BoardError::InvalidColumn(ref s) if s == "backlog"));
    }

    #[test]
    fn reserved_labels_map_back_to_columns() {
        assert_eq!(Column::from_label("kb:todo"), Some(Column::Todo));
        assert_eq!(Column::from_label("kb:doing"), Some(Column::Doing));
        assert_eq!(Column::from_label("kb:done"), Some(Column::Done));
        assert_eq!(Column::from_label("kb:later"), None);
        assert_eq!(Column::from_label("bug"), None);
    }

    #[test]
    fn others_never_contains_self() {
        for column in Column::ALL {
            let others = column.others();
            assert!(!others.contains(&column));
            assert_ne!(others[0], others[1]);
        }
    }

    #[test]
    fn index_matches_display_order() {
        for (i, column) in Column::ALL.iter().enumerate() {
            assert_eq!(column.index(), i);
        }
    }

    #[test]
    fn column_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Column::Doing).unwrap(), "\"doing\"");
        assert_eq!(
            serde_json::from_str::<IssueState>("\"closed\"").unwrap(),
            IssueState::Closed
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let labels = dedup_labels(["bug", "kb:todo", "bug", "ui", "kb:todo"]);
        assert_eq!(labels, vec!["bug", "kb:todo", "ui"]);
    }

    #[test]
    fn passenger_labels_skip_reserved() {
        let issue = Issue {
            id: 1,
            number: 1,
            title: "t".to_string(),
            html_url: "https://github.com/o/r/issues/1".to_string(),
            state: IssueState::Open,
            labels: vec!["kb:doing".to_string(), "priority:high".to_string()],
            author: None,
            body: None,
            created_at: None,
            updated_at: None,
            is_pull_request: false,
        };
        let passengers: Vec<&str> = issue.passenger_labels().collect();
        assert_eq!(passengers, vec!["priority:high"]);
        assert!(issue.has_label("kb:doing"));
        assert!(!issue.has_label("kb:todo"));
    }
}
