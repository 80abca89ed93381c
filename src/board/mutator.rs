//! Moving issues between columns.
//!
//! GitHub's label endpoint replaces the whole set, so a move always sends the
//! issue's complete label set minus the other two reserved labels, plus the
//! target label. Dropping any passenger label here would delete it remotely.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use super::classifier::classify;
use super::models::{Column, Issue};
use super::state::Board;
use crate::errors::BoardError;
use crate::github::IssueTracker;
use crate::session::Session;

/// Compute the label set that places an issue in `target`.
///
/// Surviving labels keep their order; duplicates collapse; the target label
/// is appended when absent. Moving to the current column is a no-op on the set.
pub fn plan_labels<S: AsRef<str>>(current: &[S], target: Column) -> Vec<String> {
    let others = target.others();
    let mut out: Vec<String> = Vec::with_capacity(current.len() + 1);
    for label in current.iter().map(AsRef::as_ref) {
        if others.iter().any(|c| c.label() == label) {
            continue;
        }
        if !out.iter().any(|l| l == label) {
            out.push(label.to_string());
        }
    }
    if !out.iter().any(|l| l == target.label()) {
        out.push(target.label().to_string());
    }
    out
}

/// How local state catches up with GitHub after a successful move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStrategy {
    /// Patch the moved issue's labels in place using the applied set.
    #[default]
    Patch,
    /// Re-fetch the whole issue list.
    Refetch,
}

impl fmt::Display for ReconcileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileStrategy::Patch => write!(f, "patch"),
            ReconcileStrategy::Refetch => write!(f, "refetch"),
        }
    }
}

impl FromStr for ReconcileStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "patch" => Ok(ReconcileStrategy::Patch),
            "refetch" => Ok(ReconcileStrategy::Refetch),
            _ => anyhow::bail!("Invalid reconcile strategy '{}'. Valid values: patch, refetch", s),
        }
    }
}

/// Result of a successful move.
#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub number: u64,
    pub from: Column,
    /// Column the issue actually ended up in after reconciliation.
    pub to: Column,
    /// Label set GitHub reported as applied.
    pub labels: Vec<String>,
    #[serde(skip)]
    pub board: Board,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IssueKey {
    owner: String,
    repo: String,
    number: u64,
}

/// One async mutex per issue; moves of the same issue run one at a time.
#[derive(Default)]
struct IssueLocks {
    locks: Mutex<HashMap<IssueKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl IssueLocks {
    async fn acquire(&self, key: IssueKey) -> Result<OwnedMutexGuard<()>, BoardError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| BoardError::LockPoisoned)?;
            // Idle entries are referenced only by the map.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(key).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Persists column moves through an [`IssueTracker`].
///
/// Without per-issue serialization, overlapping moves of one issue race and
/// the last remote write wins.
pub struct StatusMutator {
    tracker: Arc<dyn IssueTracker>,
    strategy: ReconcileStrategy,
    locks: Option<IssueLocks>,
}

impl StatusMutator {
    pub fn new(tracker: Arc<dyn IssueTracker>, strategy: ReconcileStrategy, serialize_moves: bool) -> Self {
        Self {
            tracker,
            strategy,
            locks: serialize_moves.then(IssueLocks::default),
        }
    }

    pub fn strategy(&self) -> ReconcileStrategy {
        self.strategy
    }

    /// Move issue `number` on `board` to `target`.
    ///
    /// `board` decides which issues exist; the labels are re-read from GitHub
    /// under the issue's lock before planning. `board` is only read, so on any
    /// failure the caller's board is exactly as it was. On success the outcome
    /// carries the reconciled board.
    pub async fn move_issue(
        &self,
        session: &Session,
        board: &Board,
        number: u64,
        target: Column,
    ) -> Result<MoveOutcome, BoardError> {
        let _guard = match &self.locks {
            Some(locks) => Some(
                locks
                    .acquire(IssueKey {
                        owner: session.owner.clone(),
                        repo: session.repo.clone(),
                        number,
                    })
                    .await?,
            ),
            None => None,
        };

        if board.find(number).is_none() {
            return Err(BoardError::IssueNotFound { number });
        }
        // The board may be stale and the write replaces the whole set, so
        // plan from the labels GitHub holds right now.
        let mut issue = self.current_issue(session, number).await?;
        let from = classify(&issue);
        let planned = plan_labels(&issue.labels, target);
        tracing::debug!(number, %from, %target, labels = ?planned, "moving issue");

        let applied = self.tracker.set_labels(session, number, &planned).await?;
        issue.labels = applied.clone();

        let reconciled = match self.strategy {
            ReconcileStrategy::Patch => board.replace_issue(issue),
            ReconcileStrategy::Refetch => match self.tracker.list_issues(session).await {
                Ok(issues) => Board::from_issues(issues),
                Err(e) => {
                    // The write already landed; fall back to patching.
                    tracing::warn!(number, "refetch after move failed, patching instead: {}", e);
                    board.replace_issue(issue)
                }
            },
        };

        let to = reconciled.locate(number).unwrap_or(target);
        if to != target {
            tracing::warn!(number, %target, actual = %to, "issue did not land in target column");
        } else {
            tracing::info!(number, %from, %to, "issue moved");
        }

        Ok(MoveOutcome {
            number,
            from,
            to,
            labels: applied,
            board: reconciled,
        })
    }

    async fn current_issue(&self, session: &Session, number: u64) -> Result<Issue, BoardError> {
        match self.tracker.get_issue(session, number).await {
            Ok(issue) if issue.is_pull_request => Err(BoardError::IssueNotFound { number }),
            Ok(issue) => Ok(issue),
            Err(e) if e.remote_status() == Some(404) => Err(BoardError::IssueNotFound { number }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::classifier::classify_labels;
    use crate::board::models::IssueState;
    use crate::testing::{FakeTracker, issue, session};

    fn mutator(tracker: &Arc<FakeTracker>, strategy: ReconcileStrategy) -> StatusMutator {
        StatusMutator::new(tracker.clone(), strategy, true)
    }

    // ── plan_labels ──────────────────────────────────────────────────

    #[test]
    fn plan_adds_target_to_empty_set() {
        let empty: [&str; 0] = [];
        assert_eq!(plan_labels(&empty, Column::Doing), vec!["kb:doing"]);
    }

    #[test]
    fn plan_replaces_other_column_labels_and_keeps_passengers() {
        let planned = plan_labels(&["kb:todo", "priority:high"], Column::Done);
        assert_eq!(planned, vec!["priority:high", "kb:done"]);
    }

    #[test]
    fn plan_strips_every_other_reserved_label() {
        let planned = plan_labels(&["kb:todo", "bug", "kb:done", "kb:doing"], Column::Doing);
        assert_eq!(planned, vec!["bug", "kb:doing"]);
    }

    #[test]
    fn plan_is_idempotent_for_current_column() {
        let current = ["ui", "kb:doing", "p1"];
        let planned = plan_labels(&current, Column::Doing);
        assert_eq!(planned, vec!["ui", "kb:doing", "p1"]);
        assert_eq!(plan_labels(&planned, Column::Doing), planned);
    }

    #[test]
    fn plan_collapses_duplicates() {
        let planned = plan_labels(&["bug", "bug", "kb:done", "kb:done"], Column::Done);
        assert_eq!(planned, vec!["bug", "kb:done"]);
    }

    #[test]
    fn plan_always_classifies_to_target() {
        let sets: Vec<Vec<&str>> = vec![
            vec![],
            vec!["kb:todo"],
            vec!["kb:doing", "kb:done"],
            vec!["x", "kb:todo", "kb:done", "y"],
        ];
        for labels in &sets {
            for target in Column::ALL {
                for state in [IssueState::Open, IssueState::Closed] {
                    let planned = plan_labels(labels, target);
                    assert_eq!(classify_labels(&planned, state), target, "{:?} -> {}", labels, target);
                    for other in target.others() {
                        assert!(!planned.iter().any(|l| l == other.label()));
                    }
                }
            }
        }
    }

    #[test]
    fn plan_preserves_every_passenger_label() {
        let labels = ["a", "kb:todo", "b", "kb:look-alike", "c"];
        for target in Column::ALL {
            let planned = plan_labels(&labels, target);
            for passenger in ["a", "b", "kb:look-alike", "c"] {
                assert_eq!(planned.iter().filter(|l| *l == passenger).count(), 1);
            }
        }
    }

    #[test]
    fn reconcile_strategy_parses() {
        assert_eq!("patch".parse::<ReconcileStrategy>().unwrap(), ReconcileStrategy::Patch);
        assert_eq!("REFETCH".parse::<ReconcileStrategy>().unwrap(), ReconcileStrategy::Refetch);
        assert!("optimistic".parse::<ReconcileStrategy>().is_err());
        assert_eq!(ReconcileStrategy::Refetch.to_string(), "refetch");
    }

    // ── move_issue ───────────────────────────────────────────────────

    #[tokio::test]
    async fn move_walkthrough_open_issue() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(7, IssueState::Open, &[])]));
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let board = Board::from_issues(tracker.issues());
        assert_eq!(board.locate(7), Some(Column::Todo));

        let out = m.move_issue(&session(), &board, 7, Column::Doing).await.unwrap();
        assert_eq!(out.labels, vec!["kb:doing"]);
        assert_eq!(out.from, Column::Todo);
        assert_eq!(out.to, Column::Doing);
        assert_eq!(out.board.locate(7), Some(Column::Doing));

        let out = m.move_issue(&session(), &out.board, 7, Column::Todo).await.unwrap();
        assert_eq!(out.labels, vec!["kb:todo"]);
        assert_eq!(out.board.locate(7), Some(Column::Todo));
    }

    #[tokio::test]
    async fn move_closed_issue_with_todo_label_to_done() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(
            9,
            IssueState::Closed,
            &["kb:todo", "priority:high"],
        )]));
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let board = Board::from_issues(tracker.issues());
        assert_eq!(board.locate(9), Some(Column::Todo));

        let out = m.move_issue(&session(), &board, 9, Column::Done).await.unwrap();
        assert_eq!(out.labels, vec!["priority:high", "kb:done"]);
        assert_eq!(out.to, Column::Done);
        assert_eq!(
            tracker.set_labels_calls(),
            vec![(9, vec!["priority:high".to_string(), "kb:done".to_string()])]
        );
    }

    #[tokio::test]
    async fn move_keeps_labels_added_after_board_load() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(7, IssueState::Open, &[])]));
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let board = Board::from_issues(tracker.issues());
        tracker.edit_labels(7, &["urgent"]);

        let out = m.move_issue(&session(), &board, 7, Column::Doing).await.unwrap();
        assert_eq!(out.labels, vec!["urgent", "kb:doing"]);
        assert_eq!(tracker.find(7).unwrap().labels, vec!["urgent", "kb:doing"]);
        assert_eq!(out.board.find(7).unwrap().labels, vec!["urgent", "kb:doing"]);
    }

    #[tokio::test]
    async fn issue_gone_remotely_is_not_found() {
        let tracker = Arc::new(FakeTracker::new(vec![]));
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let board = Board::from_issues(vec![issue(6, IssueState::Open, &[])]);

        let err = m.move_issue(&session(), &board, 6, Column::Done).await.unwrap_err();
        assert!(matches!(err, BoardError::IssueNotFound { number: 6 }));
        assert!(tracker.set_labels_calls().is_empty());
    }

    #[tokio::test]
    async fn remote_rejection_leaves_board_untouched() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(3, IssueState::Open, &["bug"])]));
        tracker.fail_set_labels(403, "Forbidden");
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let board = Board::from_issues(tracker.issues());
        let before = board.clone();

        let err = m.move_issue(&session(), &board, 3, Column::Done).await.unwrap_err();
        assert!(err.to_string().contains("403"));
        assert_eq!(board, before);
        assert_eq!(tracker.find(3).unwrap().labels, vec!["bug"]);
    }

    #[tokio::test]
    async fn unknown_issue_is_not_sent_remotely() {
        let tracker = Arc::new(FakeTracker::new(vec![]));
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let err = m
            .move_issue(&session(), &Board::empty(), 42, Column::Done)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::IssueNotFound { number: 42 }));
        assert!(tracker.set_labels_calls().is_empty());
    }

    #[tokio::test]
    async fn same_column_move_still_writes_unchanged_set() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(5, IssueState::Open, &["kb:doing", "x"])]));
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let board = Board::from_issues(tracker.issues());

        let out = m.move_issue(&session(), &board, 5, Column::Doing).await.unwrap();
        assert_eq!(out.labels, vec!["kb:doing", "x"]);
        assert_eq!(out.from, Column::Doing);
        assert_eq!(out.to, Column::Doing);
        assert_eq!(tracker.set_labels_calls().len(), 1);
    }

    #[tokio::test]
    async fn refetch_strategy_rebuilds_from_tracker() {
        let tracker = Arc::new(FakeTracker::new(vec![
            issue(1, IssueState::Open, &[]),
            issue(2, IssueState::Open, &[]),
        ]));
        let m = mutator(&tracker, ReconcileStrategy::Refetch);
        // A stale board that only knows issue 1.
        let stale = Board::from_issues(vec![issue(1, IssueState::Open, &[])]);

        let out = m.move_issue(&session(), &stale, 1, Column::Done).await.unwrap();
        assert_eq!(out.board.len(), 2);
        assert_eq!(out.board.locate(1), Some(Column::Done));
        assert_eq!(tracker.list_calls(), 1);
    }

    #[tokio::test]
    async fn refetch_failure_falls_back_to_patch() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(1, IssueState::Open, &[])]));
        tracker.fail_list(500);
        let m = mutator(&tracker, ReconcileStrategy::Refetch);
        let board = Board::from_issues(tracker.issues());

        let out = m.move_issue(&session(), &board, 1, Column::Doing).await.unwrap();
        assert_eq!(out.board.locate(1), Some(Column::Doing));
    }

    #[tokio::test]
    async fn tracker_rewrite_is_reported_as_actual_column() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(4, IssueState::Open, &[])]));
        // The remote side drops the reserved label.
        tracker.rewrite_applied(|labels| labels.into_iter().filter(|l| !l.starts_with("kb:")).collect());
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let board = Board::from_issues(tracker.issues());

        let out = m.move_issue(&session(), &board, 4, Column::Doing).await.unwrap();
        assert_eq!(out.to, Column::Todo);
        assert!(out.labels.is_empty());
    }

    #[tokio::test]
    async fn concurrent_moves_of_one_issue_are_serialized() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(8, IssueState::Open, &[])]));
        tracker.set_delay(std::time::Duration::from_millis(20));
        let m = Arc::new(mutator(&tracker, ReconcileStrategy::Patch));
        let board = Board::from_issues(tracker.issues());

        let s = session();
        let (a, b) = tokio::join!(
            m.move_issue(&s, &board, 8, Column::Doing),
            m.move_issue(&s, &board, 8, Column::Done),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(tracker.max_in_flight(), 1);
        let calls = tracker.set_labels_calls();
        assert_eq!(calls.len(), 2);
        // The second move planned from the first one's result.
        assert_eq!(calls[1].1.len(), 1);
        assert_eq!(tracker.find(8).unwrap().labels.len(), 1);
    }

    #[tokio::test]
    async fn different_issues_move_independently() {
        let tracker = Arc::new(FakeTracker::new(vec![
            issue(1, IssueState::Open, &[]),
            issue(2, IssueState::Open, &[]),
        ]));
        tracker.set_delay(std::time::Duration::from_millis(20));
        let m = mutator(&tracker, ReconcileStrategy::Patch);
        let board = Board::from_issues(tracker.issues());

        let s = session();
        let (a, b) = tokio::join!(
            m.move_issue(&s, &board, 1, Column::Doing),
            m.move_issue(&s, &board, 2, Column::Done),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(tracker.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn unserialized_moves_may_overlap() {
        let tracker = Arc::new(FakeTracker::new(vec![issue(8, IssueState::Open, &[])]));
        tracker.set_delay(std::time::Duration::from_millis(20));
        let m = StatusMutator::new(tracker.clone(), ReconcileStrategy::Patch, false);
        let board = Board::from_issues(tracker.issues());

        let s = session();
        let (a, b) = tokio::join!(
            m.move_issue(&s, &board, 8, Column::Doing),
            m.move_issue(&s, &board, 8, Column::Done),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(tracker.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn idle_issue_locks_are_pruned() {
        let locks = IssueLocks::default();
        for number in 0..5 {
            let key = IssueKey {
                owner: "o".into(),
                repo: "r".into(),
                number,
            };
            drop(locks.acquire(key).await.unwrap());
        }
        assert!(locks.len() <= 1);
    }
}
