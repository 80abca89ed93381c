//! Shared fixtures for unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::board::models::{Issue, IssueState};
use crate::errors::BoardError;
use crate::github::IssueTracker;
use crate::session::Session;

pub fn issue(number: u64, state: IssueState, labels: &[&str]) -> Issue {
    Issue {
        id: 1000 + number,
        number,
        title: format!("Issue {}", number),
        html_url: format!("https://github.com/acme/widgets/issues/{}", number),
        state,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        author: Some("octocat".to_string()),
        body: None,
        created_at: None,
        updated_at: None,
        is_pull_request: false,
    }
}

pub fn pull_request(number: u64, labels: &[&str]) -> Issue {
    Issue {
        is_pull_request: true,
        ..issue(number, IssueState::Open, labels)
    }
}

pub fn session() -> Session {
    Session {
        token: "ghp_test".to_string(),
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
    }
}

type LabelRewrite = Box<dyn Fn(Vec<String>) -> Vec<String> + Send + Sync>;

#[derive(Default)]
struct FakeState {
    issues: Vec<Issue>,
    labels: BTreeMap<String, String>,
    set_labels_calls: Vec<(u64, Vec<String>)>,
    list_calls: usize,
    fail_set_labels: Option<(u16, String)>,
    fail_list: Option<u16>,
    delay: Option<Duration>,
}

/// In-memory [`IssueTracker`] that records every call.
#[derive(Default)]
pub struct FakeTracker {
    state: Mutex<FakeState>,
    rewrite: Mutex<Option<LabelRewrite>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn rejected(status: u16, body: &str) -> BoardError {
    BoardError::Remote {
        status,
        status_text: reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string(),
        body: body.to_string(),
    }
}

impl FakeTracker {
    pub fn new(issues: Vec<Issue>) -> Self {
        let tracker = Self::default();
        tracker.state.lock().unwrap().issues = issues;
        tracker
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.state.lock().unwrap().issues.clone()
    }

    pub fn find(&self, number: u64) -> Option<Issue> {
        self.issues().into_iter().find(|i| i.number == number)
    }

    /// Change an issue's labels as if someone edited it on GitHub.
    pub fn edit_labels(&self, number: u64, labels: &[&str]) {
        let mut state = self.state.lock().unwrap();
        if let Some(issue) = state.issues.iter_mut().find(|i| i.number == number) {
            issue.labels = labels.iter().map(|l| l.to_string()).collect();
        }
    }

    /// Labels created through `ensure_label`, as `(name, color)`.
    pub fn created_labels(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .labels
            .iter()
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect()
    }

    pub fn set_labels_calls(&self) -> Vec<(u64, Vec<String>)> {
        self.state.lock().unwrap().set_labels_calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn fail_set_labels(&self, status: u16, body: &str) {
        self.state.lock().unwrap().fail_set_labels = Some((status, body.to_string()));
    }

    pub fn fail_list(&self, status: u16) {
        self.state.lock().unwrap().fail_list = Some(status);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    /// Rewrite the label set before it is stored, like a server-side rule.
    pub fn rewrite_applied<F>(&self, f: F)
    where
        F: Fn(Vec<String>) -> Vec<String> + Send + Sync + 'static,
    {
        *self.rewrite.lock().unwrap() = Some(Box::new(f));
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn list_issues(&self, _session: &Session) -> Result<Vec<Issue>, BoardError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if let Some(status) = state.fail_list {
            return Err(rejected(status, "list failed"));
        }
        Ok(state
            .issues
            .iter()
            .filter(|i| !i.is_pull_request)
            .cloned()
            .collect())
    }

    async fn get_issue(&self, _session: &Session, number: u64) -> Result<Issue, BoardError> {
        self.find(number)
            .ok_or_else(|| rejected(404, r#"{"message":"Not Found"}"#))
    }

    async fn set_labels(
        &self,
        _session: &Session,
        number: u64,
        labels: &[String],
    ) -> Result<Vec<String>, BoardError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut state = self.state.lock().unwrap();
            state.set_labels_calls.push((number, labels.to_vec()));
            if let Some((status, body)) = state.fail_set_labels.clone() {
                Err(rejected(status, &body))
            } else {
                let applied = match self.rewrite.lock().unwrap().as_ref() {
                    Some(f) => f(labels.to_vec()),
                    None => labels.to_vec(),
                };
                match state.issues.iter_mut().find(|i| i.number == number) {
                    Some(issue) => {
                        issue.labels = applied.clone();
                        Ok(applied)
                    }
                    None => Err(rejected(404, r#"{"message":"Not Found"}"#)),
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn ensure_label(&self, _session: &Session, name: &str, color: &str) -> Result<(), BoardError> {
        self.state
            .lock()
            .unwrap()
            .labels
            .entry(name.to_string())
            .or_insert_with(|| color.to_string());
        Ok(())
    }
}
