use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::IssueTracker;
use crate::board::models::{Issue, IssueState, dedup_labels};
use crate::config::GitHubSection;
use crate::errors::BoardError;
use crate::session::Session;

const GITHUB_JSON: &str = "application/vnd.github+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub REST client for the four calls the board needs.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    api_version: String,
    page_size: u32,
}

// ── Wire shapes ───────────────────────────────────────────────────────
//
// Responses are decoded into these and converted; nothing downstream sees
// raw JSON.

#[derive(Debug, Deserialize)]
struct WireIssue {
    id: u64,
    number: u64,
    title: String,
    html_url: String,
    state: IssueState,
    #[serde(default)]
    labels: Vec<WireLabel>,
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    /// Present only on pull requests.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

/// GitHub returns label objects, but accepts and sometimes echoes bare names.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireLabel {
    Object { name: String },
    Name(String),
}

impl WireLabel {
    fn into_name(self) -> String {
        match self {
            WireLabel::Object { name } | WireLabel::Name(name) => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireUser {
    login: String,
}

#[derive(Debug, Serialize)]
struct CreateLabel<'a> {
    name: &'a str,
    color: &'a str,
}

impl From<WireIssue> for Issue {
    fn from(wire: WireIssue) -> Self {
        Issue {
            id: wire.id,
            number: wire.number,
            title: wire.title,
            html_url: wire.html_url,
            state: wire.state,
            labels: dedup_labels(wire.labels.into_iter().map(WireLabel::into_name)),
            author: wire.user.map(|u| u.login),
            body: wire.body,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
            is_pull_request: wire.pull_request.is_some(),
        }
    }
}

impl GitHubClient {
    pub fn new(settings: &GitHubSection) -> Result<Self, BoardError> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_version: settings.api_version.clone(),
            page_size: settings.effective_page_size(),
        })
    }

    fn request(&self, method: Method, session: &Session, tail: &str) -> RequestBuilder {
        let url = format!(
            "{}/repos/{}/{}{}",
            self.api_base, session.owner, session.repo, tail
        );
        tracing::debug!(%method, repo = %session.slug(), path = tail, "github request");
        self.http
            .request(method, url)
            .bearer_auth(&session.token)
            .header(ACCEPT, GITHUB_JSON)
            .header("X-GitHub-Api-Version", self.api_version.as_str())
            .header(CACHE_CONTROL, "no-cache")
    }
}

/// Send and turn any non-success status into [`BoardError::Remote`].
async fn send_checked(req: RequestBuilder) -> Result<Response, BoardError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    // Best effort: an unreadable body degrades to empty.
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), "github rejected request");
    Err(BoardError::Remote {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response, context: &str) -> Result<T, BoardError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| BoardError::decode(context, e))
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn list_issues(&self, session: &Session) -> Result<Vec<Issue>, BoardError> {
        let per_page = self.page_size.to_string();
        let req = self
            .request(Method::GET, session, "/issues")
            .query(&[("state", "all"), ("per_page", per_page.as_str())]);
        let wire: Vec<WireIssue> = decode(send_checked(req).await?, "issue list").await?;

        let total = wire.len();
        let issues: Vec<Issue> = wire
            .into_iter()
            .filter(|w| w.pull_request.is_none())
            .map(Issue::from)
            .collect();
        tracing::debug!(
            repo = %session.slug(),
            total,
            pull_requests = total - issues.len(),
            "fetched issues"
        );
        Ok(issues)
    }

    async fn get_issue(&self, session: &Session, number: u64) -> Result<Issue, BoardError> {
        let req = self.request(Method::GET, session, &format!("/issues/{}", number));
        let wire: WireIssue = decode(send_checked(req).await?, "issue").await?;
        Ok(wire.into())
    }

    async fn set_labels(
        &self,
        session: &Session,
        number: u64,
        labels: &[String],
    ) -> Result<Vec<String>, BoardError> {
        let req = self
            .request(Method::PUT, session, &format!("/issues/{}/labels", number))
            .json(labels);
        let applied: Vec<WireLabel> = decode(send_checked(req).await?, "label set").await?;
        Ok(applied.into_iter().map(WireLabel::into_name).collect())
    }

    async fn ensure_label(&self, session: &Session, name: &str, color: &str) -> Result<(), BoardError> {
        let req = self
            .request(Method::POST, session, "/labels")
            .json(&CreateLabel { name, color });
        match send_checked(req).await {
            Ok(_) => {
                tracing::info!(label = name, repo = %session.slug(), "created label");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(label = name, "label already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
