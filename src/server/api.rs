use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::ws::{WsMessage, broadcast_message};
use crate::board::{Board, Column, MoveOutcome, ReconcileStrategy, StatusMutator, classify};
use crate::config::{BoardToml, SessionMode};
use crate::errors::BoardError;
use crate::github::{self, IssueTracker};
use crate::session::cookies::{clear_cookies, session_cookies, session_from_headers};
use crate::session::{Session, SessionContext};

// ── Shared application state ──────────────────────────────────────────

/// Last fetched board per repository and credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BoardKey {
    owner: String,
    repo: String,
    token: u64,
}

impl BoardKey {
    fn for_session(session: &Session) -> Self {
        let mut hasher = DefaultHasher::new();
        session.token.hash(&mut hasher);
        Self {
            owner: session.owner.clone(),
            repo: session.repo.clone(),
            token: hasher.finish(),
        }
    }
}

/// Boards kept at most; the least recently stored one is evicted first.
const MAX_CACHED_BOARDS: usize = 64;

/// Last fetched board per repository and credential.
#[derive(Default)]
struct BoardCache {
    entries: HashMap<BoardKey, (u64, Board)>,
    clock: u64,
}

impl BoardCache {
    fn get(&self, key: &BoardKey) -> Option<&Board> {
        self.entries.get(key).map(|(_, board)| board)
    }

    fn insert(&mut self, key: BoardKey, board: Board) {
        self.clock += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= MAX_CACHED_BOARDS {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (stamp, _))| *stamp)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (self.clock, board));
    }

    fn remove(&mut self, key: &BoardKey) {
        self.entries.remove(key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct AppState {
    pub config: BoardToml,
    /// Local session handle; only consulted in [`SessionMode::Local`].
    pub sessions: SessionContext,
    pub tracker: Arc<dyn IssueTracker>,
    pub mutator: StatusMutator,
    pub ws_tx: broadcast::Sender<WsMessage>,
    boards: Mutex<BoardCache>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: BoardToml, sessions: SessionContext, tracker: Arc<dyn IssueTracker>) -> Self {
        let (ws_tx, _rx) = broadcast::channel::<WsMessage>(256);
        let mutator = StatusMutator::new(
            tracker.clone(),
            config.board.reconcile,
            config.board.serialize_moves,
        );
        Self {
            config,
            sessions,
            tracker,
            mutator,
            ws_tx,
            boards: Mutex::new(BoardCache::default()),
        }
    }

    /// Session for this request under the configured mode.
    pub(crate) fn session(&self, headers: &HeaderMap) -> Result<Option<Session>, ApiError> {
        match self.config.server.session_mode {
            SessionMode::Cookie => Ok(session_from_headers(
                headers,
                &self.config.board.default_owner,
                &self.config.board.default_repo,
            )),
            SessionMode::Local => Ok(self.sessions.current()?),
        }
    }

    fn require_session(&self, headers: &HeaderMap) -> Result<Session, ApiError> {
        self.session(headers)?
            .ok_or_else(|| BoardError::MissingSession.into())
    }

    pub(crate) fn cached_board(&self, session: &Session) -> Result<Option<Board>, ApiError> {
        let boards = self.boards.lock().map_err(|_| BoardError::LockPoisoned)?;
        Ok(boards.get(&BoardKey::for_session(session)).cloned())
    }

    fn cache_board(&self, session: &Session, board: Board) -> Result<(), ApiError> {
        let mut boards = self.boards.lock().map_err(|_| BoardError::LockPoisoned)?;
        boards.insert(BoardKey::for_session(session), board);
        Ok(())
    }

    /// Store the board a move produced. A patched board only contributes the
    /// moved issue, so moves of other issues that finished in between survive.
    /// A refetched board is the freshest full view and replaces the entry.
    fn cache_moved(&self, session: &Session, outcome: &MoveOutcome) -> Result<(), ApiError> {
        let mut boards = self.boards.lock().map_err(|_| BoardError::LockPoisoned)?;
        let key = BoardKey::for_session(session);
        let merged = match (
            self.mutator.strategy(),
            boards.get(&key),
            outcome.board.find(outcome.number),
        ) {
            (ReconcileStrategy::Patch, Some(current), Some(moved)) => {
                current.replace_issue(moved.clone())
            }
            _ => outcome.board.clone(),
        };
        boards.insert(key, merged);
        Ok(())
    }

    fn forget_board(&self, session: &Session) -> Result<(), ApiError> {
        let mut boards = self.boards.lock().map_err(|_| BoardError::LockPoisoned)?;
        boards.remove(&BoardKey::for_session(session));
        Ok(())
    }

    pub(crate) async fn load_board(&self, session: &Session) -> Result<Board, ApiError> {
        let issues = self.tracker.list_issues(session).await?;
        let board = Board::from_issues(issues);
        tracing::info!(repo = %session.slug(), issues = board.len(), "board loaded");
        self.cache_board(session, board.clone())?;
        broadcast_message(
            &self.ws_tx,
            &WsMessage::BoardLoaded {
                owner: session.owner.clone(),
                repo: session.repo.clone(),
                counts: board.counts(),
            },
        );
        Ok(board)
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SessionRequest {
    pub token: String,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub mode: SessionMode,
    pub owner: String,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct ReplaceLabelsRequest {
    pub labels: Vec<String>,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub column: String,
}

#[derive(Serialize)]
pub struct MoveResponse {
    pub number: u64,
    pub from: Column,
    pub to: Column,
    pub labels: Vec<String>,
    pub board: Board,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    /// GitHub rejected the call or could not be reached.
    Upstream {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },
    Internal(String),
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        let message = err.to_string();
        match err {
            BoardError::MissingSession => ApiError::Unauthorized(message),
            BoardError::InvalidSession(_) | BoardError::InvalidColumn(_) => ApiError::BadRequest(message),
            BoardError::IssueNotFound { .. } => ApiError::NotFound(message),
            BoardError::Remote { status, body, .. } => ApiError::Upstream {
                message,
                status: Some(status),
                body: Some(body),
            },
            BoardError::Network(_) | BoardError::Decode { .. } => ApiError::Upstream {
                message,
                status: None,
                body: None,
            },
            BoardError::Store(_) | BoardError::LockPoisoned | BoardError::Io(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, serde_json::json!({"error": msg})),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg})),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({"error": msg})),
            ApiError::Upstream { message, status, body } => {
                let mut payload = serde_json::json!({"error": message});
                if let Some(status) = status {
                    payload["status"] = status.into();
                }
                if let Some(body) = body {
                    payload["body"] = body.into();
                }
                (StatusCode::BAD_GATEWAY, payload)
            }
            ApiError::Internal(msg) => {
                tracing::warn!("internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({"error": msg}))
            }
        };
        (status, Json(payload)).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/session",
            get(session_status).post(create_session).delete(delete_session),
        )
        .route("/api/board", get(get_board))
        .route("/api/issues/{number}", get(get_issue))
        .route("/api/issues/{number}/labels", put(replace_labels))
        .route("/api/issues/{number}/move", post(move_issue))
        .route("/api/labels/ensure", post(ensure_labels))
        .route("/health", get(health_check))
}

fn set_cookie_headers(cookies: Vec<String>) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::Internal(format!("Invalid cookie value: {}", e)))?;
        headers.append(SET_COOKIE, value);
    }
    Ok(headers)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn session_status(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let mode = state.config.server.session_mode;
    let status = match (state.session(&headers)?, mode) {
        (Some(session), _) => SessionStatus {
            active: true,
            mode,
            owner: session.owner,
            repo: session.repo,
            display_name: match mode {
                SessionMode::Local => state.sessions.display_name()?,
                SessionMode::Cookie => None,
            },
        },
        (None, SessionMode::Local) => {
            let (owner, repo) = state.sessions.target()?;
            SessionStatus {
                active: false,
                mode,
                owner,
                repo,
                display_name: None,
            }
        }
        (None, SessionMode::Cookie) => SessionStatus {
            active: false,
            mode,
            owner: state.config.board.default_owner.clone(),
            repo: state.config.board.default_repo.clone(),
            display_name: None,
        },
    };
    Ok(Json(status))
}

async fn create_session(
    State(state): State<SharedState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = req
        .owner
        .filter(|o| !o.trim().is_empty())
        .unwrap_or_else(|| state.config.board.default_owner.clone());
    let repo = req
        .repo
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| state.config.board.default_repo.clone());
    let session = Session::new(req.token, owner, repo)?;
    if !github::is_plausible_token(&session.token) {
        tracing::warn!("token does not look like a GitHub token; using it anyway");
    }

    match state.config.server.session_mode {
        SessionMode::Cookie => {
            tracing::info!(repo = %session.slug(), "session cookies issued");
            let headers = set_cookie_headers(session_cookies(
                &session,
                state.config.server.secure_cookies,
            ))?;
            Ok((StatusCode::NO_CONTENT, headers))
        }
        SessionMode::Local => {
            state.sessions.establish(session, req.display_name.as_deref())?;
            Ok((StatusCode::NO_CONTENT, HeaderMap::new()))
        }
    }
}

async fn delete_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(session) = state.session(&headers)? {
        state.forget_board(&session)?;
    }
    match state.config.server.session_mode {
        SessionMode::Cookie => {
            let headers = set_cookie_headers(clear_cookies(state.config.server.secure_cookies))?;
            Ok((StatusCode::NO_CONTENT, headers))
        }
        SessionMode::Local => {
            state.sessions.clear()?;
            Ok((StatusCode::NO_CONTENT, HeaderMap::new()))
        }
    }
}

async fn get_board(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let session = match state.session(&headers)? {
        Some(session) => session,
        None if state.config.server.session_mode == SessionMode::Local => {
            return Ok(Json(serde_json::json!({"session": false})).into_response());
        }
        None => return Err(BoardError::MissingSession.into()),
    };
    let board = state.load_board(&session).await?;
    Ok(Json(board).into_response())
}

async fn get_issue(
    State(state): State<SharedState>,
    Path(number): Path<u64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.require_session(&headers)?;
    let issue = state.tracker.get_issue(&session, number).await?;
    if issue.is_pull_request {
        return Err(BoardError::IssueNotFound { number }.into());
    }
    let column = classify(&issue);
    Ok(Json(serde_json::json!({"issue": issue, "column": column})))
}

async fn replace_labels(
    State(state): State<SharedState>,
    Path(number): Path<u64>,
    headers: HeaderMap,
    Json(req): Json<ReplaceLabelsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.require_session(&headers)?;
    let labels = state.tracker.set_labels(&session, number, &req.labels).await?;

    if let Some(board) = state.cached_board(&session)? {
        if board.find(number).is_some() {
            state.cache_board(&session, board.with_issue_labels(number, labels.clone())?)?;
        }
    }
    broadcast_message(
        &state.ws_tx,
        &WsMessage::LabelsReplaced {
            owner: session.owner.clone(),
            repo: session.repo.clone(),
            number,
            labels: labels.clone(),
        },
    );
    Ok(Json(serde_json::json!({"labels": labels})))
}

async fn move_issue(
    State(state): State<SharedState>,
    Path(number): Path<u64>,
    headers: HeaderMap,
    Json(req): Json<MoveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = Column::from_str(&req.column)?;
    let session = state.require_session(&headers)?;
    let board = match state.cached_board(&session)? {
        Some(board) if board.find(number).is_some() => board,
        _ => state.load_board(&session).await?,
    };

    let outcome = state.mutator.move_issue(&session, &board, number, target).await?;
    state.cache_moved(&session, &outcome)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::IssueMoved {
            owner: session.owner.clone(),
            repo: session.repo.clone(),
            number,
            from: outcome.from,
            to: outcome.to,
            labels: outcome.labels.clone(),
        },
    );
    Ok(Json(MoveResponse {
        number,
        from: outcome.from,
        to: outcome.to,
        labels: outcome.labels,
        board: outcome.board,
    }))
}

async fn ensure_labels(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.require_session(&headers)?;
    let labels =
        github::ensure_column_labels(state.tracker.as_ref(), &session, &state.config.labels).await?;
    Ok(Json(serde_json::json!({"labels": labels})))
}

// ── Tests ─────────────────────────────────────────────────────────────
