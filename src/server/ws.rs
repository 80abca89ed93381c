use std::time::Duration;

use axum::{
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::{ApiError, SharedState};
use crate::board::{Column, ColumnCounts};
use crate::errors::BoardError;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

/// Board events pushed to every connected page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    BoardLoaded {
        owner: String,
        repo: String,
        counts: ColumnCounts,
    },
    IssueMoved {
        owner: String,
        repo: String,
        number: u64,
        from: Column,
        to: Column,
        labels: Vec<String>,
    },
    LabelsReplaced {
        owner: String,
        repo: String,
        number: u64,
        labels: Vec<String>,
    },
}

impl WsMessage {
    /// Repository the event belongs to, as `(owner, repo)`.
    pub fn repository(&self) -> (&str, &str) {
        match self {
            WsMessage::BoardLoaded { owner, repo, .. }
            | WsMessage::IssueMoved { owner, repo, .. }
            | WsMessage::LabelsReplaced { owner, repo, .. } => (owner.as_str(), repo.as_str()),
        }
    }
}

/// The repository one socket is allowed to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Subscription {
    owner: String,
    repo: String,
}

impl Subscription {
    /// JSON frame for `msg`, or `None` when it concerns another repository.
    fn frame(&self, msg: &WsMessage) -> Option<String> {
        let (owner, repo) = msg.repository();
        if !owner.eq_ignore_ascii_case(&self.owner) || !repo.eq_ignore_ascii_case(&self.repo) {
            return None;
        }
        match serde_json::to_string(msg) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!("failed to serialize websocket message: {}", e);
                None
            }
        }
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

/// Upgrade handler. The socket is bound to the caller's session and only
/// receives events for that repository.
///
/// A session whose board has not been loaded yet loads it first, so a made-up
/// cookie for a repository the token cannot read is refused.
pub async fn ws_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session = match state.session(&headers) {
        Ok(Some(session)) => session,
        Ok(None) => return ApiError::from(BoardError::MissingSession).into_response(),
        Err(e) => return e.into_response(),
    };
    match state.cached_board(&session) {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = state.load_board(&session).await {
                return e.into_response();
            }
        }
        Err(e) => return e.into_response(),
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let subscription = Subscription {
        owner: session.owner,
        repo: session.repo,
    };
    let rx = state.ws_tx.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx, subscription))
}

async fn handle_socket(socket: WebSocket, rx: broadcast::Receiver<WsMessage>, subscription: Subscription) {
    let (sender, receiver) = socket.split();
    tracing::debug!(owner = %subscription.owner, repo = %subscription.repo, "websocket client connected");
    run_socket_loop(sender, receiver, rx, subscription).await;
    tracing::debug!("websocket client disconnected");
}

/// Forward broadcasts, watch client frames and ping every [`PING_INTERVAL`].
/// A client that stays silent for [`PONG_TIMEOUT`] after a ping is dropped.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<WsMessage>,
    subscription: Subscription,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("websocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        let Some(frame) = subscription.frame(&msg) else {
                            continue;
                        };
                        if sender.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "websocket client lagged behind board events");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Broadcast a [`WsMessage`]. No connected clients is not an error.
pub fn broadcast_message(tx: &broadcast::Sender<WsMessage>, msg: &WsMessage) {
    let _ = tx.send(msg.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_moved_serialization() {
        let msg = WsMessage::IssueMoved {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 9,
            from: Column::Todo,
            to: Column::Done,
            labels: vec!["priority:high".into(), "kb:done".into()],
        };
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(parsed["type"], "IssueMoved");
        assert_eq!(parsed["data"]["number"], 9);
        assert_eq!(parsed["data"]["from"], "todo");
        assert_eq!(parsed["data"]["to"], "done");
        assert_eq!(parsed["data"]["labels"][1], "kb:done");
    }

    #[test]
    fn board_loaded_serialization() {
        let msg = WsMessage::BoardLoaded {
            owner: "acme".into(),
            repo: "widgets".into(),
            counts: ColumnCounts { todo: 2, doing: 1, done: 0 },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"BoardLoaded\""));
        assert!(json.contains("\"todo\":2"));
    }

    #[test]
    fn roundtrip_deserialization() {
        let msg = WsMessage::LabelsReplaced {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 3,
            labels: vec!["bug".into()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: WsMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[tokio::test]
    async fn broadcast_delivers_to_every_subscriber() {
        let (tx, _) = broadcast::channel::<WsMessage>(16);
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        let msg = WsMessage::LabelsReplaced {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 1,
            labels: vec![],
        };
        broadcast_message(&tx, &msg);

        assert_eq!(rx1.recv().await.unwrap(), msg);
        assert_eq!(rx2.recv().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn broadcast_without_receivers_is_silent() {
        let (tx, _) = broadcast::channel::<WsMessage>(16);
        broadcast_message(
            &tx,
            &WsMessage::BoardLoaded {
                owner: "acme".into(),
                repo: "widgets".into(),
                counts: ColumnCounts::default(),
            },
        );
    }

    fn moved(owner: &str, repo: &str) -> WsMessage {
        WsMessage::IssueMoved {
            owner: owner.into(),
            repo: repo.into(),
            number: 7,
            from: Column::Todo,
            to: Column::Doing,
            labels: vec!["secret-project".into(), "kb:doing".into()],
        }
    }

    #[test]
    fn subscription_only_frames_its_own_repository() {
        let sub = Subscription {
            owner: "acme".into(),
            repo: "widgets".into(),
        };
        let frame = sub.frame(&moved("acme", "widgets")).unwrap();
        assert!(frame.contains("\"type\":\"IssueMoved\""));
        assert!(sub.frame(&moved("Acme", "Widgets")).is_some());

        assert!(sub.frame(&moved("acme", "private-repo")).is_none());
        assert!(sub.frame(&moved("rival", "widgets")).is_none());
    }

    #[test]
    fn repository_of_each_event() {
        assert_eq!(moved("acme", "widgets").repository(), ("acme", "widgets"));
        let loaded = WsMessage::BoardLoaded {
            owner: "o".into(),
            repo: "r".into(),
            counts: ColumnCounts::default(),
        };
        assert_eq!(loaded.repository(), ("o", "r"));
    }

    #[test]
    fn keepalive_constants() {
        assert!(PONG_TIMEOUT > PING_INTERVAL);
        assert_eq!(PING_INTERVAL, Duration::from_secs(30));
    }
}
