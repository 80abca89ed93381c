//! Board server: JSON API, WebSocket push and the embedded board page.
//!
//! ```text
//! ┌──────────┐   HTTP   ┌────────────────────────────────────────────┐
//! │ Browser  │ ───────> │ router.rs  (axum Router, ServerConfig)     │
//! │ (ui/)    │ <─────── │   └─ api.rs  (handlers, AppState, ApiError)│
//! └──────────┘ WebSocket│        │                                   │
//!                       │        │ StatusMutator::move_issue()        │
//!                       │        v                                   │
//!                       │ board::mutator ──> github::IssueTracker    │
//!                       └────────────────────────────────────────────┘
//! ```
//!
//! The server never holds a credential of its own. In `cookie` mode each
//! request carries its session in HttpOnly cookies; in `local` mode the
//! session file of the serving machine is used. A WebSocket is bound to the
//! session that opened it and only hears about that session's repository.

pub mod api;
pub mod embedded;
pub mod router;
pub mod ws;

pub use api::{AppState, SharedState};
pub use router::{ServerConfig, build_router, start_server};
