//! Board server command: `labelboard serve`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use labelboard::config::SessionMode;
use labelboard::server::{AppState, ServerConfig, start_server};

use super::Runtime;

pub async fn cmd_serve(
    project_dir: &Path,
    port: Option<u16>,
    dev: bool,
    open: bool,
    session_mode: Option<SessionMode>,
) -> Result<()> {
    let runtime = Runtime::load(project_dir)?;
    let mut toml = runtime.config.toml.clone();
    if let Some(port) = port {
        toml.server.port = port;
    }
    if let Some(mode) = session_mode {
        toml.server.session_mode = mode;
    }
    toml.server.dev_mode |= dev;

    for warning in toml.validate() {
        super::warn_line(&warning);
    }

    let config = ServerConfig {
        port: toml.server.port,
        dev_mode: toml.server.dev_mode,
    };

    // No browser inside dev containers.
    if open && !config.dev_mode {
        let url = format!("http://localhost:{}", config.port);
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                tracing::warn!("failed to open browser: {}", e);
            }
        });
    }

    let tracker = runtime.tracker()?;
    let state = Arc::new(AppState::new(toml, runtime.sessions, tracker));
    start_server(config, state).await
}
