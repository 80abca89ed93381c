//! Layered configuration for the board.
//!
//! Settings come from `.labelboard/labelboard.toml`, then the environment
//! (a project-local `.env` is loaded first), then CLI flags applied by the
//! binary. Every section is optional.
//!
//! ```toml
//! [github]
//! api_base = "https://api.github.com"
//! api_version = "2022-11-28"
//! user_agent = "labelboard"
//! page_size = 100
//!
//! [board]
//! default_owner = "octocat"
//! default_repo = "hello-world"
//! reconcile = "patch"
//! serialize_moves = true
//!
//! [labels]
//! todo_color = "c5def5"
//! doing_color = "fbca04"
//! done_color = "0e8a16"
//!
//! [server]
//! port = 4173
//! session_mode = "cookie"
//! secure_cookies = true
//! dev_mode = false
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::board::mutator::ReconcileStrategy;
use crate::board::models::Column;
use crate::session::{Session, SessionDefaults};

pub const CONFIG_DIR: &str = ".labelboard";
pub const CONFIG_FILE: &str = "labelboard.toml";
pub const SESSION_FILE: &str = "session.json";

/// GitHub caps `per_page` at 100; the board only ever reads one page.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_api_version() -> String {
    "2022-11-28".to_string()
}

fn default_user_agent() -> String {
    concat!("labelboard/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_version: default_api_version(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
        }
    }
}

impl GitHubSection {
    /// Page size clamped to `1..=100`.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSection {
    #[serde(default = "default_owner")]
    pub default_owner: String,
    #[serde(default = "default_repo")]
    pub default_repo: String,
    /// How local state catches up after a successful move.
    #[serde(default)]
    pub reconcile: ReconcileStrategy,
    /// Queue concurrent moves of the same issue instead of racing them.
    #[serde(default = "default_serialize_moves")]
    pub serialize_moves: bool,
}

fn default_owner() -> String {
    "octocat".to_string()
}

fn default_repo() -> String {
    "hello-world".to_string()
}

fn default_serialize_moves() -> bool {
    true
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            default_owner: default_owner(),
            default_repo: default_repo(),
            reconcile: ReconcileStrategy::default(),
            serialize_moves: default_serialize_moves(),
        }
    }
}

/// Colors (hex, no `#`) used when creating the reserved labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelsSection {
    #[serde(default = "default_todo_color")]
    pub todo_color: String,
    #[serde(default = "default_doing_color")]
    pub doing_color: String,
    #[serde(default = "default_done_color")]
    pub done_color: String,
}

fn default_todo_color() -> String {
    "c5def5".to_string()
}

fn default_doing_color() -> String {
    "fbca04".to_string()
}

fn default_done_color() -> String {
    "0e8a16".to_string()
}

impl Default for LabelsSection {
    fn default() -> Self {
        Self {
            todo_color: default_todo_color(),
            doing_color: default_doing_color(),
            done_color: default_done_color(),
        }
    }
}

impl LabelsSection {
    pub fn color(&self, column: Column) -> &str {
        match column {
            Column::Todo => &self.todo_color,
            Column::Doing => &self.doing_color,
            Column::Done => &self.done_color,
        }
    }
}

/// Where session credentials live for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// HttpOnly cookies held by the browser; the server stores nothing.
    #[default]
    Cookie,
    /// The local key-value session file on the serving machine.
    Local,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Cookie => write!(f, "cookie"),
            SessionMode::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cookie" => Ok(SessionMode::Cookie),
            "local" => Ok(SessionMode::Local),
            _ => anyhow::bail!("Invalid session mode '{}'. Valid values: cookie, local", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub session_mode: SessionMode,
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
    /// Permissive CORS and bind on all interfaces.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_port() -> u16 {
    4173
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            session_mode: SessionMode::default(),
            secure_cookies: default_secure_cookies(),
            dev_mode: false,
        }
    }
}

/// Contents of `labelboard.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardToml {
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub labels: LabelsSection,
    #[serde(default)]
    pub server: ServerSection,
}

impl BoardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse labelboard.toml")
    }

    /// Load `labelboard.toml` from `config_dir`, or defaults if it is absent.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize labelboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LABELBOARD_API_BASE").filter(|v| !v.is_empty()) {
            self.github.api_base = v;
        }
        if let Some(v) = lookup("LABELBOARD_OWNER").filter(|v| !v.is_empty()) {
            self.board.default_owner = v;
        }
        if let Some(v) = lookup("LABELBOARD_REPO").filter(|v| !v.is_empty()) {
            self.board.default_repo = v;
        }
        if let Some(port) = lookup("LABELBOARD_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Human-readable warnings; an empty list means the config is sane.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.github.api_base.starts_with("http://") && !self.github.api_base.starts_with("https://") {
            warnings.push(format!(
                "github.api_base '{}' is not an http(s) URL",
                self.github.api_base
            ));
        }
        if self.github.page_size == 0 || self.github.page_size > MAX_PAGE_SIZE {
            warnings.push(format!(
                "github.page_size {} is outside 1..=100 and will be clamped",
                self.github.page_size
            ));
        }
        if let Err(e) = Session::new("x", &self.board.default_owner, &self.board.default_repo) {
            warnings.push(format!("board defaults: {}", e));
        }
        for column in Column::ALL {
            let color = self.labels.color(column);
            if color.len() != 6 || !color.chars().all(|c| c.is_ascii_hexdigit()) {
                warnings.push(format!(
                    "labels.{}_color '{}' is not a 6-digit hex color",
                    column, color
                ));
            }
        }
        if self.server.session_mode == SessionMode::Cookie && !self.server.secure_cookies {
            warnings.push(
                "server.secure_cookies is off: session cookies will be sent over plain HTTP".to_string(),
            );
        }

        warnings
    }

    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults {
            owner: self.board.default_owner.clone(),
            repo: self.board.default_repo.clone(),
        }
    }
}

/// Resolved runtime configuration for one project directory.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub project_dir: PathBuf,
    pub toml: BoardToml,
    /// `GITHUB_TOKEN` from the environment, if any.
    pub env_token: Option<String>,
}

impl BoardConfig {
    /// Load file + environment settings for `project_dir`.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        // A missing .env is normal.
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let config_dir = project_dir.join(CONFIG_DIR);
        let mut toml = BoardToml::load_or_default(&config_dir)?;
        toml.apply_env(|key| std::env::var(key).ok());
        let env_token = std::env::var("GITHUB_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            project_dir,
            toml,
            env_token,
        })
    }

    pub fn config_dir(&self) -> PathBuf {
        self.project_dir.join(CONFIG_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE)
    }

    pub fn session_file(&self) -> PathBuf {
        self.config_dir().join(SESSION_FILE)
    }
}
