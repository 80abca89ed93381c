use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use labelboard::config::SessionMode;

mod cmd;

#[derive(Parser)]
#[command(name = "labelboard")]
#[command(version, about = "Kanban board over GitHub issues, one reserved label per column")]
pub struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the board page and its API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Permissive CORS, bind on all interfaces
        #[arg(long)]
        dev: bool,

        /// Open the board in a browser once the server is up
        #[arg(long)]
        open: bool,

        /// Where browser sessions live: cookie or local
        #[arg(long)]
        session_mode: Option<SessionMode>,
    },
    /// Store a token and target repository in the local session file
    Login {
        /// GitHub token (defaults to GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,

        #[arg(long)]
        owner: Option<String>,

        /// Repository name, `owner/repo`, or a GitHub URL
        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        display_name: Option<String>,
    },
    /// Forget the local session
    Logout,
    /// Show the current session
    Whoami,
    /// Print the board
    Board {
        #[arg(long)]
        json: bool,
    },
    /// Show one issue with its column
    Show { number: u64 },
    /// Move an issue to another column
    Move {
        number: u64,
        /// todo, doing or done
        column: String,
    },
    /// Manage the reserved column labels
    Labels {
        #[command(subcommand)]
        command: LabelsCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum LabelsCommands {
    /// Create kb:todo, kb:doing and kb:done if missing
    Init,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default labelboard.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    labelboard::logging::init(cli.verbose, cli.log_json);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Serve {
            port,
            dev,
            open,
            session_mode,
        } => cmd::cmd_serve(&project_dir, *port, *dev, *open, *session_mode).await?,
        Commands::Login {
            token,
            owner,
            repo,
            display_name,
        } => cmd::cmd_login(
            &project_dir,
            token.as_deref(),
            owner.as_deref(),
            repo.as_deref(),
            display_name.as_deref(),
        )?,
        Commands::Logout => cmd::cmd_logout(&project_dir)?,
        Commands::Whoami => cmd::cmd_whoami(&project_dir)?,
        Commands::Board { json } => cmd::cmd_board(&project_dir, *json).await?,
        Commands::Show { number } => cmd::cmd_show(&project_dir, *number).await?,
        Commands::Move { number, column } => cmd::cmd_move(&project_dir, *number, column).await?,
        Commands::Labels { command } => cmd::cmd_labels(&project_dir, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
