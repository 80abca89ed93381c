//! Configuration view and validation commands: `labelboard config`.

use anyhow::Result;

use super::super::ConfigCommands;

use labelboard::config::{BoardConfig, BoardToml, CONFIG_DIR, CONFIG_FILE};

fn print_values(toml: &BoardToml) {
    println!("[github]");
    println!("  api_base = \"{}\"", toml.github.api_base);
    println!("  api_version = \"{}\"", toml.github.api_version);
    println!("  user_agent = \"{}\"", toml.github.user_agent);
    println!("  page_size = {}", toml.github.page_size);
    println!();
    println!("[board]");
    println!("  default_owner = \"{}\"", toml.board.default_owner);
    println!("  default_repo = \"{}\"", toml.board.default_repo);
    println!("  reconcile = \"{}\"", toml.board.reconcile);
    println!("  serialize_moves = {}", toml.board.serialize_moves);
    println!();
    println!("[labels]");
    println!("  todo_color = \"{}\"", toml.labels.todo_color);
    println!("  doing_color = \"{}\"", toml.labels.doing_color);
    println!("  done_color = \"{}\"", toml.labels.done_color);
    println!();
    println!("[server]");
    println!("  port = {}", toml.server.port);
    println!("  session_mode = \"{}\"", toml.server.session_mode);
    println!("  secure_cookies = {}", toml.server.secure_cookies);
    println!("  dev_mode = {}", toml.server.dev_mode);
    println!();
}

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("labelboard configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_values(&BoardToml::load(&config_path)?);
            } else {
                println!("No labelboard.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                println!();
                print_values(&BoardToml::default());
                println!("Run 'labelboard config init' to create a labelboard.toml file.");
                println!();
            }

            let effective = BoardConfig::new(project_dir.to_path_buf())?;
            println!("Effective values (with env overrides):");
            println!(
                "  repository = \"{}/{}\"",
                effective.toml.board.default_owner, effective.toml.board.default_repo
            );
            println!("  api_base = \"{}\"", effective.toml.github.api_base);
            println!("  port = {}", effective.toml.server.port);
            println!(
                "  GITHUB_TOKEN = {}",
                if effective.env_token.is_some() { "set" } else { "not set" }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No labelboard.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = BoardToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("labelboard.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            BoardToml::default().save(&config_path)?;

            println!("Created labelboard.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [github] api_base, page_size");
            println!("  - [board] default_owner, default_repo, reconcile");
            println!("  - [labels] column label colors");
            println!("  - [server] port, session_mode");
            println!();
        }
    }

    Ok(())
}
