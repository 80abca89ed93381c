//! Local session commands: `labelboard login`, `logout`, `whoami`.

use std::path::Path;

use anyhow::{Result, bail};
use console::style;

use labelboard::github::{is_plausible_token, parse_owner_repo};
use labelboard::session::Session;

use super::{Runtime, warn_line};

/// Resolve `--owner`/`--repo`, where `--repo` may also be a slug or URL.
fn resolve_target(
    owner: Option<&str>,
    repo: Option<&str>,
    current: (String, String),
) -> Result<(String, String)> {
    let (current_owner, current_repo) = current;
    match repo {
        Some(r) if r.contains('/') || r.contains(':') => match parse_owner_repo(r) {
            Some((parsed_owner, parsed_repo)) => {
                if let Some(o) = owner {
                    if o != parsed_owner {
                        bail!("--owner '{}' conflicts with repository '{}'", o, r);
                    }
                }
                Ok((parsed_owner, parsed_repo))
            }
            None => bail!("Could not parse repository '{}'. Use owner/repo or a GitHub URL.", r),
        },
        Some(r) => Ok((owner.map(str::to_string).unwrap_or(current_owner), r.to_string())),
        None => Ok((owner.map(str::to_string).unwrap_or(current_owner), current_repo)),
    }
}

pub fn cmd_login(
    project_dir: &Path,
    token: Option<&str>,
    owner: Option<&str>,
    repo: Option<&str>,
    display_name: Option<&str>,
) -> Result<()> {
    let runtime = Runtime::load(project_dir)?;
    let token = match token.or(runtime.config.env_token.as_deref()) {
        Some(t) => t.to_string(),
        None => bail!("No token given. Pass --token or set GITHUB_TOKEN."),
    };
    let (owner, repo) = resolve_target(owner, repo, runtime.sessions.target()?)?;
    let session = Session::new(token, owner, repo)?;

    if !is_plausible_token(&session.token) {
        warn_line("token does not look like a GitHub token; storing it anyway");
    }

    let slug = session.slug();
    runtime.sessions.establish(session, display_name)?;
    println!(
        "{} Logged in to {}",
        style("✓").green(),
        style(slug).cyan().bold()
    );
    Ok(())
}

pub fn cmd_logout(project_dir: &Path) -> Result<()> {
    let runtime = Runtime::load(project_dir)?;
    runtime.sessions.clear()?;
    println!("{} Logged out.", style("✓").green());
    if runtime.env_session {
        warn_line("GITHUB_TOKEN is still set in the environment and will be used.");
    }
    Ok(())
}

pub fn cmd_whoami(project_dir: &Path) -> Result<()> {
    let runtime = Runtime::load(project_dir)?;
    let Some(session) = runtime.session_or_hint()? else {
        return Ok(());
    };

    println!("Repository: {}", style(session.slug()).cyan().bold());
    if let Some(name) = runtime.sessions.display_name()? {
        println!("User:       {}", name);
    }
    let source = if runtime.env_session {
        "GITHUB_TOKEN"
    } else {
        "session file"
    };
    println!("Token:      {} ({})", style("set").green(), source);
    Ok(())
}
