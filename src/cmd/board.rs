//! Terminal board: `labelboard board`, `show`, `move`.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use console::style;

use labelboard::board::{Board, Column, Issue, IssueState, StatusMutator, classify};

use super::Runtime;

fn column_heading(column: Column, count: usize) -> String {
    let title = match column {
        Column::Todo => style(column.title()).blue().bold(),
        Column::Doing => style(column.title()).yellow().bold(),
        Column::Done => style(column.title()).green().bold(),
    };
    format!("{} {}", title, style(format!("({})", count)).dim())
}

fn issue_line(issue: &Issue) -> String {
    let passengers: Vec<&str> = issue.passenger_labels().collect();
    let mut line = format!("  {} {}", style(format!("#{}", issue.number)).cyan(), issue.title);
    if issue.state == IssueState::Closed {
        line.push_str(&format!(" {}", style("[closed]").dim()));
    }
    if !passengers.is_empty() {
        line.push_str(&format!(" {}", style(passengers.join(", ")).magenta()));
    }
    line
}

fn print_board(slug: &str, board: &Board) {
    println!();
    println!("{}", style(slug).bold());
    for column in &board.columns {
        println!();
        println!("{}", column_heading(column.id, column.issues.len()));
        if column.issues.is_empty() {
            println!("  {}", style("(empty)").dim());
        }
        for issue in &column.issues {
            println!("{}", issue_line(issue));
        }
    }
    println!();
}

pub async fn cmd_board(project_dir: &Path, json: bool) -> Result<()> {
    let runtime = Runtime::load(project_dir)?;
    let Some(session) = runtime.session_or_hint()? else {
        return Ok(());
    };

    let issues = runtime
        .tracker()?
        .list_issues(&session)
        .await
        .with_context(|| format!("Failed to load issues for {}", session.slug()))?;
    let board = Board::from_issues(issues);

    if json {
        println!("{}", serde_json::to_string_pretty(&board)?);
    } else {
        print_board(&session.slug(), &board);
    }
    Ok(())
}

pub async fn cmd_show(project_dir: &Path, number: u64) -> Result<()> {
    let runtime = Runtime::load(project_dir)?;
    let Some(session) = runtime.session_or_hint()? else {
        return Ok(());
    };

    let issue = runtime
        .tracker()?
        .get_issue(&session, number)
        .await
        .with_context(|| format!("Failed to fetch issue #{}", number))?;
    if issue.is_pull_request {
        anyhow::bail!("#{} is a pull request, not an issue", number);
    }

    println!();
    println!("{} {}", style(format!("#{}", issue.number)).cyan().bold(), style(&issue.title).bold());
    println!("  Column: {}", classify(&issue).title());
    println!("  State:  {}", issue.state.as_str());
    if let Some(author) = &issue.author {
        println!("  Author: {}", author);
    }
    if !issue.labels.is_empty() {
        println!("  Labels: {}", issue.labels.join(", "));
    }
    println!("  URL:    {}", style(&issue.html_url).dim());
    if let Some(body) = issue.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        println!();
        for line in body.lines() {
            println!("  {}", line);
        }
    }
    println!();
    Ok(())
}

pub async fn cmd_move(project_dir: &Path, number: u64, column: &str) -> Result<()> {
    let target = Column::from_str(column)?;
    let runtime = Runtime::load(project_dir)?;
    let Some(session) = runtime.session_or_hint()? else {
        return Ok(());
    };

    let tracker = runtime.tracker()?;
    let issues = tracker
        .list_issues(&session)
        .await
        .with_context(|| format!("Failed to load issues for {}", session.slug()))?;
    let board = Board::from_issues(issues);

    let board_settings = &runtime.config.toml.board;
    let mutator = StatusMutator::new(tracker, board_settings.reconcile, board_settings.serialize_moves);
    let outcome = mutator
        .move_issue(&session, &board, number, target)
        .await
        .with_context(|| format!("Failed to move #{} to {}", number, target))?;

    println!(
        "{} #{} {} {} {}",
        style("✓").green(),
        outcome.number,
        outcome.from.title(),
        style("→").dim(),
        style(outcome.to.title()).bold()
    );
    println!("  Labels: {}", outcome.labels.join(", "));
    if outcome.to != target {
        super::warn_line(&format!(
            "GitHub kept #{} in {} instead of {}",
            number,
            outcome.to.title(),
            target.title()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(number: u64, state: IssueState, labels: &[&str]) -> Issue {
        Issue {
            id: number,
            number,
            title: format!("Issue {}", number),
            html_url: String::new(),
            state,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            author: None,
            body: None,
            created_at: None,
            updated_at: None,
            is_pull_request: false,
        }
    }

    #[test]
    fn issue_line_shows_passenger_labels_only() {
        console::set_colors_enabled(false);
        let line = issue_line(&issue(9, IssueState::Closed, &["kb:todo", "priority:high"]));
        assert!(line.contains("#9"));
        assert!(line.contains("[closed]"));
        assert!(line.contains("priority:high"));
        assert!(!line.contains("kb:todo"));
    }

    #[test]
    fn column_heading_includes_count() {
        console::set_colors_enabled(false);
        assert_eq!(column_heading(Column::Todo, 3), "To Do (3)");
    }
}
