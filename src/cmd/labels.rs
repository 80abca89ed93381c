//! Reserved label setup: `labelboard labels init`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use labelboard::board::Column;
use labelboard::github::ensure_column_labels;

use super::super::LabelsCommands;
use super::Runtime;

pub async fn cmd_labels(project_dir: &Path, command: LabelsCommands) -> Result<()> {
    match command {
        LabelsCommands::Init => {
            let runtime = Runtime::load(project_dir)?;
            let Some(session) = runtime.session_or_hint()? else {
                return Ok(());
            };
            let colors = &runtime.config.toml.labels;
            let tracker = runtime.tracker()?;
            ensure_column_labels(tracker.as_ref(), &session, colors)
                .await
                .with_context(|| format!("Failed to create labels in {}", session.slug()))?;

            for column in Column::ALL {
                println!(
                    "{} {} {}",
                    style("✓").green(),
                    style(column.label()).bold(),
                    style(format!("#{}", colors.color(column))).dim()
                );
            }
        }
    }
    Ok(())
}
