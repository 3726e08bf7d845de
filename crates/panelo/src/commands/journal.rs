use crate::JournalCommands;
use crate::commands::local_context;
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use panelo_config::Config;
use panelo_provision::{Driver, HostPaths};
use panelo_state::{Journal, ProvisionRun, RunStatus, StepOutcome};

fn status_color(status: &RunStatus) -> Color {
    match status {
        RunStatus::Succeeded => Color::Green,
        RunStatus::InProgress => Color::Yellow,
        RunStatus::Failed { .. } => Color::Red,
        RunStatus::RolledBack { .. } => Color::DarkGrey,
    }
}

pub fn render_runs(runs: &[ProvisionRun]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["RUN", "LABEL", "STARTED", "STATUS", "CHANGED"]);
    for run in runs.iter().rev() {
        table.add_row(vec![
            Cell::new(run.id),
            Cell::new(&run.label),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(run.status.label()).fg(status_color(&run.status)),
            Cell::new(run.changed_steps()),
        ]);
    }
    table
}

pub fn render_steps(run: &ProvisionRun) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["STEP", "OUTCOME", "DETAIL", "UNDO"]);
    for step in &run.steps {
        let color = match step.outcome {
            StepOutcome::Changed { .. } => Color::Green,
            StepOutcome::Unchanged | StepOutcome::Skipped { .. } => Color::DarkGrey,
            StepOutcome::Failed { .. } => Color::Red,
        };
        let undo = step
            .undo
            .iter()
            .map(|action| action.describe())
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(&step.component),
            Cell::new(step.outcome.label()).fg(color),
            Cell::new(step.outcome.detail()),
            Cell::new(undo),
        ]);
    }
    table
}

pub fn run(config: Config, command: JournalCommands) -> Result<()> {
    let journal = Journal::new(HostPaths::from_settings(&config.settings).journal_dir());

    match command {
        JournalCommands::List => {
            let runs = journal.list()?;
            if runs.is_empty() {
                println!("No runs recorded");
            } else {
                println!("{}", render_runs(&runs));
            }
        }
        JournalCommands::Show { run } => {
            let run = journal.load(&run)?;
            println!("Run {} ({})", run.id, run.label);
            println!("  Started: {}", run.started_at.to_rfc3339());
            if let Some(finished) = run.finished_at {
                println!("  Finished: {}", finished.to_rfc3339());
            }
            match &run.status {
                RunStatus::Failed { error } => println!("  Status: failed: {}", error),
                RunStatus::RolledBack { error: Some(error) } => {
                    println!("  Status: rolled back after: {}", error)
                }
                status => println!("  Status: {}", status.label()),
            }
            println!("{}", render_steps(&run));
        }
    }
    Ok(())
}

pub async fn rollback(config: Config, run: &str) -> Result<()> {
    let ctx = local_context(config).await?;
    let report = Driver::new(&ctx)
        .rollback(run)
        .await
        .with_context(|| format!("Failed to roll back run {}", run))?;

    if report.applied.is_empty() && report.failed.is_empty() {
        println!("Nothing to undo");
        return Ok(());
    }
    for action in &report.applied {
        println!("✓ {}", action);
    }
    for (action, error) in &report.failed {
        println!("✗ {}: {}", action, error);
    }
    if !report.failed.is_empty() {
        anyhow::bail!("{} undo actions failed", report.failed.len());
    }
    Ok(())
}
