use crate::commands::local_context;
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use panelo_config::Config;
use panelo_provision::components::component;
use panelo_provision::{ComponentId, ComponentStatus, Plan, Supervisor};

pub fn status_cell(status: &ComponentStatus) -> Cell {
    let color = match status {
        ComponentStatus::Running => Color::Green,
        ComponentStatus::Installed => Color::Cyan,
        ComponentStatus::Stopped | ComponentStatus::NotInstalled => Color::DarkGrey,
        ComponentStatus::Degraded(_) => Color::Red,
    };
    Cell::new(status).fg(color)
}

pub fn render(statuses: &[(ComponentId, ComponentStatus)]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["COMPONENT", "STATUS"]);
    for (id, status) in statuses {
        table.add_row(vec![Cell::new(id), status_cell(status)]);
    }
    table
}

pub async fn start(config: Config) -> Result<()> {
    let ctx = local_context(config).await?;
    let supervisor = Supervisor::new(&ctx)?;
    supervisor.start_all().await.context("Failed to start services")?;
    println!("✓ Started {} services", supervisor.services().len());
    Ok(())
}

pub async fn stop(config: Config) -> Result<()> {
    let ctx = local_context(config).await?;
    let supervisor = Supervisor::new(&ctx)?;
    supervisor.stop_all().await.context("Failed to stop services")?;
    println!("✓ Stopped {} services", supervisor.services().len());
    Ok(())
}

pub async fn status(config: Config) -> Result<()> {
    let ctx = local_context(config).await?;
    let plan = Plan::build(ctx.config())?;

    let mut statuses = Vec::new();
    for id in plan.enabled() {
        let status = component(id)
            .status(&ctx)
            .await
            .with_context(|| format!("Failed to query {}", id))?;
        statuses.push((id, status));
    }
    println!("{}", render(&statuses));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        let rendered = render(&[
            (ComponentId::Database, ComponentStatus::Running),
            (
                ComponentId::Panel,
                ComponentStatus::Degraded("panelo-api not running".to_string()),
            ),
        ])
        .to_string();
        assert!(rendered.contains("database"));
        assert!(rendered.contains("running"));
        assert!(rendered.contains("degraded (panelo-api not running)"));
    }
}
