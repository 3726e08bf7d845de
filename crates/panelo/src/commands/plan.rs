use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use panelo_config::Config;
use panelo_provision::{Plan, StepStatus};

pub fn render(plan: &Plan) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["#", "COMPONENT", "DEPENDS ON", "STATUS"]);

    for (index, step) in plan.steps().iter().enumerate() {
        let depends_on = if step.depends_on.is_empty() {
            "-".to_string()
        } else {
            step.depends_on
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let status = match &step.status {
            StepStatus::Enabled => Cell::new("enabled").fg(Color::Green),
            StepStatus::Skipped(reason) => Cell::new(format!("skipped: {}", reason)).fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(step.id),
            Cell::new(depends_on),
            status,
        ]);
    }
    table
}

pub fn run(config: &Config) -> Result<()> {
    let plan = Plan::build(config).context("Failed to build plan")?;
    println!("{}", render(&plan));
    println!(
        "{} of {} steps enabled",
        plan.enabled().count(),
        plan.steps().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_table_lists_every_step() {
        let mut config = Config::default();
        config.components.skip = vec!["database".to_string()];
        let plan = Plan::build(&config).unwrap();
        let rendered = render(&plan).to_string();
        assert!(rendered.contains("container-runtime"));
        assert!(rendered.contains("runtime:wordpress"));
        assert!(rendered.contains("skipped: skipped by configuration"));
    }
}
