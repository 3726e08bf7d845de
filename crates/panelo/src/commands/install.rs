use crate::commands::{confirm, context};
use anyhow::{Context, Result};
use panelo_config::Config;
use panelo_provision::{Driver, StepReport};
use panelo_state::StepOutcome;
use tracing::info;

/// Environment toggle for unattended installs
pub const AUTO_ENV: &str = "PANELO_AUTO";

/// Whether installs run without prompting
pub fn auto_mode(value: Option<&str>) -> bool {
    !matches!(value.map(str::trim), Some("0") | Some("false") | Some("no"))
}

fn ask_components(config: &mut Config) -> Result<()> {
    let toggles = &mut config.components;
    toggles.filebrowser = confirm("Install the web file browser?", toggles.filebrowser)?;
    toggles.ssl = confirm("Issue TLS certificates?", toggles.ssl)?;
    toggles.monitoring = confirm("Install Prometheus and Alertmanager?", toggles.monitoring)?;
    toggles.backup = confirm("Schedule nightly backups?", toggles.backup)?;
    toggles.panel = confirm("Install the panel API and dashboard?", toggles.panel)?;
    Ok(())
}

pub fn print_step(step: &StepReport) {
    let marker = match step.outcome {
        StepOutcome::Changed { .. } => "✓",
        StepOutcome::Unchanged => "=",
        StepOutcome::Skipped { .. } => "-",
        StepOutcome::Failed { .. } => "✗",
    };
    let detail = step.outcome.detail();
    if detail.is_empty() {
        println!("{} {} ({})", marker, step.id, step.outcome.label());
    } else {
        println!("{} {} ({}): {}", marker, step.id, step.outcome.label(), detail);
    }
}

pub async fn run(mut config: Config, domain: Option<String>, email: Option<String>) -> Result<()> {
    let auto = auto_mode(std::env::var(AUTO_ENV).ok().as_deref());
    if !auto {
        ask_components(&mut config)?;
    }

    let ctx = context(config, domain.as_deref(), email.as_deref()).await?;
    let env = ctx.env();
    println!(
        "Provisioning {} ({}, {}) as {}",
        env.domain, env.os, env.public_address, env.email
    );

    let report = Driver::new(&ctx)
        .on_step(print_step)
        .run()
        .await
        .context("Provisioning failed")?;
    info!("Run {} finished: {}", report.run_id, report.status.label());

    let run_id = report.run_id;
    let status = report.status.label();
    report
        .into_result()
        .with_context(|| format!("Run {} {}", run_id, status))?;

    println!();
    println!("✓ Panel ready at http://{}:3000", ctx.env().domain);
    println!(
        "  Credentials: {}",
        ctx.paths().credentials_file().display()
    );
    println!("  Run id: {}", run_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_mode_defaults_on() {
        assert!(auto_mode(None));
        assert!(auto_mode(Some("1")));
        assert!(!auto_mode(Some("0")));
        assert!(!auto_mode(Some(" false")));
    }
}
