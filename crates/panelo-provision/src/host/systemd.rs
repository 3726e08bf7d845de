//! systemd unit helpers

use crate::context::ProvisionContext;
use crate::reconciler::StepRecorder;
use crate::Result;
use command_executor::Command;
use panelo_state::UndoAction;
use tracing::info;

fn systemctl<const N: usize>(args: [&str; N]) -> Command {
    let mut cmd = Command::new("systemctl");
    cmd.args(args);
    cmd
}

/// Whether a unit is enabled
pub async fn is_enabled(ctx: &ProvisionContext, unit: &str) -> bool {
    ctx.probe(&systemctl(["is-enabled", "--quiet", unit])).await
}

/// Whether a unit is active
pub async fn is_active(ctx: &ProvisionContext, unit: &str) -> bool {
    ctx.probe(&systemctl(["is-active", "--quiet", unit])).await
}

/// Enable and start a unit unless it already is both
pub async fn enable_now(ctx: &ProvisionContext, unit: &str, rec: &mut StepRecorder) -> Result<bool> {
    if is_enabled(ctx, unit).await && is_active(ctx, unit).await {
        return Ok(false);
    }
    ctx.run(&systemctl(["enable", "--now", unit])).await?;
    info!("Enabled {}", unit);
    rec.changed(
        format!("enabled {}", unit),
        Some(UndoAction::DisableUnit {
            unit: unit.to_string(),
        }),
    );
    Ok(true)
}

/// Enable a unit without starting it
pub async fn enable(ctx: &ProvisionContext, unit: &str, rec: &mut StepRecorder) -> Result<bool> {
    if is_enabled(ctx, unit).await {
        return Ok(false);
    }
    ctx.run(&systemctl(["enable", unit])).await?;
    rec.changed(
        format!("enabled {}", unit),
        Some(UndoAction::DisableUnit {
            unit: unit.to_string(),
        }),
    );
    Ok(true)
}

/// Reload a unit
pub async fn reload(ctx: &ProvisionContext, unit: &str) -> Result<()> {
    ctx.run(&systemctl(["reload", unit])).await.map(|_| ())
}

/// Start a unit
pub async fn start(ctx: &ProvisionContext, unit: &str) -> Result<()> {
    ctx.run(&systemctl(["start", unit])).await.map(|_| ())
}

/// Stop a unit
pub async fn stop(ctx: &ProvisionContext, unit: &str) -> Result<()> {
    ctx.run(&systemctl(["stop", unit])).await.map(|_| ())
}

/// Re-read unit files
pub async fn daemon_reload(ctx: &ProvisionContext) -> Result<()> {
    ctx.run(&systemctl(["daemon-reload"])).await.map(|_| ())
}

/// The command undoing [`enable_now`]
pub fn disable_command(unit: &str) -> Command {
    systemctl(["disable", "--now", unit])
}
