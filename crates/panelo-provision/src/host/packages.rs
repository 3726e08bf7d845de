//! OS package management (apt on Debian, dnf on RHEL)

use crate::context::ProvisionContext;
use crate::environment::OsFamily;
use crate::reconciler::StepRecorder;
use crate::Result;
use command_executor::Command;
use panelo_state::UndoAction;
use tracing::info;

/// Whether a package is installed
pub async fn is_installed(ctx: &ProvisionContext, package: &str) -> bool {
    let cmd = match ctx.env().os {
        OsFamily::Debian => Command::builder("dpkg").args(["-s", package]).build(),
        OsFamily::Rhel => Command::builder("rpm").args(["-q", package]).build(),
    };
    ctx.probe(&cmd).await
}

/// Packages of `packages` that are not installed
pub async fn missing(ctx: &ProvisionContext, packages: &[&str]) -> Vec<String> {
    let mut missing = Vec::new();
    for package in packages {
        if !is_installed(ctx, package).await {
            missing.push(package.to_string());
        }
    }
    missing
}

/// Install whatever of `packages` is missing; returns what was installed
pub async fn ensure_installed(
    ctx: &ProvisionContext,
    packages: &[&str],
    rec: &mut StepRecorder,
) -> Result<Vec<String>> {
    let missing = missing(ctx, packages).await;
    if missing.is_empty() {
        return Ok(missing);
    }

    info!("Installing packages: {}", missing.join(" "));
    match ctx.env().os {
        OsFamily::Debian => {
            let mut update = Command::new("apt-get");
            update.args(["update", "-qq"]);
            ctx.run(&update).await?;

            let mut install = Command::new("apt-get");
            install
                .args(["install", "-y"])
                .args(&missing)
                .env("DEBIAN_FRONTEND", "noninteractive");
            ctx.run(&install).await?;
        }
        OsFamily::Rhel => {
            let mut install = Command::new("dnf");
            install.args(["install", "-y"]).args(&missing);
            ctx.run(&install).await?;
        }
    }

    rec.changed(
        format!("installed {}", missing.join(" ")),
        Some(UndoAction::RemovePackages {
            packages: missing.clone(),
        }),
    );
    Ok(missing)
}

/// Uninstall packages
pub fn remove_command(os: OsFamily, packages: &[String]) -> Command {
    let mut cmd = match os {
        OsFamily::Debian => {
            let mut cmd = Command::new("apt-get");
            cmd.env("DEBIAN_FRONTEND", "noninteractive");
            cmd
        }
        OsFamily::Rhel => Command::new("dnf"),
    };
    cmd.args(["remove", "-y"]).args(packages);
    cmd
}
