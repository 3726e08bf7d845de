//! Firewall rules (ufw on Debian, firewalld on RHEL)

use crate::context::ProvisionContext;
use crate::environment::OsFamily;
use crate::reconciler::StepRecorder;
use crate::Result;
use command_executor::Command;
use panelo_state::UndoAction;
use std::collections::BTreeSet;
use tracing::info;

/// Ports currently open
pub async fn open_ports(ctx: &ProvisionContext) -> Result<BTreeSet<u16>> {
    let output = match ctx.env().os {
        OsFamily::Debian => {
            let mut cmd = Command::new("ufw");
            cmd.arg("status");
            ctx.output(&cmd).await?
        }
        OsFamily::Rhel => {
            let mut cmd = Command::new("firewall-cmd");
            cmd.arg("--list-ports");
            ctx.output(&cmd).await?
        }
    };
    Ok(parse_ports(&output))
}

/// Whether the firewall is active
async fn is_active(ctx: &ProvisionContext) -> Result<bool> {
    match ctx.env().os {
        OsFamily::Debian => {
            let mut cmd = Command::new("ufw");
            cmd.arg("status");
            Ok(!ctx.output(&cmd).await?.contains("inactive"))
        }
        OsFamily::Rhel => {
            let mut cmd = Command::new("firewall-cmd");
            cmd.arg("--state");
            Ok(ctx.probe(&cmd).await)
        }
    }
}

/// Open every port of `wanted` that is not open yet; returns what was opened
pub async fn ensure_open(
    ctx: &ProvisionContext,
    wanted: &BTreeSet<u16>,
    rec: &mut StepRecorder,
) -> Result<Vec<u16>> {
    let current = open_ports(ctx).await?;
    let missing: Vec<u16> = wanted.difference(&current).copied().collect();

    for port in &missing {
        ctx.run(&open_command(ctx.env().os, *port)).await?;
        rec.changed(
            format!("opened port {}", port),
            Some(UndoAction::CloseFirewallPort { port: *port }),
        );
    }

    match ctx.env().os {
        OsFamily::Debian => {
            if !is_active(ctx).await? {
                let mut enable = Command::new("ufw");
                enable.args(["--force", "enable"]);
                ctx.run(&enable).await?;
                rec.note("enabled ufw");
            }
        }
        OsFamily::Rhel => {
            if !missing.is_empty() {
                ctx.run(&reload_command()).await?;
            }
        }
    }

    if !missing.is_empty() {
        info!("Opened ports {:?}", missing);
    }
    Ok(missing)
}

fn open_command(os: OsFamily, port: u16) -> Command {
    let rule = format!("{}/tcp", port);
    match os {
        OsFamily::Debian => {
            let mut cmd = Command::new("ufw");
            cmd.arg("allow").arg(rule);
            cmd
        }
        OsFamily::Rhel => {
            let mut cmd = Command::new("firewall-cmd");
            cmd.arg("--permanent").arg(format!("--add-port={}", rule));
            cmd
        }
    }
}

/// Commands closing a port again
pub fn close_commands(os: OsFamily, port: u16) -> Vec<Command> {
    let rule = format!("{}/tcp", port);
    match os {
        OsFamily::Debian => {
            let mut cmd = Command::new("ufw");
            cmd.args(["delete", "allow"]).arg(rule);
            vec![cmd]
        }
        OsFamily::Rhel => {
            let mut cmd = Command::new("firewall-cmd");
            cmd.arg("--permanent").arg(format!("--remove-port={}", rule));
            vec![cmd, reload_command()]
        }
    }
}

fn reload_command() -> Command {
    let mut cmd = Command::new("firewall-cmd");
    cmd.arg("--reload");
    cmd
}

/// Parse `ufw status` or `firewall-cmd --list-ports` output
pub fn parse_ports(output: &str) -> BTreeSet<u16> {
    output
        .split_whitespace()
        .filter_map(|token| token.strip_suffix("/tcp"))
        .filter_map(|port| port.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ufw_status() {
        let out = "Status: active\n\nTo                         Action      From\n\
                   --                         ------      ----\n\
                   22/tcp                     ALLOW       Anywhere\n\
                   443/tcp                    ALLOW       Anywhere\n\
                   22/tcp (v6)                ALLOW       Anywhere (v6)\n";
        assert_eq!(parse_ports(out), BTreeSet::from([22, 443]));
    }

    #[test]
    fn test_parse_firewalld_ports() {
        assert_eq!(parse_ports("80/tcp 8080/tcp 53/udp"), BTreeSet::from([80, 8080]));
        assert!(parse_ports("").is_empty());
    }
}
