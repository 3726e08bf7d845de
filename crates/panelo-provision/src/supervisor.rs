//! Top-level `panelo.service` unit composing the runtime services

use crate::component::{ComponentId, ComponentStatus};
use crate::components::component;
use crate::context::ProvisionContext;
use crate::plan::Plan;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Unit name
pub const UNIT: &str = "panelo.service";

/// Components started by the unit, in start order
const START_ORDER: [ComponentId; 3] = [
    ComponentId::Panel,
    ComponentId::Filebrowser,
    ComponentId::Monitoring,
];

/// Unit file text for `binary`
pub fn render_unit(binary: &Path) -> String {
    format!(
        "# Managed by panelo
[Unit]
Description=panelo hosting panel
After=network-online.target docker.service
Wants=network-online.target
Requires=docker.service

[Service]
Type=oneshot
RemainAfterExit=yes
ExecStart={bin} start
ExecStop={bin} stop

[Install]
WantedBy=multi-user.target
",
        bin = binary.display()
    )
}

/// Host path of the unit file
pub fn unit_path(ctx: &ProvisionContext) -> PathBuf {
    ctx.paths().host("/etc/systemd/system").join(UNIT)
}

/// Starts and stops the enabled runtime services as one unit
pub struct Supervisor<'a> {
    ctx: &'a ProvisionContext,
    enabled: Vec<ComponentId>,
}

impl<'a> Supervisor<'a> {
    /// Supervisor for the components enabled in the context's configuration
    pub fn new(ctx: &'a ProvisionContext) -> Result<Self> {
        let plan = Plan::build(ctx.config())?;
        let enabled = START_ORDER
            .into_iter()
            .filter(|id| plan.is_enabled(*id))
            .collect();
        Ok(Self { ctx, enabled })
    }

    /// Components in start order
    pub fn services(&self) -> &[ComponentId] {
        &self.enabled
    }

    /// Start panel services, then ancillary services
    pub async fn start_all(&self) -> Result<()> {
        for id in &self.enabled {
            info!("Starting {}", id);
            component(*id).start(self.ctx).await?;
        }
        Ok(())
    }

    /// Stop in reverse start order; every service is attempted
    pub async fn stop_all(&self) -> Result<()> {
        let mut first_error = None;
        for id in self.enabled.iter().rev() {
            info!("Stopping {}", id);
            if let Err(e) = component(*id).stop(self.ctx).await {
                warn!("Failed to stop {}: {}", id, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Status of every supervised component
    pub async fn status(&self) -> Result<Vec<(ComponentId, ComponentStatus)>> {
        let mut statuses = Vec::new();
        for id in &self.enabled {
            statuses.push((*id, component(*id).status(self.ctx).await?));
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_is_oneshot() {
        let unit = render_unit(Path::new("/usr/local/bin/panelo"));
        assert!(unit.contains("Type=oneshot\n"));
        assert!(unit.contains("RemainAfterExit=yes\n"));
        assert!(unit.contains("ExecStart=/usr/local/bin/panelo start\n"));
        assert!(unit.contains("ExecStop=/usr/local/bin/panelo stop\n"));
    }
}
