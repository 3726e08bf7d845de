//! Host firewall rules

use super::{filebrowser, monitoring, web_server};
use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::firewall;
use crate::plan::Plan;
use crate::reconciler::StepRecorder;
use crate::Result;
use async_trait::async_trait;
use panelo_config::Config;
use std::collections::BTreeSet;

/// SSH and web traffic
const ALWAYS_OPEN: [u16; 3] = [22, 80, 443];

/// Inbound rules for the panel, its services and deployed applications
pub struct FirewallComponent;

/// Ports of the components the plan runs
pub fn component_ports(config: &Config) -> Result<BTreeSet<u16>> {
    let plan = Plan::build(config)?;
    let mut ports: BTreeSet<u16> = ALWAYS_OPEN.into_iter().collect();
    if plan.is_enabled(ComponentId::Panel) {
        ports.extend([web_server::DASHBOARD_PORT, web_server::API_PORT]);
    }
    if plan.is_enabled(ComponentId::Filebrowser) {
        ports.insert(filebrowser::PORT);
    }
    if plan.is_enabled(ComponentId::Monitoring) {
        ports.extend([monitoring::PROMETHEUS_PORT, monitoring::ALERTMANAGER_PORT]);
    }
    Ok(ports)
}

/// Whether the plan manages the firewall at all
pub fn managed(config: &Config) -> Result<bool> {
    Ok(Plan::build(config)?.is_enabled(ComponentId::Firewall))
}

/// Every port that should be open, including allocated application ports
pub fn wanted_ports(ctx: &ProvisionContext) -> Result<BTreeSet<u16>> {
    let mut ports = component_ports(ctx.config())?;
    let state = ctx.store().load()?;
    ports.extend(state.ports.all_allocations().values().copied());
    Ok(ports)
}

#[async_trait]
impl Component for FirewallComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Firewall
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        let wanted = wanted_ports(ctx)?;
        let open = firewall::open_ports(ctx).await?;
        let missing: Vec<String> = wanted.difference(&open).map(u16::to_string).collect();
        Ok(if missing.is_empty() {
            ComponentState::Present
        } else if open.is_empty() {
            ComponentState::Absent
        } else {
            ComponentState::Drifted(format!("ports {} closed", missing.join(", ")))
        })
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        firewall::ensure_open(ctx, &wanted_ports(ctx)?, rec).await?;
        Ok(rec.outcome())
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        Ok(match self.inspect(ctx).await? {
            ComponentState::Present => ComponentStatus::Running,
            ComponentState::Absent => ComponentStatus::NotInstalled,
            ComponentState::Drifted(reason) => ComponentStatus::Degraded(reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_ports_follow_toggles() {
        let mut config = Config::default();
        let ports = component_ports(&config).unwrap();
        assert!(ports.is_superset(&[22, 80, 443, 3000, 3001, 8080].into_iter().collect()));
        assert!(!ports.contains(&9090));

        config.components.monitoring = true;
        config.components.skip.push("filebrowser".to_string());
        let ports = component_ports(&config).unwrap();
        assert!(ports.contains(&9093));
        assert!(!ports.contains(&8080));
    }

    #[test]
    fn test_panel_ports_closed_when_panel_cannot_run() {
        let mut config = Config::default();
        config.components.skip.push("database".to_string());
        let ports = component_ports(&config).unwrap();
        assert!(!ports.contains(&web_server::DASHBOARD_PORT));
        assert!(!ports.contains(&web_server::API_PORT));
        assert!(ports.contains(&filebrowser::PORT));
        assert!(managed(&config).unwrap());

        config.components.skip.push("firewall".to_string());
        assert!(!managed(&config).unwrap());
    }
}
