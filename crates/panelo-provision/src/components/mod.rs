//! Installable components

mod backup;
mod base;
mod container_runtime;
pub mod database;
mod filebrowser;
pub mod firewall;
mod monitoring;
pub mod panel;
mod runtime;
mod ssl;
mod supervisor;
pub mod web_server;

pub use backup::BackupComponent;
pub use base::BaseComponent;
pub use container_runtime::ContainerRuntimeComponent;
pub use database::DatabaseComponent;
pub use filebrowser::FilebrowserComponent;
pub use firewall::FirewallComponent;
pub use monitoring::MonitoringComponent;
pub use panel::PanelComponent;
pub use runtime::RuntimeComponent;
pub use ssl::SslComponent;
pub use supervisor::SupervisorComponent;
pub use web_server::WebServerComponent;

use crate::component::{Component, ComponentStatus};
use crate::context::ProvisionContext;
use crate::host::docker;
use crate::Result;
use crate::component::ComponentId;

/// The component implementing `id`
pub fn component(id: ComponentId) -> Box<dyn Component> {
    match id {
        ComponentId::Base => Box::new(BaseComponent),
        ComponentId::ContainerRuntime => Box::new(ContainerRuntimeComponent),
        ComponentId::WebServer => Box::new(WebServerComponent),
        ComponentId::Database => Box::new(DatabaseComponent),
        ComponentId::Runtime(kind) => Box::new(RuntimeComponent::new(kind)),
        ComponentId::Filebrowser => Box::new(FilebrowserComponent),
        ComponentId::Ssl => Box::new(SslComponent),
        ComponentId::Monitoring => Box::new(MonitoringComponent),
        ComponentId::Backup => Box::new(BackupComponent),
        ComponentId::Panel => Box::new(PanelComponent),
        ComponentId::Firewall => Box::new(FirewallComponent),
        ComponentId::Supervisor => Box::new(SupervisorComponent),
    }
}

/// Aggregate status of a group of containers
pub(crate) async fn containers_status(
    ctx: &ProvisionContext,
    names: &[&str],
) -> Result<ComponentStatus> {
    let mut running = Vec::new();
    let mut missing = Vec::new();
    for name in names {
        match docker::container_state(ctx, name).await? {
            Some(state) if state.is_running => running.push(*name),
            Some(_) => {}
            None => missing.push(*name),
        }
    }

    Ok(if running.len() == names.len() {
        ComponentStatus::Running
    } else if missing.len() == names.len() {
        ComponentStatus::NotInstalled
    } else if running.is_empty() && missing.is_empty() {
        ComponentStatus::Stopped
    } else {
        let down: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| !running.contains(name))
            .collect();
        ComponentStatus::Degraded(format!("{} not running", down.join(", ")))
    })
}

/// Cron line running `panelo <args>` as root
pub(crate) fn cron_entry(ctx: &ProvisionContext, schedule: &str, args: &str, log: &str) -> String {
    format!(
        "# Managed by panelo\nSHELL=/bin/sh\nPATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin\n\
         {} root {} {} >> {} 2>&1\n",
        schedule,
        ctx.binary().display(),
        args,
        log
    )
}
