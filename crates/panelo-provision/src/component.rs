//! Component contract

use crate::context::ProvisionContext;
use crate::reconciler::StepRecorder;
use crate::{Error, Result};
use async_trait::async_trait;
use panelo_config::AppKind;
use panelo_state::StepOutcome;
use std::fmt;
use std::str::FromStr;

/// Identifier of an installable component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentId {
    /// OS packages everything else needs
    Base,
    /// Container engine and the shared network
    ContainerRuntime,
    /// nginx or apache
    WebServer,
    /// MySQL or PostgreSQL container with the panel schema
    Database,
    /// Deployment template of one application kind
    Runtime(AppKind),
    /// Web file browser
    Filebrowser,
    /// Certificate issuance and renewal
    Ssl,
    /// Prometheus and Alertmanager
    Monitoring,
    /// Scheduled backups
    Backup,
    /// Placeholder API and dashboard
    Panel,
    /// Firewall rules
    Firewall,
    /// Top-level systemd unit
    Supervisor,
}

impl ComponentId {
    /// Every component in canonical order
    pub fn all() -> Vec<ComponentId> {
        let mut ids = vec![
            ComponentId::Base,
            ComponentId::ContainerRuntime,
            ComponentId::WebServer,
            ComponentId::Database,
        ];
        ids.extend(AppKind::ALL.iter().copied().map(ComponentId::Runtime));
        ids.extend([
            ComponentId::Filebrowser,
            ComponentId::Ssl,
            ComponentId::Monitoring,
            ComponentId::Backup,
            ComponentId::Panel,
            ComponentId::Firewall,
            ComponentId::Supervisor,
        ]);
        ids
    }

    /// Direct dependencies
    ///
    /// The supervisor depends on every other enabled component; the plan
    /// wires that edge since it depends on configuration.
    pub fn dependencies(&self) -> Vec<ComponentId> {
        use ComponentId::*;
        match self {
            Base | Supervisor => vec![],
            ContainerRuntime | WebServer | Firewall => vec![Base],
            Database | Filebrowser | Monitoring => vec![ContainerRuntime],
            Runtime(AppKind::Wordpress) => vec![ContainerRuntime, WebServer, Database],
            Runtime(_) => vec![ContainerRuntime, WebServer],
            Ssl => vec![WebServer],
            Backup => vec![Database],
            Panel => vec![ContainerRuntime, Database],
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Base => f.write_str("base"),
            ComponentId::ContainerRuntime => f.write_str("container-runtime"),
            ComponentId::WebServer => f.write_str("web-server"),
            ComponentId::Database => f.write_str("database"),
            ComponentId::Runtime(kind) => write!(f, "runtime:{}", kind),
            ComponentId::Filebrowser => f.write_str("filebrowser"),
            ComponentId::Ssl => f.write_str("ssl"),
            ComponentId::Monitoring => f.write_str("monitoring"),
            ComponentId::Backup => f.write_str("backup"),
            ComponentId::Panel => f.write_str("panel"),
            ComponentId::Firewall => f.write_str("firewall"),
            ComponentId::Supervisor => f.write_str("supervisor"),
        }
    }
}

impl FromStr for ComponentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        if let Some(kind) = lowered.strip_prefix("runtime:") {
            return kind
                .parse::<AppKind>()
                .map(ComponentId::Runtime)
                .map_err(|_| Error::NotFound(format!("component '{}'", s)));
        }
        ComponentId::all()
            .into_iter()
            .find(|id| id.to_string() == lowered)
            .ok_or_else(|| Error::NotFound(format!("component '{}'", s)))
    }
}

/// Observed installation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentState {
    /// Desired state is in place
    Present,
    /// Nothing installed yet
    Absent,
    /// Installed but differs from the desired state
    Drifted(String),
}

/// Result of an install step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing needed changing
    Unchanged,
    /// The host was changed
    Changed(String),
}

impl From<Outcome> for StepOutcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Unchanged => StepOutcome::Unchanged,
            Outcome::Changed(summary) => StepOutcome::Changed { summary },
        }
    }
}

/// Runtime status of a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentStatus {
    /// Long-running parts are up
    Running,
    /// Installed, not running
    Stopped,
    /// Installed; nothing long-running
    Installed,
    /// Not installed
    NotInstalled,
    /// Partially up
    Degraded(String),
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentStatus::Running => f.write_str("running"),
            ComponentStatus::Stopped => f.write_str("stopped"),
            ComponentStatus::Installed => f.write_str("installed"),
            ComponentStatus::NotInstalled => f.write_str("not installed"),
            ComponentStatus::Degraded(reason) => write!(f, "degraded ({})", reason),
        }
    }
}

/// One installable unit of host infrastructure
///
/// `install` on a component whose desired state is already present must
/// detect it and return [`Outcome::Unchanged`] without touching the host.
#[async_trait]
pub trait Component: Send + Sync {
    /// Component id
    fn id(&self) -> ComponentId;

    /// Direct dependencies
    fn depends_on(&self) -> Vec<ComponentId> {
        self.id().dependencies()
    }

    /// Compare the host with the desired state
    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState>;

    /// Bring the host to the desired state, recording undo actions
    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome>;

    /// Start long-running parts
    async fn start(&self, _ctx: &ProvisionContext) -> Result<()> {
        Ok(())
    }

    /// Stop long-running parts
    async fn stop(&self, _ctx: &ProvisionContext) -> Result<()> {
        Ok(())
    }

    /// Runtime status
    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip_through_strings() {
        for id in ComponentId::all() {
            assert_eq!(id.to_string().parse::<ComponentId>().unwrap(), id);
        }
        assert_eq!(
            "runtime:WordPress".parse::<ComponentId>().unwrap(),
            ComponentId::Runtime(AppKind::Wordpress)
        );
        assert!("runtime:ruby".parse::<ComponentId>().is_err());
        assert!("docker".parse::<ComponentId>().is_err());
    }

    #[test]
    fn test_wordpress_needs_database() {
        assert!(ComponentId::Runtime(AppKind::Wordpress)
            .dependencies()
            .contains(&ComponentId::Database));
        assert!(!ComponentId::Runtime(AppKind::Static)
            .dependencies()
            .contains(&ComponentId::Database));
    }
}
