//! Prometheus and Alertmanager containers

use super::web_server::API_PORT;
use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::docker::{self, ContainerSpec};
use crate::reconciler::{FileSet, StepRecorder};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;

const PROMETHEUS: &str = "panelo-prometheus";
const ALERTMANAGER: &str = "panelo-alertmanager";

/// Host port of Prometheus
pub const PROMETHEUS_PORT: u16 = 9090;

/// Host port of Alertmanager
pub const ALERTMANAGER_PORT: u16 = 9093;

/// Prometheus and Alertmanager on the shared network
pub struct MonitoringComponent;

fn prometheus_config() -> String {
    format!(
        "# Managed by panelo
global:
  scrape_interval: 15s
  evaluation_interval: 15s

alerting:
  alertmanagers:
    - static_configs:
        - targets: [\"{ALERTMANAGER}:{ALERTMANAGER_PORT}\"]

scrape_configs:
  - job_name: prometheus
    static_configs:
      - targets: [\"localhost:{PROMETHEUS_PORT}\"]
  - job_name: panelo-api
    metrics_path: /api/health
    static_configs:
      - targets: [\"panelo-api:{API_PORT}\"]
"
    )
}

fn alertmanager_config() -> String {
    "# Managed by panelo
route:
  receiver: default
  group_wait: 30s
  repeat_interval: 4h

receivers:
  - name: default
"
    .to_string()
}

fn config_dir(ctx: &ProvisionContext) -> PathBuf {
    ctx.paths().install("monitoring")
}

fn files(ctx: &ProvisionContext) -> FileSet {
    let dir = config_dir(ctx);
    FileSet::new()
        .file(dir.join("prometheus.yml"), prometheus_config(), 0o644)
        .file(dir.join("alertmanager.yml"), alertmanager_config(), 0o644)
}

fn specs(ctx: &ProvisionContext) -> [ContainerSpec; 2] {
    let dir = config_dir(ctx);
    let network = ctx.config().settings.network.clone();
    [
        ContainerSpec::new(PROMETHEUS, "prom/prometheus:latest")
            .network(network.clone())
            .publish(format!("{0}:{0}", PROMETHEUS_PORT))
            .volume(dir.join("prometheus.yml"), "/etc/prometheus/prometheus.yml:ro"),
        ContainerSpec::new(ALERTMANAGER, "prom/alertmanager:latest")
            .network(network)
            .publish(format!("{0}:{0}", ALERTMANAGER_PORT))
            .volume(dir.join("alertmanager.yml"), "/etc/alertmanager/alertmanager.yml:ro"),
    ]
}

#[async_trait]
impl Component for MonitoringComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Monitoring
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        if !files(ctx).diff()?.is_empty() {
            return Ok(ComponentState::Drifted("configuration differs".to_string()));
        }
        Ok(match self.status(ctx).await? {
            ComponentStatus::Running => ComponentState::Present,
            ComponentStatus::NotInstalled => ComponentState::Absent,
            other => ComponentState::Drifted(other.to_string()),
        })
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        let changed: Vec<PathBuf> = files(ctx)
            .apply(rec)?
            .iter()
            .map(|delta| delta.path().to_path_buf())
            .collect();

        for spec in specs(ctx) {
            docker::ensure_image(ctx, &spec.image, rec).await?;
            let created = docker::ensure_container(ctx, &spec, rec).await?;
            // Bind-mounted configuration is only read at startup
            let reconfigured = spec
                .volumes
                .iter()
                .any(|(host, _)| changed.contains(host));
            if reconfigured && !created {
                docker::restart_container(ctx, &spec.name).await?;
                rec.note(format!("restarted {}", spec.name));
            }
        }
        Ok(rec.outcome())
    }

    async fn start(&self, ctx: &ProvisionContext) -> Result<()> {
        for name in [PROMETHEUS, ALERTMANAGER] {
            docker::start_container(ctx, name).await?;
        }
        Ok(())
    }

    async fn stop(&self, ctx: &ProvisionContext) -> Result<()> {
        for name in [ALERTMANAGER, PROMETHEUS] {
            docker::stop_container(ctx, name).await?;
        }
        Ok(())
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        super::containers_status(ctx, &[PROMETHEUS, ALERTMANAGER]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_targets_alertmanager() {
        let config = prometheus_config();
        assert!(config.contains("panelo-alertmanager:9093"));
        assert!(config.contains("localhost:9090"));
    }
}
