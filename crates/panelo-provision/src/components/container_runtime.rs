//! Docker engine installation and service

use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::{docker, systemd};
use crate::reconciler::StepRecorder;
use crate::Result;
use async_trait::async_trait;
use command_executor::Command;
use panelo_state::UndoAction;
use tracing::info;

const INSTALL_SCRIPT: &str = "curl -fsSL https://get.docker.com | sh";

/// Packages the convenience script installs
const ENGINE_PACKAGES: &[&str] = &["docker-ce", "docker-ce-cli", "containerd.io"];

/// Docker engine and the shared container network
pub struct ContainerRuntimeComponent;

#[async_trait]
impl Component for ContainerRuntimeComponent {
    fn id(&self) -> ComponentId {
        ComponentId::ContainerRuntime
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        if !docker::is_installed(ctx).await {
            return Ok(ComponentState::Absent);
        }
        let network = &ctx.config().settings.network;
        let mut inspect = Command::new("docker");
        inspect.args(["network", "inspect", network.as_str()]);
        if !ctx.probe(&inspect).await {
            return Ok(ComponentState::Drifted(format!("network {} missing", network)));
        }
        if !systemd::is_active(ctx, "docker").await {
            return Ok(ComponentState::Drifted("docker is not running".to_string()));
        }
        Ok(ComponentState::Present)
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        let fresh = !docker::is_installed(ctx).await;
        if fresh {
            info!("Installing docker");
            ctx.run(&Command::shell(INSTALL_SCRIPT)).await?;
            rec.changed(
                "installed docker",
                Some(UndoAction::RemovePackages {
                    packages: ENGINE_PACKAGES.iter().map(|p| p.to_string()).collect(),
                }),
            );
        }

        systemd::enable_now(ctx, "docker", rec).await?;

        if fresh {
            let mut smoke = Command::new("docker");
            smoke.args(["run", "--rm", "hello-world"]);
            ctx.run(&smoke).await?;
            info!("Docker smoke test passed");
        }

        let settings = &ctx.config().settings;
        docker::ensure_network(ctx, &settings.network, &settings.network_subnet, rec).await?;
        Ok(rec.outcome())
    }

    async fn start(&self, ctx: &ProvisionContext) -> Result<()> {
        systemd::start(ctx, "docker").await
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        if !docker::is_installed(ctx).await {
            return Ok(ComponentStatus::NotInstalled);
        }
        Ok(if systemd::is_active(ctx, "docker").await {
            ComponentStatus::Running
        } else {
            ComponentStatus::Stopped
        })
    }
}
