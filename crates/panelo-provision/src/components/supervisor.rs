//! systemd unit that brings the panel up at boot

use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::systemd;
use crate::reconciler::{FileSet, StepRecorder};
use crate::supervisor::{UNIT, render_unit, unit_path};
use crate::Result;
use async_trait::async_trait;

/// The `panelo.service` unit
pub struct SupervisorComponent;

#[async_trait]
impl Component for SupervisorComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Supervisor
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        let path = unit_path(ctx);
        if !path.exists() {
            return Ok(ComponentState::Absent);
        }
        let deltas = FileSet::new()
            .file(&path, render_unit(ctx.binary()), 0o644)
            .diff()?;
        if !deltas.is_empty() {
            return Ok(ComponentState::Drifted("unit file differs".to_string()));
        }
        if !systemd::is_enabled(ctx, UNIT).await {
            return Ok(ComponentState::Drifted(format!("{} is not enabled", UNIT)));
        }
        Ok(ComponentState::Present)
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        if FileSet::ensure(unit_path(ctx), render_unit(ctx.binary()), 0o644, rec)? {
            systemd::daemon_reload(ctx).await?;
        }
        systemd::enable(ctx, UNIT, rec).await?;
        Ok(rec.outcome())
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        Ok(match self.inspect(ctx).await? {
            ComponentState::Present if systemd::is_active(ctx, UNIT).await => {
                ComponentStatus::Running
            }
            ComponentState::Present => ComponentStatus::Installed,
            ComponentState::Absent => ComponentStatus::NotInstalled,
            ComponentState::Drifted(reason) => ComponentStatus::Degraded(reason),
        })
    }
}
