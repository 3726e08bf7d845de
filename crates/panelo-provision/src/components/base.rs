//! Base packages every host needs

use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::packages;
use crate::reconciler::StepRecorder;
use crate::Result;
use async_trait::async_trait;

/// OS packages every other component relies on
pub struct BaseComponent;

impl BaseComponent {
    /// Packages for the host's OS family
    pub fn packages(ctx: &ProvisionContext) -> Vec<&'static str> {
        vec!["curl", "git", "fail2ban", ctx.env().os.firewall_package()]
    }
}

#[async_trait]
impl Component for BaseComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Base
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        let wanted = Self::packages(ctx);
        let missing = packages::missing(ctx, &wanted).await;
        Ok(if missing.is_empty() {
            ComponentState::Present
        } else if missing.len() == wanted.len() {
            ComponentState::Absent
        } else {
            ComponentState::Drifted(format!("missing {}", missing.join(", ")))
        })
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        packages::ensure_installed(ctx, &Self::packages(ctx), rec).await?;
        Ok(rec.outcome())
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        Ok(match self.inspect(ctx).await? {
            ComponentState::Present => ComponentStatus::Installed,
            ComponentState::Absent => ComponentStatus::NotInstalled,
            ComponentState::Drifted(reason) => ComponentStatus::Degraded(reason),
        })
    }
}
