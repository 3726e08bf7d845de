//! Per-kind application runtimes

use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::docker;
use crate::reconciler::{FileSet, StepRecorder};
use crate::templates::AppTemplate;
use crate::Result;
use async_trait::async_trait;
use panelo_config::AppKind;

/// Deployment template of one application kind
pub struct RuntimeComponent {
    kind: AppKind,
}

impl RuntimeComponent {
    /// Runtime for `kind`
    pub fn new(kind: AppKind) -> Self {
        Self { kind }
    }

    fn files(&self, ctx: &ProvisionContext) -> Result<FileSet> {
        let dir = ctx.paths().install("templates").join(self.kind.as_str());
        let template = AppTemplate::default_for(self.kind);
        let mut files = FileSet::new().file(dir.join("template.json"), template.manifest(), 0o644);
        for variant in AppTemplate::variants(self.kind) {
            let template = AppTemplate::resolve(self.kind, Some(variant), None)?;
            if let Some(dockerfile) = template.dockerfile() {
                files.insert(dir.join(format!("Dockerfile.{}", variant)), dockerfile, 0o644);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl Component for RuntimeComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Runtime(self.kind)
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        let template = AppTemplate::default_for(self.kind);
        if !docker::has_image(ctx, template.base_image()).await {
            return Ok(ComponentState::Absent);
        }
        if !self.files(ctx)?.diff()?.is_empty() {
            return Ok(ComponentState::Drifted("template files differ".to_string()));
        }
        Ok(ComponentState::Present)
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        let template = AppTemplate::default_for(self.kind);
        docker::ensure_image(ctx, template.base_image(), rec).await?;
        self.files(ctx)?.apply(rec)?;
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
