//! File browser container

use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::docker::{self, ContainerSpec};
use crate::reconciler::StepRecorder;
use crate::Result;
use async_trait::async_trait;
use std::fs;

const CONTAINER: &str = "panelo-filebrowser";
const IMAGE: &str = "filebrowser/filebrowser:latest";

/// Host port of the file browser
pub const PORT: u16 = 8080;

/// Web file browser over the per-user data directories
pub struct FilebrowserComponent;

fn spec(ctx: &ProvisionContext) -> ContainerSpec {
    ContainerSpec::new(CONTAINER, IMAGE)
        .network(ctx.config().settings.network.clone())
        .publish(format!("{}:80", PORT))
        .volume(ctx.paths().data("users"), "/srv")
}

#[async_trait]
impl Component for FilebrowserComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Filebrowser
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        Ok(match docker::container_state(ctx, CONTAINER).await? {
            None => ComponentState::Absent,
            Some(state) if state.is_running => ComponentState::Present,
            Some(state) => ComponentState::Drifted(format!("{} is {}", CONTAINER, state.state)),
        })
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        let spec = spec(ctx);
        fs::create_dir_all(ctx.paths().data("users"))?;
        docker::ensure_image(ctx, &spec.image, rec).await?;
        docker::ensure_container(ctx, &spec, rec).await?;
        Ok(rec.outcome())
    }

    async fn start(&self, ctx: &ProvisionContext) -> Result<()> {
        docker::start_container(ctx, CONTAINER).await
    }

    async fn stop(&self, ctx: &ProvisionContext) -> Result<()> {
        docker::stop_container(ctx, CONTAINER).await
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        super::containers_status(ctx, &[CONTAINER]).await
    }
}
