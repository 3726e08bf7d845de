//! Nightly database and application backup schedule

use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::reconciler::{FileSet, StepRecorder};
use crate::Result;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;

/// Nightly `panelo backup run`
pub struct BackupComponent;

fn cron_path(ctx: &ProvisionContext) -> PathBuf {
    ctx.paths().host("/etc/cron.d/panelo-backup")
}

fn cron(ctx: &ProvisionContext) -> String {
    super::cron_entry(ctx, "0 2 * * *", "backup run", "/var/log/panelo-backup.log")
}

#[async_trait]
impl Component for BackupComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Backup
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        if !cron_path(ctx).exists() {
            return Ok(ComponentState::Absent);
        }
        let deltas = FileSet::new().file(cron_path(ctx), cron(ctx), 0o644).diff()?;
        Ok(if deltas.is_empty() && ctx.paths().backups_dir().is_dir() {
            ComponentState::Present
        } else {
            ComponentState::Drifted("backup schedule differs".to_string())
        })
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        let dir = ctx.paths().backups_dir();
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            rec.note(format!("created {}", dir.display()));
        }
        FileSet::ensure(cron_path(ctx), cron(ctx), 0o644, rec)?;
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
