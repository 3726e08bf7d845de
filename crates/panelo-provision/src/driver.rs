//! Sequential driver executing a plan with journaling and rollback

use crate::component::ComponentId;
use crate::components::component;
use crate::context::ProvisionContext;
use crate::credentials;
use crate::host::{docker, firewall, packages, systemd};
use crate::plan::{Plan, StepStatus};
use crate::reconciler::{StepRecorder, write_file};
use crate::{Error, Result};
use chrono::Utc;
use command_executor::Command;
use panelo_state::{ProvisionRun, RunStatus, StepOutcome, StepRecord, UndoAction};
use std::fs;
use std::io::ErrorKind;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of one step as reported to callers
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Component
    pub id: ComponentId,
    /// Outcome
    pub outcome: StepOutcome,
}

/// Result of a driver run
#[derive(Debug)]
pub struct RunReport {
    /// Journal id of the run
    pub run_id: Uuid,
    /// Steps in execution order
    pub steps: Vec<StepReport>,
    /// Final run status
    pub status: RunStatus,
    /// Whether the credentials file was written by this run
    pub credentials_written: bool,
    /// The failing step and its error
    pub failure: Option<(ComponentId, Error)>,
}

impl RunReport {
    /// Whether every step completed
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Whether no step changed the host
    pub fn unchanged(&self) -> bool {
        self.steps
            .iter()
            .all(|step| !matches!(step.outcome, StepOutcome::Changed { .. } | StepOutcome::Failed { .. }))
    }

    /// Convert a failed run into the step's error
    pub fn into_result(mut self) -> Result<Self> {
        match self.failure.take() {
            None => Ok(self),
            Some((id, source)) => Err(Error::Step {
                component: id.to_string(),
                source: Box::new(source),
            }),
        }
    }
}

/// Result of replaying a run's undo actions
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Undo actions applied successfully
    pub applied: Vec<String>,
    /// Undo actions that failed, with the error
    pub failed: Vec<(String, String)>,
}

type StepObserver<'a> = Box<dyn FnMut(&StepReport) + Send + 'a>;

/// Executes provisioning steps in plan order
pub struct Driver<'a> {
    ctx: &'a ProvisionContext,
    observer: Option<StepObserver<'a>>,
}

impl<'a> Driver<'a> {
    /// Driver over `ctx`
    pub fn new(ctx: &'a ProvisionContext) -> Self {
        Self { ctx, observer: None }
    }

    /// Call `observer` after every step
    pub fn on_step(mut self, observer: impl FnMut(&StepReport) + Send + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Run the full plan; the credentials file is written after a successful run
    pub async fn run(&mut self) -> Result<RunReport> {
        let plan = Plan::build(self.ctx.config())?;
        let steps = plan
            .steps()
            .iter()
            .map(|step| (step.id, step.status.clone()))
            .collect();
        let mut report = self.execute("install", steps).await?;

        if report.succeeded() {
            let mut rec = StepRecorder::new();
            report.credentials_written = credentials::write_credentials_once(self.ctx, &mut rec)?;
        }
        Ok(report)
    }

    /// Install a single component as its own journaled run
    pub async fn install_component(&mut self, id: ComponentId) -> Result<RunReport> {
        let plan = Plan::build(self.ctx.config())?;
        match plan.step(id).map(|step| &step.status) {
            Some(StepStatus::Enabled) => {}
            Some(StepStatus::Skipped(reason)) => {
                return Err(Error::Disabled(format!("{} ({})", id, reason)));
            }
            None => return Err(Error::Disabled(id.to_string())),
        }
        self.execute(&format!("component {} install", id), vec![(id, StepStatus::Enabled)])
            .await
    }

    async fn execute(
        &mut self,
        label: &str,
        steps: Vec<(ComponentId, StepStatus)>,
    ) -> Result<RunReport> {
        let ctx = self.ctx;
        let _lock = ctx.lock()?;
        let journal = ctx.journal();

        let mut run = ProvisionRun::new(label);
        journal.save(&run)?;
        info!("Starting run {} ({})", run.id, label);

        let mut reports = Vec::new();
        let mut failure = None;

        for (id, status) in steps {
            let started_at = Utc::now();
            if let StepStatus::Skipped(reason) = status {
                info!("Skipping {}: {}", id, reason);
                let outcome = StepOutcome::Skipped { reason };
                run.record(StepRecord {
                    component: id.to_string(),
                    outcome: outcome.clone(),
                    started_at,
                    finished_at: Some(Utc::now()),
                    undo: Vec::new(),
                });
                self.report(&mut reports, id, outcome);
                continue;
            }

            info!("Installing {}", id);
            let mut rec = StepRecorder::new();
            let result = component(id).install(ctx, &mut rec).await;
            let undo = rec.take_undo();

            let outcome = match &result {
                Ok(outcome) => StepOutcome::from(outcome.clone()),
                Err(e) => StepOutcome::Failed {
                    error: e.to_string(),
                },
            };
            run.record(StepRecord {
                component: id.to_string(),
                outcome: outcome.clone(),
                started_at,
                finished_at: Some(Utc::now()),
                undo,
            });
            journal.save(&run)?;
            self.report(&mut reports, id, outcome);

            if let Err(e) = result {
                error!("{} failed: {}", id, e);
                failure = Some((id, e));
                break;
            }
        }

        let status = match &failure {
            None => RunStatus::Succeeded,
            Some((id, e)) if ctx.config().settings.rollback_on_failure => {
                warn!("Rolling back changes of run {}", run.id);
                let rollback = self.undo(&run.undo_plan()).await;
                if !rollback.failed.is_empty() {
                    warn!("{} undo actions failed", rollback.failed.len());
                }
                RunStatus::RolledBack {
                    error: Some(format!("{}: {}", id, e)),
                }
            }
            Some((id, e)) => RunStatus::Failed {
                error: format!("{}: {}", id, e),
            },
        };
        run.finish(status.clone());
        journal.save(&run)?;
        info!("Run {} finished: {}", run.id, status.label());

        Ok(RunReport {
            run_id: run.id,
            steps: reports,
            status,
            credentials_written: false,
            failure,
        })
    }

    fn report(&mut self, reports: &mut Vec<StepReport>, id: ComponentId, outcome: StepOutcome) {
        let report = StepReport { id, outcome };
        if let Some(observer) = self.observer.as_mut() {
            observer(&report);
        }
        reports.push(report);
    }

    /// Replay the undo actions of a recorded run
    pub async fn rollback(&mut self, run: &str) -> Result<RollbackReport> {
        let ctx = self.ctx;
        let _lock = ctx.lock()?;
        let journal = ctx.journal();
        let mut recorded = journal.load(run)?;

        if matches!(recorded.status, RunStatus::RolledBack { .. }) {
            info!("Run {} is already rolled back", recorded.id);
            return Ok(RollbackReport::default());
        }

        let report = self.undo(&recorded.undo_plan()).await;
        let error = match &recorded.status {
            RunStatus::Failed { error } => Some(error.clone()),
            _ => None,
        };
        recorded.finish(RunStatus::RolledBack { error });
        journal.save(&recorded)?;
        Ok(report)
    }

    /// Apply undo actions in the given order, continuing past failures
    async fn undo(&self, actions: &[UndoAction]) -> RollbackReport {
        let mut report = RollbackReport::default();
        for action in actions {
            let description = action.describe();
            match apply_undo(self.ctx, action).await {
                Ok(()) => {
                    info!("Undone: {}", description);
                    report.applied.push(description);
                }
                Err(e) => {
                    warn!("Undo failed ({}): {}", description, e);
                    report.failed.push((description, e.to_string()));
                }
            }
        }
        report
    }
}

/// Apply one compensating action
pub async fn apply_undo(ctx: &ProvisionContext, action: &UndoAction) -> Result<()> {
    match action {
        UndoAction::RestoreFile {
            path,
            previous,
            mode,
        } => write_file(path, previous, mode.unwrap_or(0o644)),
        UndoAction::RemoveFile { path } => match fs::remove_file(path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        },
        UndoAction::RemoveContainer { name } => docker::remove_container(ctx, name).await,
        UndoAction::RemoveNetwork { name } => {
            let cmd = Command::builder("docker")
                .args(["network", "rm", name.as_str()])
                .build();
            ctx.run(&cmd).await.map(|_| ())
        }
        UndoAction::RemovePackages { packages: list } => ctx
            .run(&packages::remove_command(ctx.env().os, list))
            .await
            .map(|_| ()),
        UndoAction::CloseFirewallPort { port } => {
            for cmd in firewall::close_commands(ctx.env().os, *port) {
                ctx.run(&cmd).await?;
            }
            Ok(())
        }
        UndoAction::DisableUnit { unit } => ctx
            .run(&systemd::disable_command(unit))
            .await
            .map(|_| ()),
    }
}
