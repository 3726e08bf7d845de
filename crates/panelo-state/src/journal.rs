//! Provisioning journal
//!
//! Every provisioning run is recorded as a [`ProvisionRun`]: one
//! [`StepRecord`] per component with its outcome and the compensating
//! [`UndoAction`]s for whatever the step changed. Runs are stored as one JSON
//! document per run so that a failed or unwanted run can be rolled back later.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Compensating action for one recorded change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UndoAction {
    /// Put back the previous contents of an overwritten file
    RestoreFile {
        /// File path on the host
        path: PathBuf,
        /// Contents before the change
        previous: String,
        /// Permission bits before the change
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<u32>,
    },
    /// Delete a file the run created
    RemoveFile {
        /// File path on the host
        path: PathBuf,
    },
    /// Force-remove a container the run created
    RemoveContainer {
        /// Container name
        name: String,
    },
    /// Remove a container network the run created
    RemoveNetwork {
        /// Network name
        name: String,
    },
    /// Uninstall packages the run installed
    RemovePackages {
        /// Package names
        packages: Vec<String>,
    },
    /// Close a firewall port the run opened
    CloseFirewallPort {
        /// TCP port
        port: u16,
    },
    /// Disable a systemd unit the run enabled
    DisableUnit {
        /// Unit name
        unit: String,
    },
}

impl UndoAction {
    /// Short human-readable description
    pub fn describe(&self) -> String {
        match self {
            UndoAction::RestoreFile { path, .. } => format!("restore {}", path.display()),
            UndoAction::RemoveFile { path } => format!("remove {}", path.display()),
            UndoAction::RemoveContainer { name } => format!("remove container {}", name),
            UndoAction::RemoveNetwork { name } => format!("remove network {}", name),
            UndoAction::RemovePackages { packages } => {
                format!("remove packages {}", packages.join(" "))
            }
            UndoAction::CloseFirewallPort { port } => format!("close port {}", port),
            UndoAction::DisableUnit { unit } => format!("disable {}", unit),
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Desired state was already present
    Unchanged,
    /// The step changed the host
    Changed {
        /// What changed
        summary: String,
    },
    /// The step did not run
    Skipped {
        /// Why
        reason: String,
    },
    /// The step failed
    Failed {
        /// Error message
        error: String,
    },
}

impl StepOutcome {
    /// Short label used in tables
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Unchanged => "unchanged",
            StepOutcome::Changed { .. } => "changed",
            StepOutcome::Skipped { .. } => "skipped",
            StepOutcome::Failed { .. } => "failed",
        }
    }

    /// Detail text (summary, reason or error)
    pub fn detail(&self) -> &str {
        match self {
            StepOutcome::Unchanged => "",
            StepOutcome::Changed { summary } => summary,
            StepOutcome::Skipped { reason } => reason,
            StepOutcome::Failed { error } => error,
        }
    }
}

/// Record of one component step within a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    /// Component id
    pub component: String,
    /// Outcome
    pub outcome: StepOutcome,
    /// When the step started
    pub started_at: DateTime<Utc>,
    /// When the step finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Undo actions in the order the changes were made
    #[serde(default)]
    pub undo: Vec<UndoAction>,
}

/// Overall run status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is in progress (or the process died mid-run)
    InProgress,
    /// Every step succeeded
    Succeeded,
    /// A step failed and changes were left in place
    Failed {
        /// Error message
        error: String,
    },
    /// Changes of the run were undone
    RolledBack {
        /// Error that triggered the rollback, if any
        error: Option<String>,
    },
}

impl RunStatus {
    /// Short label used in tables
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in-progress",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed { .. } => "failed",
            RunStatus::RolledBack { .. } => "rolled-back",
        }
    }
}

/// One provisioning run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionRun {
    /// Unique run id
    pub id: Uuid,
    /// What the run was (`install`, `component web-server install`, ...)
    pub label: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Status
    pub status: RunStatus,
    /// Step records in execution order
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl ProvisionRun {
    /// Start a new run
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::InProgress,
            steps: Vec::new(),
        }
    }

    /// Append a finished step
    pub fn record(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    /// Mark the run finished
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Undo actions of the whole run, most recent first
    pub fn undo_plan(&self) -> Vec<UndoAction> {
        self.steps
            .iter()
            .rev()
            .flat_map(|step| step.undo.iter().rev().cloned())
            .collect()
    }

    /// Number of steps that changed the host
    pub fn changed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Changed { .. }))
            .count()
    }
}

/// Directory of run documents
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    /// Journal stored in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Journal directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write (or overwrite) a run document
    pub fn save(&self, run: &ProvisionRun) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(run)?;
        crate::store::write_atomic(&self.dir, &self.path_for(&run.id), &json)?;
        debug!("Journaled run {} ({})", run.id, run.status.label());
        Ok(())
    }

    /// Load a run by id or unique id prefix
    pub fn load(&self, id: &str) -> Result<ProvisionRun> {
        if let Ok(uuid) = Uuid::parse_str(id) {
            let path = self.path_for(&uuid);
            if path.exists() {
                return Ok(serde_json::from_slice(&fs::read(path)?)?);
            }
            return Err(Error::RunNotFound(id.to_string()));
        }

        let mut matches = self
            .list()?
            .into_iter()
            .filter(|run| run.id.to_string().starts_with(id));
        match (matches.next(), matches.next()) {
            (Some(run), None) if !id.is_empty() => Ok(run),
            _ => Err(Error::RunNotFound(id.to_string())),
        }
    }

    /// All runs, oldest first
    pub fn list(&self) -> Result<Vec<ProvisionRun>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| serde_json::from_slice::<ProvisionRun>(&bytes).map_err(Error::from))
            {
                Ok(run) => runs.push(run),
                Err(e) => warn!("Skipping unreadable journal entry {}: {}", path.display(), e),
            }
        }
        runs.sort_by_key(|run| run.started_at);
        Ok(runs)
    }

    /// Most recent run
    pub fn latest(&self) -> Result<Option<ProvisionRun>> {
        Ok(self.list()?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn step(component: &str, undo: Vec<UndoAction>) -> StepRecord {
        StepRecord {
            component: component.to_string(),
            outcome: StepOutcome::Changed {
                summary: "wrote files".to_string(),
            },
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            undo,
        }
    }

    #[test]
    fn test_undo_plan_is_reverse_order() {
        let mut run = ProvisionRun::new("install");
        run.record(step(
            "base",
            vec![UndoAction::RemovePackages {
                packages: vec!["git".to_string()],
            }],
        ));
        run.record(step(
            "web-server",
            vec![
                UndoAction::RemoveFile {
                    path: "/etc/nginx/sites-available/default".into(),
                },
                UndoAction::DisableUnit {
                    unit: "nginx".to_string(),
                },
            ],
        ));

        let plan = run.undo_plan();
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan[0],
            UndoAction::DisableUnit {
                unit: "nginx".to_string()
            }
        );
        assert!(matches!(plan[2], UndoAction::RemovePackages { .. }));
        assert_eq!(run.changed_steps(), 2);
    }

    #[test]
    fn test_save_load_and_prefix_lookup() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::new(dir.path().join("journal"));
        assert!(journal.list().unwrap().is_empty());

        let mut run = ProvisionRun::new("install");
        run.record(step(
            "database",
            vec![UndoAction::RemoveContainer {
                name: "panelo-mysql".to_string(),
            }],
        ));
        run.finish(RunStatus::Succeeded);
        journal.save(&run).unwrap();

        let loaded = journal.load(&run.id.to_string()).unwrap();
        assert_eq!(loaded, run);

        let prefix = &run.id.to_string()[..8];
        assert_eq!(journal.load(prefix).unwrap().id, run.id);
        assert_eq!(journal.latest().unwrap().unwrap().id, run.id);
    }

    #[test]
    fn test_missing_run_is_an_error() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::new(dir.path());
        assert!(matches!(
            journal.load(&Uuid::new_v4().to_string()),
            Err(Error::RunNotFound(_))
        ));
        assert!(matches!(journal.load("abc"), Err(Error::RunNotFound(_))));
    }
}
