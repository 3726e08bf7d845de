//! Desired-state file reconciler
//!
//! Generated configuration (virtual hosts, units, cron entries, templates,
//! build contexts) is declared as a [`FileSet`]: the full desired contents of
//! each file. Applying the set compares it with the disk and writes only the
//! files that differ, recording an undo action for every write so a failed
//! run can put the previous bytes back.

use crate::component::Outcome;
use crate::Result;
use indexmap::IndexMap;
use panelo_state::UndoAction;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Changes and undo actions accumulated by one step
#[derive(Debug, Default)]
pub struct StepRecorder {
    changes: Vec<String>,
    undo: Vec<UndoAction>,
}

impl StepRecorder {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a change and how to undo it
    pub fn changed(&mut self, summary: impl Into<String>, undo: Option<UndoAction>) {
        self.changes.push(summary.into());
        self.undo.extend(undo);
    }

    /// Note a change that has no undo action
    pub fn note(&mut self, summary: impl Into<String>) {
        self.changes.push(summary.into());
    }

    /// Changes so far
    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    /// Undo actions so far, in the order the changes were made
    pub fn undo(&self) -> &[UndoAction] {
        &self.undo
    }

    /// Take the undo actions
    pub fn take_undo(&mut self) -> Vec<UndoAction> {
        std::mem::take(&mut self.undo)
    }

    /// `Changed` with a summary of every change, or `Unchanged`
    pub fn outcome(&self) -> Outcome {
        if self.changes.is_empty() {
            Outcome::Unchanged
        } else {
            Outcome::Changed(self.changes.join("; "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Desired {
    Present { contents: String, mode: u32 },
    Absent,
}

/// One difference between a [`FileSet`] and the disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDelta {
    /// File does not exist yet
    Create(PathBuf),
    /// Contents differ
    Update(PathBuf),
    /// Only permissions differ
    Mode(PathBuf),
    /// File exists but should not
    Remove(PathBuf),
}

impl FileDelta {
    /// Affected path
    pub fn path(&self) -> &Path {
        match self {
            FileDelta::Create(p) | FileDelta::Update(p) | FileDelta::Mode(p) | FileDelta::Remove(p) => p,
        }
    }
}

/// Declared desired contents of a group of files
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    entries: IndexMap<PathBuf, Desired>,
}

impl FileSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a file with `contents` and permission bits `mode`
    pub fn file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>, mode: u32) -> Self {
        self.insert(path, contents, mode);
        self
    }

    /// Declare that a file must not exist
    pub fn absent(mut self, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(path.into(), Desired::Absent);
        self
    }

    /// Declare a file in place
    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>, mode: u32) {
        self.entries.insert(
            path.into(),
            Desired::Present {
                contents: contents.into(),
                mode,
            },
        );
    }

    /// Number of declared entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is declared
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Differences between the declaration and the disk
    pub fn diff(&self) -> Result<Vec<FileDelta>> {
        let mut deltas = Vec::new();
        for (path, desired) in &self.entries {
            let current = read_current(path)?;
            match (desired, current) {
                (Desired::Present { .. }, None) => deltas.push(FileDelta::Create(path.clone())),
                (Desired::Present { contents, mode }, Some((existing, existing_mode))) => {
                    if *contents != existing {
                        deltas.push(FileDelta::Update(path.clone()));
                    } else if *mode != existing_mode {
                        deltas.push(FileDelta::Mode(path.clone()));
                    }
                }
                (Desired::Absent, Some(_)) => deltas.push(FileDelta::Remove(path.clone())),
                (Desired::Absent, None) => {}
            }
        }
        Ok(deltas)
    }

    /// Apply only the differences, recording undo actions
    pub fn apply(&self, rec: &mut StepRecorder) -> Result<Vec<FileDelta>> {
        let deltas = self.diff()?;
        for delta in &deltas {
            let path = delta.path();
            let current = read_current(path)?;
            match self.entries.get(path) {
                Some(Desired::Present { contents, mode }) => {
                    let undo = match current {
                        Some((previous, previous_mode)) => UndoAction::RestoreFile {
                            path: path.to_path_buf(),
                            previous,
                            mode: Some(previous_mode),
                        },
                        None => UndoAction::RemoveFile {
                            path: path.to_path_buf(),
                        },
                    };
                    write_file(path, contents, *mode)?;
                    debug!("Wrote {}", path.display());
                    rec.changed(format!("wrote {}", path.display()), Some(undo));
                }
                Some(Desired::Absent) => {
                    if let Some((previous, previous_mode)) = current {
                        fs::remove_file(path)?;
                        debug!("Removed {}", path.display());
                        rec.changed(
                            format!("removed {}", path.display()),
                            Some(UndoAction::RestoreFile {
                                path: path.to_path_buf(),
                                previous,
                                mode: Some(previous_mode),
                            }),
                        );
                    }
                }
                None => {}
            }
        }
        Ok(deltas)
    }

    /// Ensure a single file; returns whether it was written
    pub fn ensure(
        path: impl Into<PathBuf>,
        contents: impl Into<String>,
        mode: u32,
        rec: &mut StepRecorder,
    ) -> Result<bool> {
        Ok(!FileSet::new().file(path, contents, mode).apply(rec)?.is_empty())
    }

    /// Write a file only when it does not exist; existing contents are kept
    pub fn seed(
        path: impl Into<PathBuf>,
        contents: impl Into<String>,
        mode: u32,
        rec: &mut StepRecorder,
    ) -> Result<bool> {
        let path = path.into();
        if path.exists() {
            return Ok(false);
        }
        FileSet::ensure(path, contents, mode, rec)
    }

    /// Ensure a single file is absent; returns whether it was removed
    pub fn ensure_absent(path: impl Into<PathBuf>, rec: &mut StepRecorder) -> Result<bool> {
        Ok(!FileSet::new().absent(path).apply(rec)?.is_empty())
    }
}

fn read_current(path: &Path) -> Result<Option<(String, u32)>> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let mode = fs::metadata(path)?.permissions().mode() & 0o7777;
            Ok(Some((contents, mode)))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `contents` with permission bits `mode`, creating parent directories
///
/// The mode is in place before any content is written.
pub(crate) fn write_file(path: &Path, contents: &str, mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_apply_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let vhost = dir.path().join("sites/blog.conf");
        let set = FileSet::new().file(&vhost, "server { listen 80; }\n", 0o644);

        let mut rec = StepRecorder::new();
        assert_eq!(set.apply(&mut rec).unwrap(), vec![FileDelta::Create(vhost.clone())]);
        assert_eq!(rec.undo(), &[UndoAction::RemoveFile { path: vhost.clone() }]);

        let mut again = StepRecorder::new();
        assert!(set.apply(&mut again).unwrap().is_empty());
        assert_eq!(again.outcome(), Outcome::Unchanged);
    }

    #[test]
    fn test_update_records_previous_contents() {
        let dir = TempDir::new().unwrap();
        let unit = dir.path().join("panelo.service");
        fs::write(&unit, "old\n").unwrap();
        fs::set_permissions(&unit, fs::Permissions::from_mode(0o600)).unwrap();

        let mut rec = StepRecorder::new();
        assert!(FileSet::ensure(&unit, "new\n", 0o644, &mut rec).unwrap());
        assert_eq!(fs::read_to_string(&unit).unwrap(), "new\n");
        assert_eq!(
            rec.undo(),
            &[UndoAction::RestoreFile {
                path: unit.clone(),
                previous: "old\n".to_string(),
                mode: Some(0o600),
            }]
        );
        assert!(matches!(rec.outcome(), Outcome::Changed(_)));
    }

    #[test]
    fn test_write_file_narrows_existing_mode() {
        let dir = TempDir::new().unwrap();
        let key = dir.path().join("ssl/key.pem");
        write_file(&key, "first\n", 0o600).unwrap();
        assert_eq!(fs::metadata(&key).unwrap().permissions().mode() & 0o777, 0o600);

        fs::set_permissions(&key, fs::Permissions::from_mode(0o644)).unwrap();
        write_file(&key, "second\n", 0o600).unwrap();
        assert_eq!(fs::read_to_string(&key).unwrap(), "second\n");
        assert_eq!(fs::metadata(&key).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_mode_only_difference() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("credentials.txt");
        fs::write(&secret, "pw\n").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();

        let set = FileSet::new().file(&secret, "pw\n", 0o600);
        assert_eq!(set.diff().unwrap(), vec![FileDelta::Mode(secret.clone())]);
        set.apply(&mut StepRecorder::new()).unwrap();
        let mode = fs::metadata(&secret).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_ensure_absent() {
        let dir = TempDir::new().unwrap();
        let cron = dir.path().join("panelo-backup");
        let mut rec = StepRecorder::new();
        assert!(!FileSet::ensure_absent(&cron, &mut rec).unwrap());

        fs::write(&cron, "0 2 * * * root panelo backup run\n").unwrap();
        assert!(FileSet::ensure_absent(&cron, &mut rec).unwrap());
        assert!(!cron.exists());
        assert!(matches!(rec.undo()[0], UndoAction::RestoreFile { .. }));
    }
}
