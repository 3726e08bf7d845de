//! JSON state store and the run lock

use crate::error::{Error, Result};
use crate::state::PanelState;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// File name of the state document inside the data root
pub const STATE_FILE: &str = "state.json";

/// File name of the run lock inside the data root
pub const LOCK_FILE: &str = "panelo.lock";

/// Write `bytes` to `path` through a temp file in `dir` and an atomic rename
pub(crate) fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Loads and saves [`PanelState`] at `<data_root>/state.json`
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store for the given data root
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self {
            path: data_root.as_ref().join(STATE_FILE),
        }
    }

    /// Path of the state document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state; a missing document is an empty state
    pub fn load(&self) -> Result<PanelState> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state at {}, starting empty", self.path.display());
                Ok(PanelState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save the state atomically
    pub fn save(&self, state: &PanelState) -> Result<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&dir, &self.path, &json)
    }

    /// Load, mutate and save; nothing is written when `f` fails
    pub fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut PanelState) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut state = self.load()?;
        let value = f(&mut state)?;
        self.save(&state)?;
        Ok(value)
    }
}

/// Exclusive lock held for the duration of a provisioning run
///
/// The lock file contains the holder's pid. A lock whose holder no longer
/// exists is treated as stale and taken over. The file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire `<data_root>/panelo.lock`
    pub fn acquire(data_root: impl AsRef<Path>) -> Result<Self> {
        let data_root = data_root.as_ref();
        fs::create_dir_all(data_root)?;
        let path = data_root.join(LOCK_FILE);

        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())?;
                    debug!("Acquired run lock {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let pid = fs::read_to_string(&path).unwrap_or_default();
                    let pid = pid.trim().to_string();
                    if holder_alive(&pid) {
                        return Err(Error::Locked {
                            path: path.display().to_string(),
                            pid,
                        });
                    }
                    warn!("Removing stale run lock {} (pid {})", path.display(), pid);
                    fs::remove_file(&path)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Locked {
            path: path.display().to_string(),
            pid: "unknown".to_string(),
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove run lock {}: {}", self.path.display(), e);
        }
    }
}

fn holder_alive(pid: &str) -> bool {
    match pid.parse::<u32>() {
        Ok(pid) => Path::new("/proc").join(pid.to_string()).exists(),
        // Unparseable content is treated as held rather than stolen
        Err(_) => !pid.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, User};
    use tempfile::TempDir;

    #[test]
    fn test_missing_state_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert_eq!(store.load().unwrap(), PanelState::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("nested"));

        let mut state = PanelState::default();
        state.seed_default_users("h1", "h2");
        state.ports.allocate_specific("blog-alice", 8100).unwrap();
        state.secrets.admin_password = Some("s3cret".to_string());
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn test_update_discards_on_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        store
            .update(|state| state.add_user(User::new("a", "a@host", Role::User, "!")))
            .unwrap();
        let err = store
            .update(|state| state.add_user(User::new("a", "a@host", Role::User, "!")))
            .unwrap_err();
        assert!(matches!(err, Error::UserExists(_)));
        assert_eq!(store.load().unwrap().users.len(), 1);
    }

    #[test]
    fn test_second_lock_is_rejected() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());

        let err = RunLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Locked { .. }));

        drop(lock);
        assert!(!dir.path().join(LOCK_FILE).exists());
        let _again = RunLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LOCK_FILE), "999999999\n").unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        let pid = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }
}
