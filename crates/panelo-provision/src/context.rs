//! Provisioning context passed to every step

use crate::environment::Environment;
use crate::{Error, Result};
use command_executor::{Command, ExitResult, Launcher};
use panelo_config::{Config, Settings};
use panelo_state::{Journal, RunLock, StateStore};
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Resolves host paths under the configured filesystem root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    fs_root: PathBuf,
    install_root: PathBuf,
    data_root: PathBuf,
}

impl HostPaths {
    /// Paths for the given settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.fs_root, &settings.install_root, &settings.data_root)
    }

    /// Paths with explicit roots
    pub fn new(
        fs_root: impl Into<PathBuf>,
        install_root: impl Into<PathBuf>,
        data_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs_root: fs_root.into(),
            install_root: install_root.into(),
            data_root: data_root.into(),
        }
    }

    /// Map an absolute host path onto the filesystem root
    pub fn host(&self, path: impl AsRef<Path>) -> PathBuf {
        let relative: PathBuf = path
            .as_ref()
            .components()
            .filter(|c| !matches!(c, PathComponent::RootDir | PathComponent::Prefix(_)))
            .collect();
        self.fs_root.join(relative)
    }

    /// Resolved install root
    pub fn install_root(&self) -> PathBuf {
        self.host(&self.install_root)
    }

    /// Resolved data root
    pub fn data_root(&self) -> PathBuf {
        self.host(&self.data_root)
    }

    /// Path below the install root
    pub fn install(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.install_root().join(relative)
    }

    /// Path below the data root
    pub fn data(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.data_root().join(relative)
    }

    /// Per-user directory
    pub fn user_dir(&self, user: &str) -> PathBuf {
        self.data("users").join(user)
    }

    /// Application directory of a user
    pub fn app_dir(&self, user: &str, app: &str) -> PathBuf {
        self.user_dir(user).join("apps").join(app)
    }

    /// Self-signed TLS material of a domain
    pub fn ssl_dir(&self, domain: &str) -> PathBuf {
        self.data("ssl").join(domain)
    }

    /// Backup archives
    pub fn backups_dir(&self) -> PathBuf {
        self.data("backups")
    }

    /// Journal directory
    pub fn journal_dir(&self) -> PathBuf {
        self.data("journal")
    }

    /// Credentials file written at the end of installation
    pub fn credentials_file(&self) -> PathBuf {
        self.install("credentials.txt")
    }
}

/// Readiness polling parameters
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    /// Maximum attempts
    pub attempts: u32,
    /// Pause between attempts
    pub interval: Duration,
}

/// Everything a provisioning step needs
pub struct ProvisionContext {
    config: Config,
    env: Environment,
    paths: HostPaths,
    launcher: Arc<dyn Launcher>,
    store: StateStore,
    journal: Journal,
    binary: PathBuf,
}

/// Where the panelo binary is installed unless told otherwise
pub const DEFAULT_BINARY: &str = "/usr/local/bin/panelo";

impl ProvisionContext {
    /// Build a context from a validated configuration and detected environment
    pub fn new(config: Config, env: Environment, launcher: Arc<dyn Launcher>) -> Self {
        let paths = HostPaths::from_settings(&config.settings);
        let store = StateStore::new(paths.data_root());
        let journal = Journal::new(paths.journal_dir());
        Self {
            config,
            env,
            paths,
            launcher,
            store,
            journal,
            binary: PathBuf::from(DEFAULT_BINARY),
        }
    }

    /// Use `binary` in generated units and cron entries
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Path of the panelo binary as seen by the host
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Detected environment
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Host paths
    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    /// Launcher used for every host command
    pub fn launcher(&self) -> &Arc<dyn Launcher> {
        &self.launcher
    }

    /// State store
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Provisioning journal
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Take the run lock for this host
    pub fn lock(&self) -> Result<RunLock> {
        Ok(RunLock::acquire(self.paths.data_root())?)
    }

    /// Readiness polling parameters from settings
    pub fn readiness(&self) -> Readiness {
        Readiness {
            attempts: self.config.settings.readiness_attempts,
            interval: Duration::from_secs(self.config.settings.readiness_interval_secs),
        }
    }

    /// Execute a command without judging its exit status
    pub async fn execute(&self, command: &Command) -> Result<ExitResult> {
        debug!("Running: {}", command);
        Ok(self.launcher.execute(command).await?)
    }

    /// Execute a command that must succeed
    pub async fn run(&self, command: &Command) -> Result<ExitResult> {
        let result = self.execute(command).await?;
        if !result.success() {
            return Err(Error::dependency(command, &result));
        }
        Ok(result)
    }

    /// Execute a command that must succeed and return its trimmed stdout
    pub async fn output(&self, command: &Command) -> Result<String> {
        Ok(self.run(command).await?.trimmed().to_string())
    }

    /// Whether a command succeeds; spawn failures count as failure
    pub async fn probe(&self, command: &Command) -> bool {
        debug!("Probing: {}", command);
        self.launcher.probe(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_paths_are_rooted() {
        let paths = HostPaths::new("/tmp/root", "/opt/panelo", "/var/lib/panelo");
        assert_eq!(
            paths.host("/etc/nginx/nginx.conf"),
            PathBuf::from("/tmp/root/etc/nginx/nginx.conf")
        );
        assert_eq!(
            paths.app_dir("alice", "blog"),
            PathBuf::from("/tmp/root/var/lib/panelo/users/alice/apps/blog")
        );
        assert_eq!(
            paths.credentials_file(),
            PathBuf::from("/tmp/root/opt/panelo/credentials.txt")
        );
    }

    #[test]
    fn test_default_root_is_identity() {
        let paths = HostPaths::from_settings(&Settings::default());
        assert_eq!(paths.host("/etc/cron.d/panelo"), PathBuf::from("/etc/cron.d/panelo"));
        assert_eq!(paths.ssl_dir("10.0.0.5"), PathBuf::from("/var/lib/panelo/ssl/10.0.0.5"));
    }
}
