//! Log setup for the CLI
//!
//! Console output goes to stderr so tables on stdout stay clean. A daily
//! rolling file under `<data_root>/logs` keeps a record of every run.

use panelo_config::Config;
use panelo_provision::HostPaths;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name prefix of the rolling log
pub const LOG_PREFIX: &str = "panelo";

/// Directory the file log is written to
pub fn log_dir(config: &Config) -> PathBuf {
    HostPaths::from_settings(&config.settings).data("logs")
}

/// Filter directive in effect
///
/// An explicit `--log-level` wins over `RUST_LOG`, which wins over the
/// configured level.
pub fn filter_directive(explicit: Option<&str>, env: Option<String>, configured: &str) -> String {
    if let Some(level) = explicit {
        return level.to_string();
    }
    match env {
        Some(value) if !value.trim().is_empty() => value,
        _ if configured.trim().is_empty() => "info".to_string(),
        _ => configured.to_string(),
    }
}

fn filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_appender(dir: &Path) -> std::io::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .map_err(std::io::Error::other)
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop and must be held until
/// the command finishes.
pub fn init(explicit: Option<&str>, config: &Config) -> Option<WorkerGuard> {
    let directive = filter_directive(
        explicit,
        std::env::var("RUST_LOG").ok(),
        &config.settings.log_level,
    );
    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter(&directive));

    let dir = log_dir(config);
    let (file_layer, guard, file_error) = match file_appender(&dir) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter(&directive));
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    if let Some(e) = file_error {
        warn!("File logging disabled, {} is not writable: {}", dir.display(), e);
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_level_wins() {
        assert_eq!(
            filter_directive(Some("debug"), Some("warn".into()), "info"),
            "debug"
        );
    }

    #[test]
    fn test_env_before_configured_level() {
        assert_eq!(filter_directive(None, Some("warn".into()), "info"), "warn");
        assert_eq!(filter_directive(None, Some("  ".into()), "error"), "error");
        assert_eq!(filter_directive(None, None, ""), "info");
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        file_appender(&logs).unwrap();
        assert!(logs.is_dir());
    }

    #[test]
    fn test_log_dir_follows_data_root() {
        let mut config = Config::default();
        config.settings.fs_root = PathBuf::from("/srv/root");
        assert_eq!(log_dir(&config), PathBuf::from("/srv/root/var/lib/panelo/logs"));
    }
}
