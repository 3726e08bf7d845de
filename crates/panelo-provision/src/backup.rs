//! Backup archives of user data and the panel database

use crate::components::database;
use crate::context::ProvisionContext;
use crate::credentials;
use crate::host::docker;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use command_executor::Command;
use flate2::Compression;
use flate2::write::GzEncoder;
use panelo_config::DatabaseKind;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const PREFIX: &str = "panelo-";
const SUFFIX: &str = ".tar.gz";

/// One archive under the backups directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    /// Archive path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Whether a database dump is included
    pub has_database: bool,
}

impl BackupArchive {
    /// File name of the archive
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Writes and prunes backup archives
pub struct BackupRunner<'a> {
    ctx: &'a ProvisionContext,
}

impl<'a> BackupRunner<'a> {
    /// Runner over `ctx`
    pub fn new(ctx: &'a ProvisionContext) -> Self {
        Self { ctx }
    }

    /// Write `panelo-<timestamp>.tar.gz` and prune old archives
    ///
    /// The archive holds the `users/` tree, the state document and
    /// `database.sql`. When the database container is not running the dump
    /// is left out with a warning.
    pub async fn run(&self) -> Result<BackupArchive> {
        let dir = self.ctx.paths().backups_dir();
        fs::create_dir_all(&dir)?;

        let dump = self.dump().await?;
        let path = next_archive_path(&dir, Utc::now());

        let staging = tempfile::NamedTempFile::new_in(&dir)?;
        let encoder = GzEncoder::new(staging.reopen()?, Compression::default());
        let mut archive = tar::Builder::new(encoder);

        let users = self.ctx.paths().data("users");
        if users.is_dir() {
            archive.append_dir_all("users", &users)?;
        }
        let state = self.ctx.store().path();
        if state.is_file() {
            archive.append_path_with_name(state, "state.json")?;
        }
        if let Some(sql) = &dump {
            let mut header = tar::Header::new_gnu();
            header.set_size(sql.len() as u64);
            header.set_mode(0o600);
            header.set_mtime(Utc::now().timestamp().max(0) as u64);
            header.set_cksum();
            archive.append_data(&mut header, "database.sql", sql.as_bytes())?;
        }
        archive.into_inner()?.finish()?;
        staging.persist(&path).map_err(|e| Error::Io(e.error))?;

        let size = fs::metadata(&path)?.len();
        info!("Wrote backup {} ({} bytes)", path.display(), size);

        let removed = self.prune()?;
        if !removed.is_empty() {
            info!("Pruned {} old backups", removed.len());
        }
        Ok(BackupArchive {
            path,
            size,
            has_database: dump.is_some(),
        })
    }

    async fn dump(&self) -> Result<Option<String>> {
        let kind = self.ctx.config().database;
        let container = database::container_name(kind);
        if !docker::is_running(self.ctx, container).await? {
            warn!("{} is not running, backing up files only", container);
            return Ok(None);
        }
        let result = self.ctx.run(&dump_command(self.ctx, kind)?).await?;
        debug!("Dumped {} bytes from {}", result.output.len(), container);
        Ok(Some(result.output))
    }

    /// Delete archives beyond `backup_retention`, oldest first
    ///
    /// A retention of zero keeps everything.
    pub fn prune(&self) -> Result<Vec<PathBuf>> {
        let retention = self.ctx.config().settings.backup_retention;
        if retention == 0 {
            return Ok(Vec::new());
        }
        let mut removed = Vec::new();
        for archive in self.list()?.into_iter().skip(retention) {
            match fs::remove_file(&archive.path) {
                Ok(()) => removed.push(archive.path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    /// Archives, newest first
    pub fn list(&self) -> Result<Vec<BackupArchive>> {
        let dir = self.ctx.paths().backups_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut archives = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(PREFIX) || !name.ends_with(SUFFIX) {
                continue;
            }
            let path = entry.path();
            let metadata = entry.metadata()?;
            let modified = metadata.modified()?;
            archives.push((
                modified,
                BackupArchive {
                    size: metadata.len(),
                    has_database: contains_database(&path),
                    path,
                },
            ));
        }
        archives.sort_by(|(a_time, a), (b_time, b)| b_time.cmp(a_time).then(b.path.cmp(&a.path)));
        Ok(archives.into_iter().map(|(_, archive)| archive).collect())
    }
}

fn dump_command(ctx: &ProvisionContext, kind: DatabaseKind) -> Result<Command> {
    let container = database::container_name(kind);
    Ok(match kind {
        DatabaseKind::Mysql => {
            let password = credentials::database_root_password(ctx)?;
            docker::exec(
                container,
                &[("MYSQL_PWD", password.as_str())],
                false,
                &["mysqldump", "-uroot", "--all-databases", "--single-transaction"],
            )
        }
        DatabaseKind::Postgresql => {
            docker::exec(container, &[], false, &["pg_dumpall", "-U", "postgres"])
        }
    })
}

fn next_archive_path(dir: &std::path::Path, now: DateTime<Utc>) -> PathBuf {
    let stamp = now.format("%Y%m%d-%H%M%S").to_string();
    let mut path = dir.join(format!("{}{}{}", PREFIX, stamp, SUFFIX));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}{}-{}{}", PREFIX, stamp, n, SUFFIX));
        n += 1;
    }
    path
}

fn contains_database(path: &std::path::Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let Ok(entries) = archive.entries() else {
        return false;
    };
    entries
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.path().is_ok_and(|p| p.as_os_str() == "database.sql"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_archive_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        let first = next_archive_path(dir.path(), now);
        assert!(first.ends_with("panelo-20260301-020000.tar.gz"));

        fs::write(&first, b"").unwrap();
        let second = next_archive_path(dir.path(), now);
        assert!(second.ends_with("panelo-20260301-020000-1.tar.gz"));
    }
}
