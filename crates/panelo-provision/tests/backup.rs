//! Backup archives written from a provisioned fake host

use flate2::read::GzDecoder;
use panelo_provision::testing::Fixture;
use panelo_provision::{BackupRunner, Driver};
use std::io::Read;

async fn provisioned() -> Fixture {
    let fixture = Fixture::new().await.unwrap();
    Driver::new(&fixture.ctx).run().await.unwrap().into_result().unwrap();
    fixture
}

fn entries(path: &std::path::Path) -> Vec<(String, String)> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = String::new();
            if entry.header().entry_type().is_file() {
                entry.read_to_string(&mut body).unwrap();
            }
            (name, body)
        })
        .collect()
}

#[smol_potat::test]
async fn test_backup_contains_dump_state_and_user_files() {
    let fixture = provisioned().await;
    let site = fixture.ctx.paths().app_dir("alice", "blog");
    std::fs::create_dir_all(&site).unwrap();
    std::fs::write(site.join("index.html"), "<h1>hi</h1>").unwrap();
    fixture.host.clear_calls();

    let archive = BackupRunner::new(&fixture.ctx).run().await.unwrap();
    assert!(archive.has_database);
    assert!(archive.file_name().starts_with("panelo-"));
    assert!(archive.file_name().ends_with(".tar.gz"));
    assert!(archive.path.starts_with(fixture.ctx.paths().backups_dir()));

    let entries = entries(&archive.path);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert!(names.contains(&"state.json"));
    assert!(names.contains(&"users/alice/apps/blog/index.html"));
    let (_, dump) = entries.iter().find(|(name, _)| name == "database.sql").unwrap();
    assert!(dump.contains("MySQL dump"));
    assert_eq!(fixture.host.count("docker exec"), 1);
    assert!(fixture.host.calls().iter().any(|call| call.contains("mysqldump -uroot --all-databases")));
}

#[smol_potat::test]
async fn test_backup_without_running_database_skips_the_dump() {
    let fixture = provisioned().await;
    fixture.host.kill_container("panelo-mysql");

    let archive = BackupRunner::new(&fixture.ctx).run().await.unwrap();
    assert!(!archive.has_database);
    let names: Vec<String> = entries(&archive.path).into_iter().map(|(name, _)| name).collect();
    assert!(!names.iter().any(|name| name == "database.sql"));
    assert!(names.iter().any(|name| name == "state.json"));
}

#[smol_potat::test]
async fn test_retention_prunes_oldest_archives() {
    let mut fixture = provisioned().await;
    fixture.reconfigure(|config| config.settings.backup_retention = 2);
    let runner = BackupRunner::new(&fixture.ctx);

    for _ in 0..3 {
        runner.run().await.unwrap();
    }

    let kept = runner.list().unwrap();
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|archive| archive.has_database));
    let on_disk = std::fs::read_dir(fixture.ctx.paths().backups_dir()).unwrap().count();
    assert_eq!(on_disk, 2);
}

#[smol_potat::test]
async fn test_zero_retention_keeps_everything() {
    let mut fixture = provisioned().await;
    fixture.reconfigure(|config| config.settings.backup_retention = 0);
    let runner = BackupRunner::new(&fixture.ctx);
    for _ in 0..3 {
        runner.run().await.unwrap();
    }
    assert_eq!(runner.list().unwrap().len(), 3);
    assert!(runner.prune().unwrap().is_empty());
}
