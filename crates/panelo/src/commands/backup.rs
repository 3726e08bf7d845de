use crate::BackupCommands;
use crate::commands::local_context;
use anyhow::{Context, Result};
use comfy_table::Table;
use panelo_config::Config;
use panelo_provision::{BackupArchive, BackupRunner};

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

pub fn render(archives: &[BackupArchive]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ARCHIVE", "SIZE", "DATABASE"]);
    for archive in archives {
        table.add_row(vec![
            archive.file_name(),
            human_size(archive.size),
            if archive.has_database { "yes" } else { "no" }.to_string(),
        ]);
    }
    table
}

pub async fn run(config: Config, command: BackupCommands) -> Result<()> {
    let ctx = local_context(config).await?;
    let runner = BackupRunner::new(&ctx);

    match command {
        BackupCommands::Run => {
            let archive = runner.run().await.context("Backup failed")?;
            println!("✓ Wrote {} ({})", archive.path.display(), human_size(archive.size));
            if !archive.has_database {
                println!("  ⚠ Database dump skipped, the database is not running");
            }
        }
        BackupCommands::List => {
            let archives = runner.list()?;
            if archives.is_empty() {
                println!("No backups");
            } else {
                println!("{}", render(&archives));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MiB");
    }
}
