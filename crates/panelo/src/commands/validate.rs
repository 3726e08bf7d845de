use crate::commands::Global;
use anyhow::{Context, Result};
use panelo_config::parser;

pub fn run(global: &Global) -> Result<()> {
    let Some(path) = global.config.clone().or_else(|| {
        std::env::var_os(parser::CONFIG_ENV).map(Into::into)
    }) else {
        let config = global.load_config()?;
        println!("✓ No configuration file, built-in defaults are valid");
        println!("  Version: {}", config.version);
        return Ok(());
    };

    println!("Validating {}...", path.display());
    let config = parser::parse_file(&path).context("Failed to parse configuration")?;

    println!("✓ Configuration valid");
    println!("  Version: {}", config.version);
    if let Some(domain) = &config.domain {
        println!("  Domain: {}", domain);
    }
    println!("  Web server: {}", config.web_server.as_str());
    println!("  Database: {}", config.database.as_str());
    println!(
        "  Runtimes: {}",
        config
            .components
            .runtimes
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for (kind, pool) in config.port_pools() {
        println!("  Port pool {}: {}-{}", kind, pool.start, pool.end);
    }
    Ok(())
}
