pub mod app;
pub mod backup;
pub mod cert;
pub mod component;
pub mod install;
pub mod journal;
pub mod plan;
pub mod services;
pub mod user;
pub mod validate;

use anyhow::{Context, Result};
use command_executor::LocalLauncher;
use panelo_config::{Config, parser};
use panelo_provision::{Environment, HostPaths, ProvisionContext};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every command
pub struct Global {
    pub config: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Global {
    pub fn load_config(&self) -> Result<Config> {
        parser::load(self.config.as_deref()).context("Failed to load configuration")
    }
}

pub fn ensure_root() -> Result<()> {
    if !nix::unistd::Uid::effective().is_root() {
        anyhow::bail!("panelo must run as root (use --skip-root-check to override)");
    }
    Ok(())
}

/// Detect the host and build a provisioning context on the local machine
pub async fn context(
    config: Config,
    domain: Option<&str>,
    email: Option<&str>,
) -> Result<ProvisionContext> {
    build_context(config, domain, email, Detection::Full).await
}

/// Context for commands that never need a fresh public address
///
/// Reuses the environment recorded by the last install instead of querying
/// the echo services.
pub async fn local_context(config: Config) -> Result<ProvisionContext> {
    build_context(config, None, None, Detection::Local).await
}

enum Detection {
    Full,
    Local,
}

async fn build_context(
    config: Config,
    domain: Option<&str>,
    email: Option<&str>,
    detection: Detection,
) -> Result<ProvisionContext> {
    let launcher = Arc::new(LocalLauncher);
    let paths = HostPaths::from_settings(&config.settings);
    let domain = domain.or(config.domain.as_deref());
    let email = email.or(config.email.as_deref());
    let env = match detection {
        Detection::Full => Environment::detect(launcher.as_ref(), &paths, domain, email).await,
        Detection::Local => {
            Environment::detect_local(launcher.as_ref(), &paths, domain, email).await
        }
    }
    .context("Failed to detect host environment")?;

    let mut ctx = ProvisionContext::new(config, env, launcher);
    if let Ok(binary) = std::env::current_exe() {
        ctx = ctx.with_binary(binary);
    }
    Ok(ctx)
}

/// Interpret a y/n answer; empty input selects `default`
pub fn parse_answer(answer: &str, default: bool) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Ask a yes/no question on the terminal
pub fn confirm(question: &str, default: bool) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let stdin = io::stdin();
    loop {
        print!("{} {} ", question, hint);
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(default);
        }
        match parse_answer(&line, default) {
            Some(answer) => return Ok(answer),
            None => println!("Please answer y or n."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("", true), Some(true));
        assert_eq!(parse_answer("\n", false), Some(false));
        assert_eq!(parse_answer("Yes\n", false), Some(true));
        assert_eq!(parse_answer(" n ", true), Some(false));
        assert_eq!(parse_answer("maybe", true), None);
    }
}
