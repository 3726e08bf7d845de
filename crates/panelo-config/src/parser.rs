//! Configuration parser with environment variable substitution

use crate::{AppKind, Config, ConfigError, RESERVED_PORTS, Result};
use ipnet::Ipv4Net;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Environment variable naming an explicit manifest path
pub const CONFIG_ENV: &str = "PANELO_CONFIG";

/// Manifest location used when nothing else is specified
pub const DEFAULT_CONFIG_PATH: &str = "/opt/panelo/panelo.yaml";

/// Parse a YAML configuration file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse YAML configuration from a string
pub fn parse_str(content: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(content)?;
    resolve_env(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the manifest for this invocation
///
/// An explicit path must exist. Otherwise `PANELO_CONFIG` is consulted, then
/// the default location; when neither exists the built-in defaults are used.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        debug!("Loading configuration from {}", path.display());
        return parse_file(path);
    }

    let candidate = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if candidate.exists() {
        debug!("Loading configuration from {}", candidate.display());
        return parse_file(candidate);
    }

    debug!("No configuration file found, using defaults");
    let config = Config::default();
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.version != "1.0" {
        return Err(ConfigError::ValidationError(format!(
            "Unsupported version: {}, expected 1.0",
            config.version
        )));
    }

    config
        .settings
        .network_subnet
        .parse::<Ipv4Net>()
        .map_err(|e| {
            ConfigError::ValidationError(format!(
                "network_subnet '{}' is not an IPv4 CIDR: {}",
                config.settings.network_subnet, e
            ))
        })?;

    if config.settings.network.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "network name must not be empty".to_string(),
        ));
    }

    if config.settings.readiness_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "readiness_attempts must be at least 1".to_string(),
        ));
    }

    if let Some(email) = &config.email {
        validate_email(email)?;
    }

    let pools = config.port_pools();
    for (kind, pool) in &pools {
        if let Some(port) = RESERVED_PORTS.iter().find(|port| pool.contains(**port)) {
            return Err(ConfigError::ValidationError(format!(
                "port pool {} for {} contains reserved port {}",
                pool, kind, port
            )));
        }
        for (other_kind, other) in &pools {
            if kind < other_kind && pool.overlaps(other) {
                return Err(ConfigError::ValidationError(format!(
                    "port pools for {} ({}) and {} ({}) overlap",
                    kind, pool, other_kind, other
                )));
            }
        }
    }

    let mut seen: Vec<AppKind> = Vec::new();
    for kind in &config.components.runtimes {
        if seen.contains(kind) {
            return Err(ConfigError::ValidationError(format!(
                "runtime '{}' listed twice",
                kind
            )));
        }
        seen.push(*kind);
    }

    Ok(())
}

/// Check the minimal `local@domain` shape of an email address
pub fn validate_email(email: &str) -> Result<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => Ok(()),
        _ => Err(ConfigError::ValidationError(format!(
            "invalid email address '{}'",
            email
        ))),
    }
}

/// Apply `${VAR}` substitution to every string-valued setting
fn resolve_env(config: &mut Config) -> Result<()> {
    if let Some(domain) = &config.domain {
        config.domain = non_empty(substitute_env_vars(domain)?);
    }
    if let Some(email) = &config.email {
        config.email = non_empty(substitute_env_vars(email)?);
    }

    let settings = &mut config.settings;
    settings.install_root = substitute_path(&settings.install_root)?;
    settings.data_root = substitute_path(&settings.data_root)?;
    settings.fs_root = substitute_path(&settings.fs_root)?;
    settings.network = substitute_env_vars(&settings.network)?;
    settings.network_subnet = substitute_env_vars(&settings.network_subnet)?;
    settings.log_level = substitute_env_vars(&settings.log_level)?;
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn substitute_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(substitute_env_vars(&path.to_string_lossy())?))
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern compiles"))
}

/// Substitute environment variables in a string
///
/// Supports `${VAR}` and `${VAR:-default}`. Every missing variable without a
/// default is reported in a single error.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in env_pattern().captures_iter(input) {
        let full_match = &cap[0];
        let var_expr = &cap[1];

        let (var_name, default_value) = match var_expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (var_expr, None),
        };

        match std::env::var(var_name) {
            Ok(value) if !value.is_empty() || default_value.is_none() => {
                result = result.replace(full_match, &value);
            }
            _ => match default_value {
                Some(default) => result = result.replace(full_match, default),
                None => errors.push(var_name.to_string()),
            },
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::EnvVarNotFound(errors.join(", ")));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DatabaseKind, PortRange, WebServerKind};

    #[test]
    fn test_minimal_manifest_uses_defaults() {
        let config = parse_str("version: \"1.0\"\n").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.web_server, WebServerKind::Nginx);
        assert_eq!(config.database, DatabaseKind::Mysql);
        assert!(config.components.ssl);
        assert!(!config.components.monitoring);
    }

    #[test]
    fn test_full_manifest() {
        let yaml = r#"
version: "1.0"
domain: panel.example.com
email: ops@example.com
web_server: apache
database: postgresql
settings:
  data_root: /srv/panelo
  network: hosting
  rollback_on_failure: false
components:
  monitoring: true
  filebrowser: false
  runtimes: [static, php]
port_pools:
  static: "8400-8410"
"#;
        let config = parse_str(yaml).unwrap();
        assert_eq!(config.domain.as_deref(), Some("panel.example.com"));
        assert_eq!(config.web_server, WebServerKind::Apache);
        assert_eq!(config.database, DatabaseKind::Postgresql);
        assert_eq!(config.settings.data_root, PathBuf::from("/srv/panelo"));
        assert_eq!(config.settings.install_root, PathBuf::from("/opt/panelo"));
        assert!(!config.settings.rollback_on_failure);
        assert_eq!(config.components.runtimes, vec![AppKind::Static, AppKind::Php]);
        assert_eq!(
            config.port_pool(AppKind::Static),
            PortRange { start: 8400, end: 8410 }
        );
        assert_eq!(config.port_pool(AppKind::Php), AppKind::Php.default_pool());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = parse_str("version: \"2.0\"\n").unwrap_err();
        assert!(err.to_string().contains("Unsupported version"));
    }

    #[test]
    fn test_rejects_invalid_subnet() {
        let yaml = "version: \"1.0\"\nsettings:\n  network_subnet: 172.20.0.0/99\n";
        assert!(matches!(
            parse_str(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_pool_with_reserved_port() {
        let yaml = "version: \"1.0\"\nport_pools:\n  php: \"8000-8090\"\n";
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("reserved port 8080"));
    }

    #[test]
    fn test_rejects_overlapping_pools() {
        let yaml = "version: \"1.0\"\nport_pools:\n  php: \"8150-8250\"\n";
        let err = parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_rejects_bad_email() {
        let yaml = "version: \"1.0\"\nemail: not-an-email\n";
        assert!(parse_str(yaml).is_err());
        assert!(validate_email("admin@panel.local").is_ok());
        assert!(validate_email("@panel.local").is_err());
    }

    #[test]
    fn test_env_substitution_with_default() {
        // SAFETY: test-local variable name not read by other tests
        unsafe { std::env::set_var("PANELO_TEST_DOMAIN_A", "shop.example.com") };
        let out = substitute_env_vars("${PANELO_TEST_DOMAIN_A}").unwrap();
        assert_eq!(out, "shop.example.com");

        let out = substitute_env_vars("${PANELO_TEST_UNSET_B:-fallback.local}").unwrap();
        assert_eq!(out, "fallback.local");

        let err = substitute_env_vars("${PANELO_TEST_UNSET_C}").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "PANELO_TEST_UNSET_C"));
    }

    #[test]
    fn test_empty_domain_after_substitution_is_none() {
        let yaml = "version: \"1.0\"\ndomain: \"${PANELO_TEST_UNSET_D:-}\"\n";
        let config = parse_str(yaml).unwrap();
        assert!(config.domain.is_none());
    }
}
