//! # Panelo Configuration
//!
//! YAML manifest parser for panelo.
//!
//! A host is described by an optional `panelo.yaml`. Every field has a
//! default, so a missing file yields a complete configuration that installs
//! the full stack with nginx and MySQL.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub mod parser;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Environment variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Ports owned by the panel itself or by the services it installs.
///
/// No application deployment may be assigned one of these.
pub const RESERVED_PORTS: &[u16] = &[22, 80, 443, 3000, 3001, 3306, 5432, 8080, 9090, 9093];

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Configuration version
    #[serde(default = "default_version")]
    pub version: String,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,

    /// Panel domain; defaults to the detected public address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Administrative email; defaults to `admin@<hostname>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Web server flavour
    #[serde(default)]
    pub web_server: WebServerKind,

    /// Database engine
    #[serde(default)]
    pub database: DatabaseKind,

    /// Optional component toggles
    #[serde(default)]
    pub components: ComponentToggles,

    /// Port pool overrides per application kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_pools: BTreeMap<AppKind, PortRange>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            settings: Settings::default(),
            domain: None,
            email: None,
            web_server: WebServerKind::default(),
            database: DatabaseKind::default(),
            components: ComponentToggles::default(),
            port_pools: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Port pool for an application kind, honouring overrides
    pub fn port_pool(&self, kind: AppKind) -> PortRange {
        self.port_pools
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_pool())
    }

    /// All effective port pools
    pub fn port_pools(&self) -> BTreeMap<AppKind, PortRange> {
        AppKind::ALL
            .iter()
            .map(|kind| (*kind, self.port_pool(*kind)))
            .collect()
    }
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding component scripts, templates and build contexts
    pub install_root: PathBuf,
    /// Directory holding per-user data, backups, TLS material and state
    pub data_root: PathBuf,
    /// Prefix under which every host path is resolved
    pub fs_root: PathBuf,
    /// Shared container network name
    pub network: String,
    /// Subnet of the shared container network
    pub network_subnet: String,
    /// Default log level
    pub log_level: String,
    /// Undo the current run's changes when a step fails
    pub rollback_on_failure: bool,
    /// Readiness polling attempts before a step gives up
    pub readiness_attempts: u32,
    /// Seconds between readiness polls
    pub readiness_interval_secs: u64,
    /// Number of backup archives kept
    pub backup_retention: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("/opt/panelo"),
            data_root: PathBuf::from("/var/lib/panelo"),
            fs_root: PathBuf::from("/"),
            network: "panelo-network".to_string(),
            network_subnet: "172.20.0.0/16".to_string(),
            log_level: "info".to_string(),
            rollback_on_failure: true,
            readiness_attempts: 30,
            readiness_interval_secs: 2,
            backup_retention: 7,
        }
    }
}

/// Web server flavour
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WebServerKind {
    /// NGINX
    #[default]
    Nginx,
    /// Apache httpd
    Apache,
}

impl WebServerKind {
    /// Name used by certbot plugins and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            WebServerKind::Nginx => "nginx",
            WebServerKind::Apache => "apache",
        }
    }
}

/// Database engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// MySQL 8
    #[default]
    Mysql,
    /// PostgreSQL 16
    Postgresql,
}

impl DatabaseKind {
    /// Short engine name
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Mysql => "mysql",
            DatabaseKind::Postgresql => "postgresql",
        }
    }
}

/// Optional component toggles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComponentToggles {
    /// Web file browser on port 8080
    pub filebrowser: bool,
    /// Certificate issuance and renewal
    pub ssl: bool,
    /// Prometheus and Alertmanager
    pub monitoring: bool,
    /// Nightly backups
    pub backup: bool,
    /// Placeholder API and dashboard services
    pub panel: bool,
    /// Application runtimes to prepare
    pub runtimes: Vec<AppKind>,
    /// Component ids to leave out of the plan (`database`, `web-server`, ...)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
}

impl Default for ComponentToggles {
    fn default() -> Self {
        Self {
            filebrowser: true,
            ssl: true,
            monitoring: false,
            backup: true,
            panel: true,
            runtimes: AppKind::ALL.to_vec(),
            skip: Vec::new(),
        }
    }
}

/// Application kinds that can be deployed
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    /// WordPress on the official image
    Wordpress,
    /// Node.js built from source
    Nodejs,
    /// PHP with Apache
    Php,
    /// Python WSGI/ASGI application
    Python,
    /// Static files served by nginx
    Static,
}

impl AppKind {
    /// Every kind, in a stable order
    pub const ALL: [AppKind; 5] = [
        AppKind::Wordpress,
        AppKind::Nodejs,
        AppKind::Php,
        AppKind::Python,
        AppKind::Static,
    ];

    /// Lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            AppKind::Wordpress => "wordpress",
            AppKind::Nodejs => "nodejs",
            AppKind::Php => "php",
            AppKind::Python => "python",
            AppKind::Static => "static",
        }
    }

    /// The fixed host port pool for this kind
    pub fn default_pool(&self) -> PortRange {
        let (start, end) = match self {
            AppKind::Wordpress => (8100, 8199),
            AppKind::Php => (8200, 8299),
            AppKind::Static => (8300, 8399),
            AppKind::Nodejs => (3100, 3199),
            AppKind::Python => (5100, 5199),
        };
        PortRange { start, end }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        AppKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::ValidationError(format!("unknown application kind '{s}'")))
    }
}

/// Inclusive range of host ports
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange {
    /// First port
    pub start: u16,
    /// Last port
    pub end: u16,
}

impl PortRange {
    /// Whether `port` lies in the range
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Whether two ranges share a port
    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Iterate the ports of the range
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PortRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ConfigError::ValidationError(format!("invalid port range '{s}'"));
        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        let start: u16 = start.trim().parse().map_err(|_| invalid())?;
        let end: u16 = end.trim().parse().map_err(|_| invalid())?;
        if start == 0 || start > end {
            return Err(invalid());
        }
        Ok(PortRange { start, end })
    }
}

impl TryFrom<String> for PortRange {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PortRange> for String {
    fn from(range: PortRange) -> Self {
        range.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pools_avoid_reserved_ports() {
        for kind in AppKind::ALL {
            let pool = kind.default_pool();
            for port in RESERVED_PORTS {
                assert!(!pool.contains(*port), "{kind} pool contains {port}");
            }
        }
    }

    #[test]
    fn test_default_pools_are_disjoint() {
        for a in AppKind::ALL {
            for b in AppKind::ALL {
                if a != b {
                    assert!(!a.default_pool().overlaps(&b.default_pool()));
                }
            }
        }
    }

    #[test]
    fn test_port_range_parse() {
        let range: PortRange = "8100-8199".parse().unwrap();
        assert_eq!(range, PortRange { start: 8100, end: 8199 });
        assert_eq!(range.iter().count(), 100);
        assert!("8199-8100".parse::<PortRange>().is_err());
        assert!("abc".parse::<PortRange>().is_err());
    }

    #[test]
    fn test_app_kind_from_str() {
        assert_eq!("WordPress".parse::<AppKind>().unwrap(), AppKind::Wordpress);
        assert!("ruby".parse::<AppKind>().is_err());
    }
}
