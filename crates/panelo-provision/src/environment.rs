//! Host environment detection
//!
//! Determines the operating system family, the address the panel is reachable
//! on, and the hostname. Address detection never fails: when no echo service
//! answers and no route or global IPv6 address exists, the loopback address is
//! used so the pipeline can still proceed with self-signed TLS.
//!
//! Each full detection is recorded under the data root. Commands that only
//! manage local state reuse that record through [`Environment::detect_local`]
//! instead of querying the echo services again.

use crate::context::HostPaths;
use crate::{Error, Result};
use command_executor::{Command, Launcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, info, warn};

/// External IPv4 echo services, tried in order
pub const ECHO_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
    "https://ipecho.net/plain",
];

/// File name of the recorded environment under the data root
pub const ENVIRONMENT_FILE: &str = "environment.json";

/// Supported operating system families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Debian, Ubuntu and derivatives (apt, ufw)
    Debian,
    /// RHEL, CentOS, Fedora, Rocky, Alma (dnf, firewalld)
    Rhel,
}

impl OsFamily {
    /// Parse the contents of `/etc/os-release`
    pub fn from_os_release(content: &str) -> Option<Self> {
        let mut ids = Vec::new();
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key == "ID" || key == "ID_LIKE" {
                let value = value.trim().trim_matches('"').to_ascii_lowercase();
                ids.extend(value.split_whitespace().map(str::to_string));
            }
        }

        ids.iter().find_map(|id| match id.as_str() {
            "debian" | "ubuntu" | "raspbian" | "linuxmint" => Some(OsFamily::Debian),
            "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "ol" => Some(OsFamily::Rhel),
            _ => None,
        })
    }

    /// Firewall package and tool
    pub fn firewall_package(&self) -> &'static str {
        match self {
            OsFamily::Debian => "ufw",
            OsFamily::Rhel => "firewalld",
        }
    }

    /// Apache package and systemd unit
    pub fn apache_service(&self) -> &'static str {
        match self {
            OsFamily::Debian => "apache2",
            OsFamily::Rhel => "httpd",
        }
    }

    /// Directory holding nginx or apache virtual hosts
    pub fn vhost_dir(&self, apache: bool) -> &'static str {
        match (self, apache) {
            (OsFamily::Debian, false) => "/etc/nginx/sites-enabled",
            (OsFamily::Rhel, false) => "/etc/nginx/conf.d",
            (OsFamily::Debian, true) => "/etc/apache2/sites-enabled",
            (OsFamily::Rhel, true) => "/etc/httpd/conf.d",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OsFamily::Debian => "debian",
            OsFamily::Rhel => "rhel",
        })
    }
}

/// Where the panel address came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    /// An external echo service
    Echo(String),
    /// The source address of the default IPv4 route
    LocalRoute,
    /// The first global IPv6 address
    Ipv6,
    /// Nothing else was available
    Loopback,
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSource::Echo(service) => write!(f, "echo service {}", service),
            AddressSource::LocalRoute => f.write_str("local route"),
            AddressSource::Ipv6 => f.write_str("global ipv6"),
            AddressSource::Loopback => f.write_str("loopback fallback"),
        }
    }
}

/// Detected host environment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Environment {
    /// Operating system family
    pub os: OsFamily,
    /// Address the panel is reachable on
    pub public_address: String,
    /// How the address was found
    pub address_source: AddressSource,
    /// Host name
    pub hostname: String,
    /// Panel domain (the address unless configured)
    pub domain: String,
    /// Administrative email (`admin@<hostname>` unless configured)
    pub email: String,
}

impl Environment {
    /// Detect the environment of the host behind `launcher`
    ///
    /// `domain` and `email` override the derived defaults. Only an unreadable or
    /// unsupported `/etc/os-release` is an error.
    pub async fn detect(
        launcher: &dyn Launcher,
        paths: &HostPaths,
        domain: Option<&str>,
        email: Option<&str>,
    ) -> Result<Self> {
        let os = read_os(paths)?;
        let (public_address, address_source) = detect_address(launcher).await;
        let hostname = detect_hostname(launcher).await;
        let env = Self::assemble(os, public_address, address_source, hostname, domain, email);

        info!(
            "Detected {} host {} at {} ({})",
            env.os, env.hostname, env.public_address, env.address_source
        );
        env.record(paths);
        Ok(env)
    }

    /// Environment without querying external services
    ///
    /// The last recorded detection is reused when present; otherwise the
    /// address comes from the local route, IPv6 and loopback fallbacks.
    pub async fn detect_local(
        launcher: &dyn Launcher,
        paths: &HostPaths,
        domain: Option<&str>,
        email: Option<&str>,
    ) -> Result<Self> {
        let os = read_os(paths)?;
        if let Some(recorded) = Self::recorded(paths) {
            debug!("Reusing environment recorded for {}", recorded.hostname);
            return Ok(Self {
                os,
                domain: domain.map(str::to_string).unwrap_or(recorded.domain),
                email: email.map(str::to_string).unwrap_or(recorded.email),
                ..recorded
            });
        }

        let (public_address, address_source) = local_address(launcher).await;
        let hostname = detect_hostname(launcher).await;
        Ok(Self::assemble(os, public_address, address_source, hostname, domain, email))
    }

    /// The environment recorded by the last full detection
    pub fn recorded(paths: &HostPaths) -> Option<Self> {
        let path = paths.data(ENVIRONMENT_FILE);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(env) => Some(env),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", path.display(), e);
                None
            }
        }
    }

    fn record(&self, paths: &HostPaths) {
        let path = paths.data(ENVIRONMENT_FILE);
        let written = serde_json::to_vec_pretty(self)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                fs::create_dir_all(paths.data_root())?;
                fs::write(&path, json)
            });
        if let Err(e) = written {
            debug!("Environment not recorded at {}: {}", path.display(), e);
        }
    }

    fn assemble(
        os: OsFamily,
        public_address: String,
        address_source: AddressSource,
        hostname: String,
        domain: Option<&str>,
        email: Option<&str>,
    ) -> Self {
        let domain = domain
            .map(str::to_string)
            .unwrap_or_else(|| public_address.clone());
        let email = email
            .map(str::to_string)
            .unwrap_or_else(|| format!("admin@{}", hostname));
        Self {
            os,
            public_address,
            address_source,
            hostname,
            domain,
            email,
        }
    }
}

fn read_os(paths: &HostPaths) -> Result<OsFamily> {
    let os_release = paths.host("/etc/os-release");
    let content = fs::read_to_string(&os_release).map_err(|e| {
        Error::Environment(format!("cannot read {}: {}", os_release.display(), e))
    })?;
    OsFamily::from_os_release(&content).ok_or_else(|| {
        Error::Environment("unsupported operating system (need a Debian or RHEL family)".to_string())
    })
}

/// Resolve the panel address; never fails
pub async fn detect_address(launcher: &dyn Launcher) -> (String, AddressSource) {
    for service in ECHO_SERVICES {
        let mut cmd = Command::new("curl");
        cmd.args(["-4", "-fsS", "--max-time", "5", service]);
        match launcher.execute(&cmd).await {
            Ok(result) if result.success() => {
                let candidate = result.trimmed();
                if candidate.parse::<Ipv4Addr>().is_ok() {
                    return (candidate.to_string(), AddressSource::Echo(service.to_string()));
                }
                debug!("{} returned a non-IPv4 answer: {:?}", service, candidate);
            }
            Ok(_) => debug!("{} unreachable", service),
            Err(e) => debug!("Failed to query {}: {}", service, e),
        }
    }
    local_address(launcher).await
}

/// Resolve an address from the host's own interfaces; never fails
pub async fn local_address(launcher: &dyn Launcher) -> (String, AddressSource) {
    let mut route = Command::new("ip");
    route.args(["-4", "route", "get", "1.1.1.1"]);
    if let Ok(result) = launcher.execute(&route).await {
        if result.success() {
            if let Some(address) = route_source(&result.output) {
                return (address.to_string(), AddressSource::LocalRoute);
            }
        }
    }

    let mut v6 = Command::new("ip");
    v6.args(["-6", "addr", "show", "scope", "global"]);
    if let Ok(result) = launcher.execute(&v6).await {
        if result.success() {
            if let Some(address) = first_inet6(&result.output) {
                return (address.to_string(), AddressSource::Ipv6);
            }
        }
    }

    warn!("No routable address found, falling back to loopback");
    (Ipv4Addr::LOCALHOST.to_string(), AddressSource::Loopback)
}

/// Resolve the host name; never fails
pub async fn detect_hostname(launcher: &dyn Launcher) -> String {
    for args in [&["-f"][..], &[][..]] {
        let mut cmd = Command::new("hostname");
        cmd.args(args);
        if let Ok(result) = launcher.execute(&cmd).await {
            let name = result.trimmed();
            if result.success() && !name.is_empty() {
                return name.to_string();
            }
        }
    }
    "localhost".to_string()
}

fn route_source(output: &str) -> Option<Ipv4Addr> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "src" {
            return tokens.next()?.parse().ok();
        }
    }
    None
}

fn first_inet6(output: &str) -> Option<Ipv6Addr> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        if tokens.next()? != "inet6" {
            return None;
        }
        let address = tokens.next()?;
        address.split('/').next()?.parse().ok()
    })
}

/// Whether a domain is an IP address or `localhost` (self-signed TLS only)
pub fn is_local_domain(domain: &str) -> bool {
    domain.eq_ignore_ascii_case("localhost")
        || domain.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_release_families() {
        let ubuntu = "NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(OsFamily::from_os_release(ubuntu), Some(OsFamily::Debian));

        let rocky = "ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\n";
        assert_eq!(OsFamily::from_os_release(rocky), Some(OsFamily::Rhel));

        let alpine = "ID=alpine\n";
        assert_eq!(OsFamily::from_os_release(alpine), None);
    }

    #[test]
    fn test_route_source_parsing() {
        let out = "1.1.1.1 via 10.0.0.1 dev eth0 src 10.0.0.5 uid 0\n    cache\n";
        assert_eq!(route_source(out), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(route_source("unreachable"), None);
    }

    #[test]
    fn test_inet6_parsing() {
        let out = "2: eth0: <BROADCAST> mtu 1500\n    inet6 2001:db8::10/64 scope global dynamic\n";
        assert_eq!(first_inet6(out), "2001:db8::10".parse().ok());
    }

    #[test]
    fn test_local_domains() {
        assert!(is_local_domain("203.0.113.7"));
        assert!(is_local_domain("localhost"));
        assert!(is_local_domain("::1"));
        assert!(!is_local_domain("blog.example.com"));
    }
}
