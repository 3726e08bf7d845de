//! In-memory host for exercising components without touching the machine
//!
//! [`FakeHost`] answers the command lines panelo issues (package managers,
//! docker, systemctl, the firewall front ends, certbot, curl) from a small
//! mutable model of the host, so repeated runs observe the effects of earlier
//! ones. Files still land on disk under the fixture's `fs_root`.

use crate::certificates::{self, CertificateKind, CertificatePaths};
use crate::context::{HostPaths, ProvisionContext};
use crate::environment::{ECHO_SERVICES, Environment, OsFamily};
use crate::reconciler::StepRecorder;
use crate::Result;
use async_trait::async_trait;
use command_executor::{Command, ExitResult, Launcher};
use indexmap::IndexMap;
use panelo_config::Config;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A container known to the fake engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    /// Container id
    pub id: String,
    /// Image it was created from
    pub image: String,
    /// Whether it runs
    pub running: bool,
    /// Full `docker run` argument list
    pub run_args: Vec<String>,
}

#[derive(Debug, Default)]
struct HostState {
    packages: BTreeSet<String>,
    docker_installed: bool,
    containers: IndexMap<String, FakeContainer>,
    networks: BTreeSet<String>,
    images: BTreeSet<String>,
    enabled_units: BTreeSet<String>,
    active_units: BTreeSet<String>,
    firewall_ports: BTreeSet<u16>,
    firewall_active: bool,
    executed_sql: Vec<String>,
    calls: Vec<String>,
    fail_on: Vec<String>,
    next_id: u64,
    echo_address: Option<String>,
    route_address: Option<String>,
    ipv6_address: Option<String>,
    hostname: String,
}

/// Stateful stand-in for a Debian or RHEL host
#[derive(Debug)]
pub struct FakeHost {
    paths: HostPaths,
    state: Mutex<HostState>,
}

impl FakeHost {
    /// A bare host reachable at `203.0.113.10`
    pub fn new(paths: HostPaths) -> Self {
        let state = HostState {
            echo_address: Some("203.0.113.10".to_string()),
            route_address: Some("10.0.0.5".to_string()),
            hostname: "panel-host".to_string(),
            ..HostState::default()
        };
        Self {
            paths,
            state: Mutex::new(state),
        }
    }

    /// Answer of the echo services; `None` makes them unreachable
    pub fn set_echo_address(&self, address: Option<&str>) {
        self.state.lock().unwrap().echo_address = address.map(str::to_string);
    }

    /// Source address of the default route; `None` removes the route
    pub fn set_route_address(&self, address: Option<&str>) {
        self.state.lock().unwrap().route_address = address.map(str::to_string);
    }

    /// First global IPv6 address
    pub fn set_ipv6_address(&self, address: Option<&str>) {
        self.state.lock().unwrap().ipv6_address = address.map(str::to_string);
    }

    /// Fail every command whose rendered line starts with `prefix`
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.state.lock().unwrap().fail_on.push(prefix.into());
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().fail_on.clear();
    }

    /// Simulate a crashed container
    pub fn kill_container(&self, name: &str) {
        if let Some(container) = self.state.lock().unwrap().containers.get_mut(name) {
            container.running = false;
        }
    }

    /// Rendered command lines in execution order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of executed commands starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    /// Forget the call log
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Container by name
    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().unwrap().containers.get(name).cloned()
    }

    /// Container names in creation order
    pub fn containers(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    /// Whether a package is installed
    pub fn has_package(&self, package: &str) -> bool {
        self.state.lock().unwrap().packages.contains(package)
    }

    /// Whether a docker network exists
    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains(name)
    }

    /// Whether a unit is enabled
    pub fn unit_enabled(&self, unit: &str) -> bool {
        self.state.lock().unwrap().enabled_units.contains(unit_key(unit))
    }

    /// Whether a unit is active
    pub fn unit_active(&self, unit: &str) -> bool {
        self.state.lock().unwrap().active_units.contains(unit_key(unit))
    }

    /// Ports the firewall lets through
    pub fn open_ports(&self) -> BTreeSet<u16> {
        self.state.lock().unwrap().firewall_ports.clone()
    }

    /// SQL piped into the database clients
    pub fn executed_sql(&self) -> Vec<String> {
        self.state.lock().unwrap().executed_sql.clone()
    }

    fn respond(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> ExitResult {
        let mut state = self.state.lock().unwrap();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match program {
            "dpkg" | "rpm" => match args.as_slice() {
                [_, package] if state.packages.contains(*package) => ExitResult::ok(""),
                [_, package] => {
                    ExitResult::failed(1, format!("package {} is not installed", package))
                }
                _ => unknown(program),
            },
            "apt-get" | "dnf" => match args.as_slice() {
                ["update", ..] => ExitResult::ok(""),
                ["install", "-y", packages @ ..] => {
                    state.packages.extend(packages.iter().map(|p| p.to_string()));
                    ExitResult::ok("")
                }
                ["remove", "-y", packages @ ..] => {
                    for package in packages {
                        state.packages.remove(*package);
                    }
                    ExitResult::ok("")
                }
                _ => unknown(program),
            },
            "sh" => match args.as_slice() {
                ["-c", script] if script.contains("get.docker.com") => {
                    state.docker_installed = true;
                    state
                        .packages
                        .extend(["docker-ce", "docker-ce-cli", "containerd.io"].map(String::from));
                    ExitResult::ok("")
                }
                _ => ExitResult::ok(""),
            },
            "docker" => docker(&mut state, &args, stdin),
            "systemctl" => systemctl(&mut state, &args),
            "ufw" => ufw(&mut state, &args),
            "firewall-cmd" => firewall_cmd(&mut state, &args),
            "certbot" => match args.as_slice() {
                ["certonly", ..] => {
                    let Some(domain) = value_after(&args, "-d") else {
                        return ExitResult::failed(1, "no domain given");
                    };
                    drop(state);
                    self.issue_acme(domain)
                }
                ["renew", ..] => match value_after(&args, "--cert-name") {
                    Some(domain) => {
                        drop(state);
                        self.issue_acme(domain)
                    }
                    None => ExitResult::ok("no renewals were attempted"),
                },
                _ => unknown(program),
            },
            "curl" => {
                let url = args.last().copied().unwrap_or_default();
                if ECHO_SERVICES.contains(&url) {
                    match &state.echo_address {
                        Some(address) => ExitResult::ok(format!("{}\n", address)),
                        None => ExitResult::failed(6, "curl: (6) Could not resolve host"),
                    }
                } else if url.ends_with("/api/health") {
                    match state.containers.get("panelo-api") {
                        Some(api) if api.running => ExitResult::ok(r#"{"status":"ok"}"#),
                        _ => ExitResult::failed(7, "curl: (7) Connection refused"),
                    }
                } else {
                    ExitResult::ok("")
                }
            }
            "ip" => match args.as_slice() {
                ["-4", "route", "get", _] => match &state.route_address {
                    Some(address) => ExitResult::ok(format!(
                        "1.1.1.1 via 10.0.0.1 dev eth0 src {} uid 0\n    cache\n",
                        address
                    )),
                    None => ExitResult::failed(2, "RTNETLINK answers: Network is unreachable"),
                },
                ["-6", "addr", "show", ..] => match &state.ipv6_address {
                    Some(address) => ExitResult::ok(format!(
                        "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n    inet6 {}/64 scope global dynamic\n",
                        address
                    )),
                    None => ExitResult::ok(""),
                },
                _ => unknown(program),
            },
            "hostname" => ExitResult::ok(format!("{}\n", state.hostname)),
            "nginx" | "apachectl" | "a2enmod" => ExitResult::ok(""),
            _ => unknown(program),
        }
    }

    fn issue_acme(&self, domain: &str) -> ExitResult {
        let dir = self
            .paths
            .host(Path::new("/etc/letsencrypt/live").join(domain));
        let paths = CertificatePaths {
            cert: dir.join("fullchain.pem"),
            key: dir.join("privkey.pem"),
            kind: CertificateKind::Acme,
        };
        match certificates::generate_self_signed(domain, &paths, &mut StepRecorder::new()) {
            Ok(()) => ExitResult::ok("Successfully received certificate."),
            Err(e) => ExitResult::failed(1, e.to_string()),
        }
    }
}

#[async_trait]
impl Launcher for FakeHost {
    async fn execute(&self, command: &Command) -> command_executor::Result<ExitResult> {
        let line = command.display();
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(line.clone());
            if state.fail_on.iter().any(|prefix| line.starts_with(prefix.as_str())) {
                return Ok(ExitResult::failed(1, format!("injected failure: {}", line)));
            }
        }
        let program = command.get_program().to_string_lossy().into_owned();
        let args: Vec<String> = command
            .get_args()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        Ok(self.respond(&program, &args, command.get_stdin()))
    }
}

fn unknown(program: &str) -> ExitResult {
    ExitResult::failed(127, format!("{}: command not found", program))
}

fn unit_key(unit: &str) -> &str {
    unit.strip_suffix(".service").unwrap_or(unit)
}

fn value_after<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| *arg == flag)
        .and_then(|index| args.get(index + 1).copied())
}

fn docker(state: &mut HostState, args: &[&str], stdin: Option<&[u8]>) -> ExitResult {
    if !state.docker_installed {
        return unknown("docker");
    }
    match args {
        ["--version"] => ExitResult::ok("Docker version 27.3.1, build ce12230\n"),
        ["ps", "-a", "--filter", filter, ..] => {
            let name = filter
                .strip_prefix("name=^")
                .and_then(|rest| rest.strip_suffix('$'))
                .unwrap_or_default();
            match state.containers.get(name) {
                Some(c) if c.running => ExitResult::ok(format!("{}|running|Up 5 minutes\n", c.id)),
                Some(c) => ExitResult::ok(format!("{}|exited|Exited (0) 1 minute ago\n", c.id)),
                None => ExitResult::ok(""),
            }
        }
        ["run", "--rm", _image] => ExitResult::ok("Hello from Docker!\n"),
        ["run", rest @ ..] => docker_run(state, rest),
        ["start", name] | ["restart", name] => match state.containers.get_mut(*name) {
            Some(container) => {
                container.running = true;
                ExitResult::ok(format!("{}\n", name))
            }
            None => no_such_container(name),
        },
        ["stop", name] => match state.containers.get_mut(*name) {
            Some(container) => {
                container.running = false;
                ExitResult::ok(format!("{}\n", name))
            }
            None => no_such_container(name),
        },
        ["rm", "-f", name] => match state.containers.shift_remove(*name) {
            Some(_) => ExitResult::ok(format!("{}\n", name)),
            None => no_such_container(name),
        },
        ["network", "inspect", name] if state.networks.contains(*name) => ExitResult::ok("[]"),
        ["network", "inspect", name] => {
            ExitResult::failed(1, format!("Error: network {} not found", name))
        }
        ["network", "create", "--subnet", _, name] => {
            if !state.networks.insert(name.to_string()) {
                return ExitResult::failed(1, format!("network with name {} already exists", name));
            }
            ExitResult::ok("")
        }
        ["network", "rm", name] => {
            state.networks.remove(*name);
            ExitResult::ok("")
        }
        ["image", "inspect", image] if state.images.contains(*image) => ExitResult::ok("[]"),
        ["image", "inspect", image] => {
            ExitResult::failed(1, format!("Error: No such image: {}", image))
        }
        ["pull", image] => {
            state.images.insert(image.to_string());
            ExitResult::ok("")
        }
        ["build", "-t", tag, dir] => {
            if !PathBuf::from(dir).join("Dockerfile").is_file() {
                return ExitResult::failed(1, "failed to read dockerfile: no such file");
            }
            state.images.insert(tag.to_string());
            ExitResult::ok("")
        }
        ["exec", rest @ ..] => docker_exec(state, rest, stdin),
        _ => unknown("docker"),
    }
}

fn no_such_container(name: &str) -> ExitResult {
    ExitResult::failed(1, format!("Error: No such container: {}", name))
}

fn docker_run(state: &mut HostState, args: &[&str]) -> ExitResult {
    let mut name = None;
    let mut network = None;
    let mut index = 0;
    while index < args.len() {
        match args[index] {
            "-d" => index += 1,
            "--name" => {
                name = args.get(index + 1).copied();
                index += 2;
            }
            "--network" => {
                network = args.get(index + 1).copied();
                index += 2;
            }
            "--restart" | "-p" | "-e" | "-v" => index += 2,
            _ => break,
        }
    }
    let (Some(name), Some(image)) = (name, args.get(index)) else {
        return ExitResult::failed(125, "docker run requires --name and an image");
    };
    if state.containers.contains_key(name) {
        return ExitResult::failed(
            125,
            format!("Conflict. The container name \"/{}\" is already in use", name),
        );
    }
    if let Some(network) = network {
        if !state.networks.contains(network) {
            return ExitResult::failed(125, format!("network {} not found", network));
        }
    }

    state.next_id += 1;
    let id = format!("{:064x}", state.next_id);
    state.images.insert(image.to_string());
    state.containers.insert(
        name.to_string(),
        FakeContainer {
            id: id.clone(),
            image: image.to_string(),
            running: true,
            run_args: args.iter().map(|arg| arg.to_string()).collect(),
        },
    );
    ExitResult::ok(format!("{}\n", id))
}

fn docker_exec(state: &mut HostState, args: &[&str], stdin: Option<&[u8]>) -> ExitResult {
    let mut index = 0;
    while index < args.len() {
        match args[index] {
            "-i" => index += 1,
            "-e" => index += 2,
            _ => break,
        }
    }
    let Some(container) = args.get(index) else {
        return ExitResult::failed(1, "docker exec requires a container");
    };
    if !state.containers.get(*container).is_some_and(|c| c.running) {
        return ExitResult::failed(1, format!("Error: container {} is not running", container));
    }
    match args.get(index + 1).copied() {
        Some("mysqldump") => ExitResult::ok("-- MySQL dump\nCREATE DATABASE `server_panel`;\n"),
        Some("pg_dumpall") => ExitResult::ok("-- PostgreSQL database cluster dump\n"),
        Some("mysql") | Some("psql") => {
            let sql = stdin
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            state.executed_sql.push(sql);
            ExitResult::ok("")
        }
        Some("mysqladmin") => ExitResult::ok("mysqld is alive\n"),
        Some("pg_isready") => ExitResult::ok("/var/run/postgresql:5432 - accepting connections\n"),
        _ => ExitResult::ok(""),
    }
}

fn systemctl(state: &mut HostState, args: &[&str]) -> ExitResult {
    let check = |present: bool| {
        if present {
            ExitResult::ok("")
        } else {
            ExitResult::failed(3, "")
        }
    };
    match args {
        ["is-enabled", "--quiet", unit] => check(state.enabled_units.contains(unit_key(unit))),
        ["is-active", "--quiet", unit] => check(state.active_units.contains(unit_key(unit))),
        ["enable", "--now", unit] => {
            state.enabled_units.insert(unit_key(unit).to_string());
            state.active_units.insert(unit_key(unit).to_string());
            ExitResult::ok("")
        }
        ["enable", unit] => {
            state.enabled_units.insert(unit_key(unit).to_string());
            ExitResult::ok("")
        }
        ["disable", "--now", unit] => {
            state.enabled_units.remove(unit_key(unit));
            state.active_units.remove(unit_key(unit));
            ExitResult::ok("")
        }
        ["start", unit] | ["restart", unit] => {
            state.active_units.insert(unit_key(unit).to_string());
            ExitResult::ok("")
        }
        ["stop", unit] => {
            state.active_units.remove(unit_key(unit));
            ExitResult::ok("")
        }
        ["reload", unit] if state.active_units.contains(unit_key(unit)) => ExitResult::ok(""),
        ["reload", unit] => ExitResult::failed(
            1,
            format!("Job for {}.service failed: unit is not active", unit_key(unit)),
        ),
        ["daemon-reload"] => ExitResult::ok(""),
        _ => unknown("systemctl"),
    }
}

fn tcp_port(rule: &str) -> Option<u16> {
    rule.strip_suffix("/tcp")?.parse().ok()
}

fn ufw(state: &mut HostState, args: &[&str]) -> ExitResult {
    match args {
        ["status"] if !state.firewall_active => ExitResult::ok("Status: inactive\n"),
        ["status"] => {
            let mut out = String::from("Status: active\n\nTo                         Action      From\n--                         ------      ----\n");
            for port in &state.firewall_ports {
                out.push_str(&format!("{:<27}ALLOW       Anywhere\n", format!("{}/tcp", port)));
            }
            ExitResult::ok(out)
        }
        ["allow", rule] => match tcp_port(rule) {
            Some(port) => {
                state.firewall_ports.insert(port);
                ExitResult::ok("Rule added\n")
            }
            None => ExitResult::failed(1, "ERROR: Bad port"),
        },
        ["delete", "allow", rule] => match tcp_port(rule) {
            Some(port) => {
                state.firewall_ports.remove(&port);
                ExitResult::ok("Rule deleted\n")
            }
            None => ExitResult::failed(1, "ERROR: Bad port"),
        },
        ["--force", "enable"] => {
            state.firewall_active = true;
            ExitResult::ok("Firewall is active and enabled on system startup\n")
        }
        _ => unknown("ufw"),
    }
}

fn firewall_cmd(state: &mut HostState, args: &[&str]) -> ExitResult {
    match args {
        ["--state"] => ExitResult::ok("running\n"),
        ["--list-ports"] => {
            let ports: Vec<String> = state
                .firewall_ports
                .iter()
                .map(|port| format!("{}/tcp", port))
                .collect();
            ExitResult::ok(format!("{}\n", ports.join(" ")))
        }
        ["--reload"] => ExitResult::ok("success\n"),
        ["--permanent", flag] => {
            if let Some(port) = flag.strip_prefix("--add-port=").and_then(tcp_port) {
                state.firewall_ports.insert(port);
            } else if let Some(port) = flag.strip_prefix("--remove-port=").and_then(tcp_port) {
                state.firewall_ports.remove(&port);
            } else {
                return unknown("firewall-cmd");
            }
            ExitResult::ok("success\n")
        }
        _ => unknown("firewall-cmd"),
    }
}

const DEBIAN_RELEASE: &str = "PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nID=debian\nVERSION_ID=\"12\"\n";
const RHEL_RELEASE: &str = "NAME=\"Rocky Linux\"\nID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\nVERSION_ID=\"9.4\"\n";

/// A provisioning context over a [`FakeHost`] rooted in a temporary directory
pub struct Fixture {
    /// Temporary host root; removed on drop
    pub dir: TempDir,
    /// The fake host behind the context
    pub host: Arc<FakeHost>,
    /// Context wired to `host`
    pub ctx: ProvisionContext,
}

impl Fixture {
    /// Debian host with the default manifest
    pub async fn new() -> Result<Self> {
        Self::with_config(Config::default(), OsFamily::Debian).await
    }

    /// Host of `os` provisioned from `config`
    ///
    /// `fs_root` is pointed at the temporary directory and readiness polling
    /// is shortened.
    pub async fn with_config(mut config: Config, os: OsFamily) -> Result<Self> {
        let dir = TempDir::new()?;
        config.settings.fs_root = dir.path().to_path_buf();
        config.settings.readiness_attempts = 3;
        config.settings.readiness_interval_secs = 0;

        let paths = HostPaths::from_settings(&config.settings);
        let release = paths.host("/etc/os-release");
        if let Some(parent) = release.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = match os {
            OsFamily::Debian => DEBIAN_RELEASE,
            OsFamily::Rhel => RHEL_RELEASE,
        };
        std::fs::write(&release, content)?;

        let host = Arc::new(FakeHost::new(paths.clone()));
        let env = Environment::detect(
            host.as_ref(),
            &paths,
            config.domain.as_deref(),
            config.email.as_deref(),
        )
        .await?;
        let ctx = ProvisionContext::new(config, env, host.clone());
        Ok(Self { dir, host, ctx })
    }

    /// Rebuild the context with an edited manifest, keeping the host
    pub fn reconfigure(&mut self, edit: impl FnOnce(&mut Config)) {
        let mut config = self.ctx.config().clone();
        edit(&mut config);
        self.ctx = ProvisionContext::new(config, self.ctx.env().clone(), self.host.clone());
    }
}
