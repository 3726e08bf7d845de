//! Docker CLI helpers: containers, networks and images

use crate::context::ProvisionContext;
use crate::reconciler::StepRecorder;
use crate::{Error, Result};
use command_executor::Command;
use indexmap::IndexMap;
use panelo_state::UndoAction;
use std::path::PathBuf;
use tracing::{info, warn};

/// Observed container state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    /// Container id
    pub id: String,
    /// Docker state (`running`, `exited`, ...)
    pub state: String,
    /// Human readable status
    pub status: String,
    /// Whether the container is running
    pub is_running: bool,
}

/// Desired container
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Network to attach to
    pub network: Option<String>,
    /// Published ports (`[ip:]host:container`)
    pub publish: Vec<String>,
    /// Environment variables
    pub env: IndexMap<String, String>,
    /// Bind mounts (host path, container path)
    pub volumes: Vec<(PathBuf, String)>,
    /// Arguments passed to the image entrypoint
    pub args: Vec<String>,
}

impl ContainerSpec {
    /// Container `name` running `image`
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Self::default()
        }
    }

    /// Attach to a network
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Publish a port mapping
    pub fn publish(mut self, mapping: impl Into<String>) -> Self {
        self.publish.push(mapping.into());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Bind-mount a host path
    pub fn volume(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volumes.push((host.into(), container.into()));
        self
    }

    /// Append entrypoint arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The `docker run` command for this spec
    pub fn run_command(&self) -> Command {
        let mut cmd = Command::new("docker");
        cmd.args([
            "run",
            "-d",
            "--name",
            self.name.as_str(),
            "--restart",
            "unless-stopped",
        ]);
        if let Some(network) = &self.network {
            cmd.args(["--network", network.as_str()]);
        }
        for mapping in &self.publish {
            cmd.args(["-p", mapping.as_str()]);
        }
        for (key, value) in &self.env {
            cmd.arg("-e").arg(format!("{}={}", key, value));
        }
        for (host, container) in &self.volumes {
            cmd.arg("-v")
                .arg(format!("{}:{}", host.display(), container));
        }
        cmd.arg(&self.image);
        cmd.args(&self.args);
        cmd
    }
}

fn docker<const N: usize>(args: [&str; N]) -> Command {
    let mut cmd = Command::new("docker");
    cmd.args(args);
    cmd
}

/// Whether the docker CLI is installed
pub async fn is_installed(ctx: &ProvisionContext) -> bool {
    ctx.probe(&docker(["--version"])).await
}

/// Look up a container by exact name
pub async fn container_state(ctx: &ProvisionContext, name: &str) -> Result<Option<ContainerState>> {
    let filter = format!("name=^{}$", name);
    let cmd = docker([
        "ps",
        "-a",
        "--filter",
        filter.as_str(),
        "--format",
        "{{.ID}}|{{.State}}|{{.Status}}",
        "--no-trunc",
    ]);
    let result = ctx.execute(&cmd).await?;
    if !result.success() {
        return Ok(None);
    }

    let Some(line) = result.trimmed().lines().next() else {
        return Ok(None);
    };
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 3 {
        return Ok(None);
    }
    Ok(Some(ContainerState {
        id: parts[0].to_string(),
        state: parts[1].to_string(),
        status: parts[2].to_string(),
        is_running: parts[1] == "running",
    }))
}

/// Whether a container exists and is running
pub async fn is_running(ctx: &ProvisionContext, name: &str) -> Result<bool> {
    Ok(container_state(ctx, name)
        .await?
        .is_some_and(|state| state.is_running))
}

/// Ensure a container matching `spec` exists and runs
///
/// A running container of the same name is adopted as is; a stopped one is
/// started. Returns whether anything changed.
pub async fn ensure_container(
    ctx: &ProvisionContext,
    spec: &ContainerSpec,
    rec: &mut StepRecorder,
) -> Result<bool> {
    match container_state(ctx, &spec.name).await? {
        Some(existing) if existing.is_running => {
            info!(
                "Container '{}' is already running (status: {}). Adopting it.",
                spec.name, existing.status
            );
            Ok(false)
        }
        Some(existing) => {
            info!(
                "Container '{}' exists but is {}. Starting it.",
                spec.name, existing.state
            );
            ctx.run(&docker(["start", spec.name.as_str()])).await?;
            rec.note(format!("started container {}", spec.name));
            Ok(true)
        }
        None => {
            let result = ctx.run(&spec.run_command()).await?;
            info!(
                "Started container '{}' ({})",
                spec.name,
                result.trimmed().chars().take(12).collect::<String>()
            );
            rec.changed(
                format!("created container {}", spec.name),
                Some(UndoAction::RemoveContainer {
                    name: spec.name.clone(),
                }),
            );
            Ok(true)
        }
    }
}

/// Remove and recreate a container from `spec`
pub async fn recreate_container(
    ctx: &ProvisionContext,
    spec: &ContainerSpec,
    rec: &mut StepRecorder,
) -> Result<()> {
    if container_state(ctx, &spec.name).await?.is_some() {
        remove_container(ctx, &spec.name).await?;
    }
    ctx.run(&spec.run_command()).await?;
    rec.changed(
        format!("recreated container {}", spec.name),
        Some(UndoAction::RemoveContainer {
            name: spec.name.clone(),
        }),
    );
    Ok(())
}

/// Start an existing container
pub async fn start_container(ctx: &ProvisionContext, name: &str) -> Result<()> {
    match container_state(ctx, name).await? {
        Some(state) if state.is_running => Ok(()),
        Some(_) => ctx.run(&docker(["start", name])).await.map(|_| ()),
        None => Err(Error::NotFound(format!("container {}", name))),
    }
}

/// Stop a container when it runs
pub async fn stop_container(ctx: &ProvisionContext, name: &str) -> Result<()> {
    match container_state(ctx, name).await? {
        Some(state) if state.is_running => ctx.run(&docker(["stop", name])).await.map(|_| ()),
        Some(_) => Ok(()),
        None => {
            info!("Container {} not found, nothing to stop", name);
            Ok(())
        }
    }
}

/// Restart a container
pub async fn restart_container(ctx: &ProvisionContext, name: &str) -> Result<()> {
    if container_state(ctx, name).await?.is_none() {
        return Err(Error::NotFound(format!("container {}", name)));
    }
    ctx.run(&docker(["restart", name])).await.map(|_| ())
}

/// Force-remove a container; a missing container is fine
pub async fn remove_container(ctx: &ProvisionContext, name: &str) -> Result<()> {
    let result = ctx.execute(&docker(["rm", "-f", name])).await?;
    if !result.success() {
        warn!("Failed to remove container {}: {}", name, result.diagnostic());
    }
    Ok(())
}

/// Ensure the shared network exists
pub async fn ensure_network(
    ctx: &ProvisionContext,
    name: &str,
    subnet: &str,
    rec: &mut StepRecorder,
) -> Result<bool> {
    if ctx.probe(&docker(["network", "inspect", name])).await {
        return Ok(false);
    }
    ctx.run(&docker(["network", "create", "--subnet", subnet, name]))
        .await?;
    info!("Created network {} ({})", name, subnet);
    rec.changed(
        format!("created network {}", name),
        Some(UndoAction::RemoveNetwork {
            name: name.to_string(),
        }),
    );
    Ok(true)
}

/// Whether an image is present locally
pub async fn has_image(ctx: &ProvisionContext, image: &str) -> bool {
    ctx.probe(&docker(["image", "inspect", image])).await
}

/// Pull an image when it is not present
pub async fn ensure_image(ctx: &ProvisionContext, image: &str, rec: &mut StepRecorder) -> Result<bool> {
    if has_image(ctx, image).await {
        return Ok(false);
    }
    ctx.run(&docker(["pull", image])).await?;
    rec.note(format!("pulled {}", image));
    Ok(true)
}

/// Build an image from a context directory
pub async fn build_image(ctx: &ProvisionContext, tag: &str, dir: &std::path::Path) -> Result<()> {
    let mut cmd = Command::new("docker");
    cmd.args(["build", "-t", tag]).arg(dir);
    ctx.run(&cmd).await?;
    info!("Built image {}", tag);
    Ok(())
}

/// `docker exec` inside a container
pub fn exec(container: &str, env: &[(&str, &str)], interactive: bool, argv: &[&str]) -> Command {
    let mut cmd = Command::new("docker");
    cmd.arg("exec");
    if interactive {
        cmd.arg("-i");
    }
    for (key, value) in env {
        cmd.arg("-e").arg(format!("{}={}", key, value));
    }
    cmd.arg(container).args(argv);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_layout() {
        let spec = ContainerSpec::new("blog-alice", "wordpress:latest")
            .network("panelo-network")
            .publish("127.0.0.1:8100:80")
            .env("WORDPRESS_DB_HOST", "panelo-mysql")
            .volume("/var/lib/panelo/users/alice/apps/blog", "/var/www/html");
        assert_eq!(
            spec.run_command().display(),
            "docker run -d --name blog-alice --restart unless-stopped \
             --network panelo-network -p 127.0.0.1:8100:80 \
             -e WORDPRESS_DB_HOST=panelo-mysql \
             -v /var/lib/panelo/users/alice/apps/blog:/var/www/html wordpress:latest"
        );
    }

    #[test]
    fn test_exec_command() {
        let cmd = exec("panelo-mysql", &[("MYSQL_PWD", "pw")], true, &["mysql", "-uroot"]);
        assert_eq!(cmd.display(), "docker exec -i -e MYSQL_PWD=pw panelo-mysql mysql -uroot");
    }
}
