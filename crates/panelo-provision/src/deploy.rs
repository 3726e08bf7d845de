//! Application deployment and lifecycle
//!
//! A deployment is a container named `<name>-<user>` built or pulled from the
//! kind's template, published on a host port handed out by the port
//! allocator and routed through a reverse-proxy virtual host. Deploying the
//! same application again converges on the same container, port and vhost.

use crate::certificates::{self, CertificatePaths};
use crate::component::Outcome;
use crate::components::{self, database, web_server};
use crate::context::ProvisionContext;
use crate::credentials;
use crate::driver::apply_undo;
use crate::environment::is_local_domain;
use crate::host::docker::{self, ContainerSpec};
use crate::host::{firewall, packages};
use crate::reconciler::{FileSet, StepRecorder};
use crate::templates::{AppTemplate, ImageSource};
use crate::vhost::{Vhost, vhost_path};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use panelo_config::{AppKind, DatabaseKind};
use panelo_state::{
    AppStatus, Application, Domain, DomainStatus, ProvisionRun, RunStatus, StepOutcome,
    StepRecord, app_key,
};
use regex::Regex;
use serde_json::json;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What to deploy
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Application name
    pub name: String,
    /// Routed domain
    pub domain: String,
    /// Template kind
    pub kind: AppKind,
    /// Framework variant; empty or `None` selects the default
    pub variant: Option<String>,
    /// Runtime version; empty or `None` selects the default
    pub version: Option<String>,
    /// Owning user, created when unknown
    pub user: String,
    /// Request a certificate for the domain
    pub tls: bool,
}

/// Result of a deployment
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Container name
    pub container: String,
    /// Host port the container is published on
    pub port: u16,
    /// Virtual host file
    pub vhost_path: PathBuf,
    /// Certificate serving the domain
    pub certificate: Option<CertificatePaths>,
    /// Whether the host changed
    pub outcome: Outcome,
}

/// Row of `app list`
#[derive(Debug, Clone)]
pub struct AppSummary {
    /// Application name
    pub name: String,
    /// Owner name
    pub user: String,
    /// Kind
    pub kind: AppKind,
    /// Domain
    pub domain: String,
    /// Host port
    pub port: u16,
    /// Recorded status
    pub status: AppStatus,
    /// Container name
    pub container: String,
    /// Last update
    pub updated_at: DateTime<Utc>,
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").expect("static pattern compiles"))
}

fn user_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]{1,32}$").expect("static pattern compiles"))
}

/// Normalize an application name
///
/// Names become part of container names, directories and database names, so
/// only lowercase alphanumerics and dashes are accepted.
pub fn sanitize_name(raw: &str) -> Result<String> {
    let name = raw.trim().to_ascii_lowercase();
    if name_pattern().is_match(&name) {
        Ok(name)
    } else {
        Err(Error::Config(format!(
            "invalid application name '{}' (use lowercase letters, digits and dashes)",
            raw
        )))
    }
}

/// Normalize a user name
///
/// The user is the suffix after the last dash of `<name>-<user>`, so user
/// names carry no dashes.
pub fn sanitize_user(raw: &str) -> Result<String> {
    let name = raw.trim().to_ascii_lowercase();
    if user_pattern().is_match(&name) {
        Ok(name)
    } else {
        Err(Error::Config(format!(
            "invalid user name '{}' (use lowercase letters and digits)",
            raw
        )))
    }
}

fn validate_domain(raw: &str) -> Result<String> {
    let domain = raw.trim().to_ascii_lowercase();
    let valid = !domain.is_empty()
        && domain.len() <= 253
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));
    if valid {
        Ok(domain)
    } else {
        Err(Error::Config(format!("invalid domain '{}'", raw)))
    }
}

/// WordPress database of an application
pub fn wordpress_database(name: &str, user: &str) -> String {
    format!("wp_{}_{}", name, user).replace('-', "_")
}

/// Resolved identity of one deployment
struct Target<'t> {
    name: &'t str,
    user: &'t str,
    domain: &'t str,
    container: &'t str,
    port: u16,
    template: &'t AppTemplate,
}

/// Deploys applications and runs their lifecycle verbs
pub struct Deployer<'a> {
    ctx: &'a ProvisionContext,
}

impl<'a> Deployer<'a> {
    /// Deployer over `ctx`
    pub fn new(ctx: &'a ProvisionContext) -> Self {
        Self { ctx }
    }

    /// Deploy or converge an application
    ///
    /// The deployment is journaled as its own run; when a step fails and
    /// `rollback_on_failure` is set, the files and containers it created are
    /// removed again and a newly allocated port is released.
    pub async fn deploy(&self, request: DeployRequest) -> Result<Deployment> {
        let ctx = self.ctx;
        let name = sanitize_name(&request.name)?;
        let user = sanitize_user(&request.user)?;
        let domain = validate_domain(&request.domain)?;
        let template = AppTemplate::resolve(
            request.kind,
            request.variant.as_deref(),
            request.version.as_deref(),
        )?;
        if template.kind == AppKind::Wordpress && ctx.config().database != DatabaseKind::Mysql {
            return Err(Error::Config(
                "wordpress deployments need the mysql database engine".to_string(),
            ));
        }

        let _lock = ctx.lock()?;
        let container = app_key(&name, &user);
        let journal = ctx.journal();
        let mut run = ProvisionRun::new(format!("deploy {}", container));
        journal.save(&run)?;

        let (owner, port, existed) =
            match self.reserve(&name, &user, &domain, &container, &template) {
                Ok(reserved) => reserved,
                Err(e) => {
                    run.finish(RunStatus::Failed {
                        error: e.to_string(),
                    });
                    journal.save(&run)?;
                    return Err(e);
                }
            };
        info!("Deploying {} ({}) on port {}", container, template.kind, port);
        let target = Target {
            name: &name,
            user: &user,
            domain: &domain,
            container: &container,
            port,
            template: &template,
        };

        let started_at = Utc::now();
        let mut rec = StepRecorder::new();
        let result = self.converge(&target, request.tls, &mut rec).await;
        let outcome = rec.outcome();

        run.record(StepRecord {
            component: container.clone(),
            outcome: match &result {
                Ok(_) => StepOutcome::from(outcome.clone()),
                Err(e) => StepOutcome::Failed {
                    error: e.to_string(),
                },
            },
            started_at,
            finished_at: Some(Utc::now()),
            undo: rec.take_undo(),
        });

        let certificate = match result {
            Ok(certificate) => certificate,
            Err(e) => {
                error!("Deployment of {} failed: {}", container, e);
                let status = if ctx.config().settings.rollback_on_failure {
                    for action in run.undo_plan() {
                        if let Err(undo_err) = apply_undo(ctx, &action).await {
                            warn!("Undo failed ({}): {}", action.describe(), undo_err);
                        }
                    }
                    if !existed {
                        self.forget(&container, &domain, owner)?;
                    }
                    RunStatus::RolledBack {
                        error: Some(e.to_string()),
                    }
                } else {
                    RunStatus::Failed {
                        error: e.to_string(),
                    }
                };
                run.finish(status);
                journal.save(&run)?;
                return Err(e);
            }
        };

        let status = if docker::is_running(ctx, &container).await? {
            AppStatus::Running
        } else {
            AppStatus::Error
        };
        let now = Utc::now();
        ctx.store().update(|state| {
            state.upsert_application(Application {
                id: Uuid::new_v4(),
                owner,
                name: name.clone(),
                kind: template.kind,
                domain: domain.clone(),
                port,
                status,
                container: container.clone(),
                config: json!({
                    "variant": template.variant,
                    "image": template.run_image(&container),
                    "tls": request.tls,
                }),
                created_at: now,
                updated_at: now,
            });
            Ok::<_, Error>(())
        })?;

        run.finish(RunStatus::Succeeded);
        journal.save(&run)?;
        info!("Deployed {} at {} ({})", container, domain, status);

        Ok(Deployment {
            vhost_path: vhost_path(ctx, &container),
            container,
            port,
            certificate,
            outcome,
        })
    }

    /// Ensure the owner, claim the domain and allocate the port
    fn reserve(
        &self,
        name: &str,
        user: &str,
        domain: &str,
        container: &str,
        template: &AppTemplate,
    ) -> Result<(Uuid, u16, bool)> {
        let ctx = self.ctx;
        let email = format!("{}@{}", user, ctx.env().hostname);
        let pool = ctx.config().port_pool(template.kind);
        ctx.store().update(|state| {
            let owner = state.ensure_user(user, &email)?;
            if let Some(existing) = state.domain(domain) {
                if existing.owner != owner.id {
                    return Err(panelo_state::Error::DomainExists(domain.to_string()).into());
                }
            }
            if let Some(other) = state
                .applications
                .iter()
                .find(|app| app.container == container && (app.owner != owner.id || app.name != name))
            {
                return Err(Error::Config(format!(
                    "container {} already belongs to application {}",
                    container, other.name
                )));
            }
            if let Some(other) = state
                .applications
                .iter()
                .find(|app| app.domain == domain && (app.owner != owner.id || app.name != name))
            {
                return Err(Error::Config(format!(
                    "domain {} is already routed to {}",
                    domain, other.container
                )));
            }
            let existed = state.application(name, user).is_some();
            let port = state.ports.allocate(container, template.kind, pool)?;

            let mut record = state
                .domain(domain)
                .cloned()
                .unwrap_or_else(|| Domain::new(owner.id, domain));
            if record.status != DomainStatus::Active {
                record.status = DomainStatus::Pending;
            }
            state.upsert_domain(record)?;
            Ok::<_, Error>((owner.id, port, existed))
        })
    }

    /// Drop the records of a deployment that never completed
    fn forget(&self, container: &str, domain: &str, owner: Uuid) -> Result<()> {
        self.ctx.store().update(|state| {
            state.ports.release(container);
            let used = state.applications.iter().any(|app| app.domain == domain);
            if !used && state.domain(domain).is_some_and(|d| d.owner == owner) {
                state.remove_domain(domain);
            }
            Ok::<_, Error>(())
        })
    }

    async fn converge(
        &self,
        t: &Target<'_>,
        tls: bool,
        rec: &mut StepRecorder,
    ) -> Result<Option<CertificatePaths>> {
        let ctx = self.ctx;
        let template = t.template;
        let app_dir = ctx.paths().app_dir(t.user, t.name);
        fs::create_dir_all(&app_dir)?;
        for (file, contents) in template.placeholder_sources(t.name, t.domain) {
            FileSet::seed(app_dir.join(file), contents, 0o644, rec)?;
        }

        let image = template.run_image(t.container);
        match &template.image {
            ImageSource::Pull(pulled) => {
                docker::ensure_image(ctx, pulled, rec).await?;
            }
            ImageSource::Build { base } => {
                docker::ensure_image(ctx, base, rec).await?;
                let dockerfile = template.dockerfile().unwrap_or_default();
                let changed = FileSet::ensure(app_dir.join("Dockerfile"), dockerfile, 0o644, rec)?;
                if changed || !docker::has_image(ctx, &image).await {
                    docker::build_image(ctx, &image, &app_dir).await?;
                    rec.note(format!("built {}", image));
                }
            }
        }

        let mut spec = ContainerSpec::new(t.container, image)
            .network(ctx.config().settings.network.clone())
            .publish(format!("127.0.0.1:{}:{}", t.port, template.container_port));
        for (key, value) in template.static_env() {
            spec = spec.env(key, value);
        }
        if template.kind == AppKind::Wordpress {
            let root_password = credentials::database_root_password(ctx)?;
            let db_name = wordpress_database(t.name, t.user);
            let sql = format!("CREATE DATABASE IF NOT EXISTS `{}`;\n", db_name);
            ctx.run(&database::sql_command(DatabaseKind::Mysql, &root_password, sql))
                .await?;
            spec = spec
                .env(
                    "WORDPRESS_DB_HOST",
                    format!("{}:3306", database::container_name(DatabaseKind::Mysql)),
                )
                .env("WORDPRESS_DB_USER", "root")
                .env("WORDPRESS_DB_PASSWORD", root_password)
                .env("WORDPRESS_DB_NAME", db_name);
        }
        if let Some(mount) = template.mount_point() {
            spec = spec.volume(&app_dir, mount);
        }
        docker::ensure_container(ctx, &spec, rec).await?;

        let wants_tls = tls && !is_local_domain(t.domain);
        if tls && !wants_tls {
            warn!("Not requesting a certificate for local domain {}", t.domain);
        }
        let paths = certificates::paths_for(ctx, t.domain);
        let existing = (wants_tls && paths.cert.exists() && paths.key.exists()).then_some(paths);
        if self.write_vhost(t, existing.as_ref(), rec)? {
            web_server::reload(ctx).await?;
        }

        let certificate = if wants_tls {
            packages::ensure_installed(
                ctx,
                &certificates::certbot_packages(ctx.config().web_server),
                rec,
            )
            .await?;
            match certificates::issue(ctx, t.domain, &ctx.env().email, rec).await {
                Ok(paths) => Some(paths),
                Err(e) => {
                    warn!("Certificate for {} not issued: {}", t.domain, e);
                    existing
                }
            }
        } else {
            None
        };
        if let Some(paths) = &certificate {
            if self.write_vhost(t, Some(paths), rec)? {
                web_server::reload(ctx).await?;
            }
        }
        let domain_status = if wants_tls && certificate.is_none() {
            DomainStatus::Failed
        } else {
            DomainStatus::Active
        };
        self.mark_domain(t.domain, domain_status)?;

        if components::firewall::managed(ctx.config())? {
            firewall::ensure_open(ctx, &BTreeSet::from([t.port]), rec).await?;
        }
        Ok(certificate)
    }

    fn write_vhost(
        &self,
        t: &Target<'_>,
        tls: Option<&CertificatePaths>,
        rec: &mut StepRecorder,
    ) -> Result<bool> {
        let mut vhost = Vhost::proxy(t.domain, t.port);
        if let Some(paths) = tls {
            vhost = vhost.with_tls(&paths.cert, &paths.key);
        }
        let text = vhost.render(self.ctx.config().web_server);
        FileSet::ensure(vhost_path(self.ctx, t.container), text, 0o644, rec)
    }

    fn mark_domain(&self, domain: &str, status: DomainStatus) -> Result<()> {
        self.ctx.store().update(|state| {
            if let Some(mut record) = state.domain(domain).cloned() {
                record.status = status;
                state.upsert_domain(record)?;
            }
            Ok::<_, Error>(())
        })
    }

    fn application(&self, name: &str, user: &str) -> Result<Application> {
        let state = self.ctx.store().load()?;
        state
            .application(name, user)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("application {}", app_key(name, user))))
    }

    fn set_status(&self, name: &str, user: &str, status: AppStatus) -> Result<()> {
        self.ctx
            .store()
            .update(|state| state.set_application_status(name, user, status).map_err(Error::from))
    }

    /// Container state of an application, persisted on the record
    pub async fn status(&self, name: &str, user: &str) -> Result<AppStatus> {
        let app = self.application(name, user)?;
        let status = match docker::container_state(self.ctx, &app.container).await? {
            Some(state) if state.is_running => AppStatus::Running,
            Some(_) => AppStatus::Stopped,
            None => AppStatus::Error,
        };
        if status != app.status {
            self.set_status(name, user, status)?;
        }
        Ok(status)
    }

    /// Start an application container
    pub async fn start(&self, name: &str, user: &str) -> Result<()> {
        let app = self.application(name, user)?;
        docker::start_container(self.ctx, &app.container).await?;
        self.set_status(name, user, AppStatus::Running)
    }

    /// Stop an application container
    pub async fn stop(&self, name: &str, user: &str) -> Result<()> {
        let app = self.application(name, user)?;
        docker::stop_container(self.ctx, &app.container).await?;
        self.set_status(name, user, AppStatus::Stopped)
    }

    /// Restart an application container
    pub async fn restart(&self, name: &str, user: &str) -> Result<()> {
        let app = self.application(name, user)?;
        docker::restart_container(self.ctx, &app.container).await?;
        self.set_status(name, user, AppStatus::Running)
    }

    /// Remove an application: container, vhost, firewall rule, port and records
    ///
    /// The application directory is kept.
    pub async fn remove(&self, name: &str, user: &str) -> Result<Application> {
        let ctx = self.ctx;
        let _lock = ctx.lock()?;
        let app = self.application(name, user)?;

        docker::remove_container(ctx, &app.container).await?;
        let mut rec = StepRecorder::new();
        if FileSet::ensure_absent(vhost_path(ctx, &app.container), &mut rec)? {
            web_server::reload(ctx).await?;
        }
        if firewall::open_ports(ctx).await?.contains(&app.port) {
            for cmd in firewall::close_commands(ctx.env().os, app.port) {
                ctx.run(&cmd).await?;
            }
        }

        let removed = ctx.store().update(|state| {
            let removed = state.remove_application(name, user)?;
            let used = state.applications.iter().any(|other| other.domain == removed.domain);
            if !used && state.domain(&removed.domain).is_some_and(|d| d.owner == removed.owner) {
                state.remove_domain(&removed.domain);
            }
            Ok::<_, Error>(removed)
        })?;
        info!("Removed application {}", removed.container);
        Ok(removed)
    }

    /// Every application with its owner
    pub fn list(&self) -> Result<Vec<AppSummary>> {
        let state = self.ctx.store().load()?;
        Ok(state
            .applications
            .iter()
            .map(|app| AppSummary {
                name: app.name.clone(),
                user: state
                    .user_by_id(app.owner)
                    .map(|u| u.name.clone())
                    .unwrap_or_else(|| "?".to_string()),
                kind: app.kind,
                domain: app.domain.clone(),
                port: app.port,
                status: app.status,
                container: app.container.clone(),
                updated_at: app.updated_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name(" Blog ").unwrap(), "blog");
        assert_eq!(sanitize_name("my-blog-2").unwrap(), "my-blog-2");
        for bad in ["", "-blog", "my blog", "../etc", "blog_1"] {
            assert!(sanitize_name(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_user_names_have_no_dashes() {
        assert_eq!(sanitize_user("Alice2").unwrap(), "alice2");
        for bad in ["", "blog-alice", "alice_2", "a b"] {
            assert!(sanitize_user(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_domain_validation() {
        assert_eq!(validate_domain("Blog.Example.com").unwrap(), "blog.example.com");
        assert!(validate_domain("203.0.113.7").is_ok());
        assert!(validate_domain("").is_err());
        assert!(validate_domain("evil.com; rm -rf /").is_err());
    }

    #[test]
    fn test_wordpress_database_name() {
        assert_eq!(wordpress_database("my-blog", "alice"), "wp_my_blog_alice");
    }
}
