//! nginx or apache fronting the panel and deployed applications

use crate::certificates::{self, paths_for};
use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::environment::{OsFamily, is_local_domain};
use crate::host::{packages, systemd};
use crate::reconciler::{FileSet, StepRecorder};
use crate::vhost::{Vhost, vhost_path};
use crate::Result;
use async_trait::async_trait;
use command_executor::Command;
use panelo_config::WebServerKind;
use tracing::info;

/// Name of the catch-all virtual host routing to the panel
pub const DEFAULT_VHOST: &str = "panelo-default";

/// Upstream of the panel API
pub const API_PORT: u16 = 3001;

/// Upstream of the dashboard
pub const DASHBOARD_PORT: u16 = 3000;

/// Packages for the configured web server
fn web_packages(ctx: &ProvisionContext) -> Vec<&'static str> {
    match (ctx.config().web_server, ctx.env().os) {
        (WebServerKind::Nginx, _) => vec!["nginx"],
        (WebServerKind::Apache, OsFamily::Debian) => vec!["apache2"],
        (WebServerKind::Apache, OsFamily::Rhel) => vec!["httpd", "mod_ssl"],
    }
}

/// systemd unit of the configured web server
pub fn service(ctx: &ProvisionContext) -> &'static str {
    match ctx.config().web_server {
        WebServerKind::Nginx => "nginx",
        WebServerKind::Apache => ctx.env().os.apache_service(),
    }
}

/// The desired catch-all virtual host
///
/// TLS is served once a certificate for the panel domain exists, so the web
/// server and ssl steps converge on the same file.
pub fn default_vhost(ctx: &ProvisionContext) -> Vhost {
    let mut vhost = Vhost::proxy("_", DASHBOARD_PORT);
    vhost.routes.insert(0, ("/api/".to_string(), API_PORT));
    vhost.default_server = true;

    let cert = paths_for(ctx, &ctx.env().domain);
    if cert.cert.exists() && cert.key.exists() {
        vhost = vhost.with_tls(&cert.cert, &cert.key);
    }
    vhost
}

/// Files owned by this component
fn desired_files(ctx: &ProvisionContext) -> FileSet {
    let vhost = default_vhost(ctx);
    let mut files = FileSet::new().file(
        vhost_path(ctx, DEFAULT_VHOST),
        vhost.render(ctx.config().web_server),
        0o644,
    );
    // The distribution's own default site competes for default_server
    if ctx.config().web_server == WebServerKind::Nginx && ctx.env().os == OsFamily::Debian {
        files = files.absent(ctx.paths().host("/etc/nginx/sites-enabled/default"));
    }
    files
}

/// Write the catch-all virtual host; returns whether anything changed
pub fn ensure_default_vhost(ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<bool> {
    Ok(!desired_files(ctx).apply(rec)?.is_empty())
}

/// Validate the configuration and reload the web server
pub async fn reload(ctx: &ProvisionContext) -> Result<()> {
    let test = match ctx.config().web_server {
        WebServerKind::Nginx => Command::builder("nginx").arg("-t").build(),
        WebServerKind::Apache => Command::builder("apachectl").arg("configtest").build(),
    };
    ctx.run(&test).await?;
    systemd::reload(ctx, service(ctx)).await?;
    info!("Reloaded {}", service(ctx));
    Ok(())
}

/// Enable the proxy modules apache needs on Debian
async fn ensure_apache_modules(ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<()> {
    let enabled = ctx
        .paths()
        .host("/etc/apache2/mods-enabled/proxy_http.load");
    if enabled.exists() {
        return Ok(());
    }
    let cmd = Command::builder("a2enmod")
        .args(["proxy", "proxy_http", "ssl", "headers", "rewrite"])
        .build();
    ctx.run(&cmd).await?;
    rec.note("enabled apache proxy modules");
    Ok(())
}

/// Reverse proxy in front of the panel and applications
pub struct WebServerComponent;

#[async_trait]
impl Component for WebServerComponent {
    fn id(&self) -> ComponentId {
        ComponentId::WebServer
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        let missing = packages::missing(ctx, &web_packages(ctx)).await;
        if !missing.is_empty() {
            return Ok(ComponentState::Absent);
        }
        let deltas = desired_files(ctx).diff()?;
        if !deltas.is_empty() {
            return Ok(ComponentState::Drifted(format!(
                "{} differs",
                deltas[0].path().display()
            )));
        }
        Ok(ComponentState::Present)
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        packages::ensure_installed(ctx, &web_packages(ctx), rec).await?;
        if ctx.config().web_server == WebServerKind::Apache && ctx.env().os == OsFamily::Debian {
            ensure_apache_modules(ctx, rec).await?;
        }

        // IP and localhost panels are served over a self-signed certificate
        let domain = ctx.env().domain.clone();
        if is_local_domain(&domain) {
            certificates::issue(ctx, &domain, &ctx.env().email, rec).await?;
        }

        let files_changed = ensure_default_vhost(ctx, rec)?;
        let started = systemd::enable_now(ctx, service(ctx), rec).await?;
        if files_changed && !started {
            reload(ctx).await?;
        }
        Ok(rec.outcome())
    }

    async fn start(&self, ctx: &ProvisionContext) -> Result<()> {
        systemd::start(ctx, service(ctx)).await
    }

    async fn stop(&self, ctx: &ProvisionContext) -> Result<()> {
        systemd::stop(ctx, service(ctx)).await
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        if !packages::missing(ctx, &web_packages(ctx)).await.is_empty() {
            return Ok(ComponentStatus::NotInstalled);
        }
        Ok(if systemd::is_active(ctx, service(ctx)).await {
            ComponentStatus::Running
        } else {
            ComponentStatus::Stopped
        })
    }
}
