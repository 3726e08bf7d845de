//! Panel certificate

use super::web_server;
use crate::certificates::{self, CertificateKind, RENEWAL_THRESHOLD_DAYS, days_remaining, paths_for};
use crate::component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
use crate::context::ProvisionContext;
use crate::host::packages;
use crate::reconciler::{FileSet, StepRecorder};
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Panel certificate and the renewal schedule
pub struct SslComponent;

fn cron_path(ctx: &ProvisionContext) -> PathBuf {
    ctx.paths().host("/etc/cron.d/panelo-certbot")
}

fn cron(ctx: &ProvisionContext) -> String {
    super::cron_entry(ctx, "0 3 * * *", "cert renew", "/var/log/panelo-renew.log")
}

#[async_trait]
impl Component for SslComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Ssl
    }

    async fn inspect(&self, ctx: &ProvisionContext) -> Result<ComponentState> {
        let paths = paths_for(ctx, &ctx.env().domain);
        if !paths.cert.exists() {
            return Ok(ComponentState::Absent);
        }
        match days_remaining(&paths.cert) {
            Ok(days) if days <= RENEWAL_THRESHOLD_DAYS => {
                return Ok(ComponentState::Drifted(format!("certificate expires in {} days", days)));
            }
            Err(e) => return Ok(ComponentState::Drifted(e.to_string())),
            Ok(_) => {}
        }
        if !FileSet::new().file(cron_path(ctx), cron(ctx), 0o644).diff()?.is_empty() {
            return Ok(ComponentState::Drifted("renewal schedule differs".to_string()));
        }
        Ok(ComponentState::Present)
    }

    async fn install(&self, ctx: &ProvisionContext, rec: &mut StepRecorder) -> Result<Outcome> {
        let domain = ctx.env().domain.clone();
        if CertificateKind::for_domain(&domain) == CertificateKind::Acme {
            packages::ensure_installed(ctx, &certificates::certbot_packages(ctx.config().web_server), rec).await?;
        }

        certificates::issue(ctx, &domain, &ctx.env().email, rec).await?;
        if web_server::ensure_default_vhost(ctx, rec)? {
            web_server::reload(ctx).await?;
        }

        FileSet::ensure(cron_path(ctx), cron(ctx), 0o644, rec)?;
        Ok(rec.outcome())
    }

    async fn status(&self, ctx: &ProvisionContext) -> Result<ComponentStatus> {
        let paths = paths_for(ctx, &ctx.env().domain);
        if !paths.cert.exists() {
            return Ok(ComponentStatus::NotInstalled);
        }
        Ok(match days_remaining(&paths.cert) {
            Ok(days) if days > RENEWAL_THRESHOLD_DAYS => ComponentStatus::Installed,
            Ok(days) => ComponentStatus::Degraded(format!("expires in {} days", days)),
            Err(e) => ComponentStatus::Degraded(e.to_string()),
        })
    }
}
