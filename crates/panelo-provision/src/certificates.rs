//! Certificate issuance and renewal
//!
//! IP addresses and `localhost` get a self-signed certificate under
//! `<data_root>/ssl/<domain>/`; certbot is never invoked for them. Real domain
//! names are issued through certbot's web server plugin. Certificates with more
//! than [`RENEWAL_THRESHOLD_DAYS`] of validity left are reused.

use crate::context::ProvisionContext;
use crate::environment::is_local_domain;
use crate::reconciler::{FileSet, StepRecorder};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use command_executor::Command;
use panelo_config::WebServerKind;
use panelo_state::{Domain, DomainStatus, Role};
use serde::Serialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Certificates with this many days left or fewer are renewed
pub const RENEWAL_THRESHOLD_DAYS: i64 = 30;

/// Validity of generated self-signed certificates
pub const SELF_SIGNED_VALIDITY_DAYS: i64 = 365;

/// How a certificate is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateKind {
    /// Generated locally
    SelfSigned,
    /// Issued by an ACME CA through certbot
    Acme,
}

impl CertificateKind {
    /// Kind used for a domain
    pub fn for_domain(domain: &str) -> Self {
        if is_local_domain(domain) {
            CertificateKind::SelfSigned
        } else {
            CertificateKind::Acme
        }
    }
}

/// Certificate and key locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    /// Certificate chain
    pub cert: PathBuf,
    /// Private key
    pub key: PathBuf,
    /// How it was obtained
    pub kind: CertificateKind,
}

/// Per-domain renewal result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalResult {
    /// Certificate was renewed
    Renewed,
    /// Certificate has enough validity left
    Untouched {
        /// Days of validity left
        days_left: i64,
    },
    /// Renewal failed
    Failed(String),
}

/// Renewal report for one domain
#[derive(Debug, Clone)]
pub struct RenewalReport {
    /// Domain name
    pub domain: String,
    /// Result
    pub result: RenewalResult,
}

/// Certificate listing entry
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Domain name
    pub domain: String,
    /// How it was obtained
    pub kind: CertificateKind,
    /// Certificate path
    pub cert: PathBuf,
    /// Days of validity left when readable
    pub days_left: Option<i64>,
}

/// Expected certificate locations for a domain
pub fn paths_for(ctx: &ProvisionContext, domain: &str) -> CertificatePaths {
    match CertificateKind::for_domain(domain) {
        CertificateKind::SelfSigned => {
            let dir = ctx.paths().ssl_dir(domain);
            CertificatePaths {
                cert: dir.join("cert.pem"),
                key: dir.join("key.pem"),
                kind: CertificateKind::SelfSigned,
            }
        }
        CertificateKind::Acme => {
            let dir = ctx
                .paths()
                .host(Path::new("/etc/letsencrypt/live").join(domain));
            CertificatePaths {
                cert: dir.join("fullchain.pem"),
                key: dir.join("privkey.pem"),
                kind: CertificateKind::Acme,
            }
        }
    }
}

/// certbot and its plugin for the web server
pub fn certbot_packages(web_server: WebServerKind) -> Vec<&'static str> {
    match web_server {
        WebServerKind::Nginx => vec!["certbot", "python3-certbot-nginx"],
        WebServerKind::Apache => vec!["certbot", "python3-certbot-apache"],
    }
}

/// Issue a certificate for `domain`, reusing a valid existing one
pub async fn issue(
    ctx: &ProvisionContext,
    domain: &str,
    email: &str,
    rec: &mut StepRecorder,
) -> Result<CertificatePaths> {
    let paths = paths_for(ctx, domain);

    if paths.cert.exists() {
        match days_remaining(&paths.cert) {
            Ok(days) if days > RENEWAL_THRESHOLD_DAYS => {
                debug!("Reusing certificate for {} ({} days left)", domain, days);
                record_domain(ctx, domain, &paths)?;
                return Ok(paths);
            }
            Ok(days) => info!("Certificate for {} expires in {} days, reissuing", domain, days),
            Err(e) => warn!("Unreadable certificate for {}: {}", domain, e),
        }
    }

    match paths.kind {
        CertificateKind::SelfSigned => generate_self_signed(domain, &paths, rec)?,
        CertificateKind::Acme => {
            ctx.run(&certonly_command(ctx, domain, email)).await?;
            rec.note(format!("issued certificate for {}", domain));
        }
    }
    info!("Issued {:?} certificate for {}", paths.kind, domain);
    record_domain(ctx, domain, &paths)?;
    Ok(paths)
}

fn certonly_command(ctx: &ProvisionContext, domain: &str, email: &str) -> Command {
    let plugin = format!("--{}", ctx.config().web_server.as_str());
    let mut cmd = Command::new("certbot");
    cmd.args([
        "certonly",
        plugin.as_str(),
        "--non-interactive",
        "--agree-tos",
        "-m",
        email,
        "-d",
        domain,
    ]);
    cmd
}

/// Generate a self-signed certificate for `domain` at `paths`
pub fn generate_self_signed(
    domain: &str,
    paths: &CertificatePaths,
    rec: &mut StepRecorder,
) -> Result<()> {
    use rcgen::{CertificateParams, DistinguishedName};

    let mut params = CertificateParams::default();
    params.not_before = time::OffsetDateTime::now_utc();
    params.not_after =
        time::OffsetDateTime::now_utc() + time::Duration::days(SELF_SIGNED_VALIDITY_DAYS);

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(rcgen::DnType::CommonName, domain);
    distinguished_name.push(rcgen::DnType::OrganizationName, "Panelo");
    params.distinguished_name = distinguished_name;

    params.subject_alt_names = match domain.parse::<IpAddr>() {
        Ok(ip) => vec![rcgen::SanType::IpAddress(ip)],
        Err(_) => vec![rcgen::SanType::DnsName(domain.to_string())],
    };

    let cert = rcgen::Certificate::from_params(params)
        .map_err(|e| Error::Certificate(format!("failed to generate certificate: {}", e)))?;
    let cert_pem = cert
        .serialize_pem()
        .map_err(|e| Error::Certificate(format!("failed to serialize certificate: {}", e)))?;
    let key_pem = cert.serialize_private_key_pem();

    FileSet::new()
        .file(&paths.cert, cert_pem, 0o644)
        .file(&paths.key, key_pem, 0o600)
        .apply(rec)?;
    Ok(())
}

/// Days until the certificate at `cert_path` expires
pub fn days_remaining(cert_path: &Path) -> Result<i64> {
    use x509_parser::prelude::*;

    let cert_pem = fs::read_to_string(cert_path)?;

    let start = cert_pem
        .find("-----BEGIN CERTIFICATE-----")
        .ok_or_else(|| Error::Certificate("no certificate found in PEM".to_string()))?;
    let end = cert_pem
        .find("-----END CERTIFICATE-----")
        .ok_or_else(|| Error::Certificate("no certificate end found in PEM".to_string()))?;

    let base64_content = cert_pem[start..end]
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<String>();

    use base64::Engine;
    let cert_der = base64::engine::general_purpose::STANDARD
        .decode(base64_content.trim())
        .map_err(|e| Error::Certificate(format!("failed to decode certificate base64: {}", e)))?;

    let (_, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| Error::Certificate(format!("failed to parse certificate: {:?}", e)))?;

    let expiry = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| Error::Certificate("invalid expiry timestamp".to_string()))?;
    Ok(expiry.signed_duration_since(Utc::now()).num_days())
}

/// Record TLS material on the domain's state entry
///
/// Unknown domains are attached to the administrator; without one nothing
/// is recorded.
fn record_domain(ctx: &ProvisionContext, domain: &str, paths: &CertificatePaths) -> Result<()> {
    ctx.store().update(|state| {
        let owner = match state.domain(domain) {
            Some(existing) => existing.owner,
            None => match state.users.iter().find(|u| u.role == Role::Admin) {
                Some(admin) => admin.id,
                None => {
                    debug!("No administrator yet, not recording {}", domain);
                    return Ok(());
                }
            },
        };
        let mut record = state
            .domain(domain)
            .cloned()
            .unwrap_or_else(|| Domain::new(owner, domain));
        record.tls_enabled = true;
        record.cert_path = Some(paths.cert.clone());
        record.key_path = Some(paths.key.clone());
        record.status = DomainStatus::Active;
        state.upsert_domain(record).map_err(Error::from)
    })
}

/// Renew every TLS domain whose certificate is close to expiry
pub async fn renew(ctx: &ProvisionContext) -> Result<Vec<RenewalReport>> {
    let state = ctx.store().load()?;
    let mut reports = Vec::new();

    for domain in state.domains.iter().filter(|d| d.tls_enabled) {
        let default_paths = paths_for(ctx, &domain.name);
        let cert = domain.cert_path.clone().unwrap_or(default_paths.cert.clone());

        let days = days_remaining(&cert);
        if let Ok(days_left) = days {
            if days_left > RENEWAL_THRESHOLD_DAYS {
                reports.push(RenewalReport {
                    domain: domain.name.clone(),
                    result: RenewalResult::Untouched { days_left },
                });
                continue;
            }
        }

        let result = match default_paths.kind {
            CertificateKind::SelfSigned => {
                let paths = CertificatePaths {
                    cert,
                    key: domain.key_path.clone().unwrap_or(default_paths.key),
                    kind: CertificateKind::SelfSigned,
                };
                match generate_self_signed(&domain.name, &paths, &mut StepRecorder::new()) {
                    Ok(()) => RenewalResult::Renewed,
                    Err(e) => RenewalResult::Failed(e.to_string()),
                }
            }
            CertificateKind::Acme => {
                let mut cmd = Command::new("certbot");
                cmd.args(["renew", "--cert-name", domain.name.as_str(), "--non-interactive"]);
                match ctx.run(&cmd).await {
                    Ok(_) => RenewalResult::Renewed,
                    Err(e) => RenewalResult::Failed(e.to_string()),
                }
            }
        };
        match &result {
            RenewalResult::Failed(e) => warn!("Renewal of {} failed: {}", domain.name, e),
            _ => info!("Renewed certificate for {}", domain.name),
        }
        reports.push(RenewalReport {
            domain: domain.name.clone(),
            result,
        });
    }

    Ok(reports)
}

/// Certificates of every TLS domain in state
pub fn list(ctx: &ProvisionContext) -> Result<Vec<CertificateInfo>> {
    let state = ctx.store().load()?;
    Ok(state
        .domains
        .iter()
        .filter(|d| d.tls_enabled)
        .map(|domain| {
            let cert = domain
                .cert_path
                .clone()
                .unwrap_or_else(|| paths_for(ctx, &domain.name).cert);
            CertificateInfo {
                domain: domain.name.clone(),
                kind: CertificateKind::for_domain(&domain.name),
                days_left: days_remaining(&cert).ok(),
                cert,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_self_signed_validity() {
        let dir = TempDir::new().unwrap();
        let paths = CertificatePaths {
            cert: dir.path().join("10.0.0.5/cert.pem"),
            key: dir.path().join("10.0.0.5/key.pem"),
            kind: CertificateKind::SelfSigned,
        };
        let mut rec = StepRecorder::new();
        generate_self_signed("10.0.0.5", &paths, &mut rec).unwrap();

        let days = days_remaining(&paths.cert).unwrap();
        assert!((SELF_SIGNED_VALIDITY_DAYS - 2..=SELF_SIGNED_VALIDITY_DAYS).contains(&days));
        assert!(fs::read_to_string(&paths.key).unwrap().contains("PRIVATE KEY"));
        assert_eq!(rec.undo().len(), 2);
    }

    #[test]
    fn test_kind_for_domain() {
        assert_eq!(CertificateKind::for_domain("192.0.2.4"), CertificateKind::SelfSigned);
        assert_eq!(CertificateKind::for_domain("localhost"), CertificateKind::SelfSigned);
        assert_eq!(CertificateKind::for_domain("panel.example.com"), CertificateKind::Acme);
    }

    #[test]
    fn test_garbage_pem_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cert.pem");
        fs::write(&path, "not a certificate").unwrap();
        assert!(matches!(days_remaining(&path), Err(Error::Certificate(_))));
    }
}
