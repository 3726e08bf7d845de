use crate::CertCommands;
use crate::commands::local_context;
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use panelo_config::Config;
use panelo_provision::StepRecorder;
use panelo_provision::certificates::{
    self, CertificateInfo, CertificateKind, RENEWAL_THRESHOLD_DAYS, RenewalResult,
};
use panelo_provision::host::packages;

fn kind_label(kind: CertificateKind) -> &'static str {
    match kind {
        CertificateKind::SelfSigned => "self-signed",
        CertificateKind::Acme => "acme",
    }
}

pub fn render(certs: &[CertificateInfo]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["DOMAIN", "KIND", "DAYS LEFT", "CERTIFICATE"]);
    for cert in certs {
        let days = match cert.days_left {
            Some(days) if days <= 0 => Cell::new(days).fg(Color::Red),
            Some(days) if days <= RENEWAL_THRESHOLD_DAYS => Cell::new(days).fg(Color::Yellow),
            Some(days) => Cell::new(days).fg(Color::Green),
            None => Cell::new("unreadable").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&cert.domain),
            Cell::new(kind_label(cert.kind)),
            days,
            Cell::new(cert.cert.display()),
        ]);
    }
    table
}

pub async fn run(config: Config, command: CertCommands) -> Result<()> {
    let ctx = local_context(config).await?;

    match command {
        CertCommands::Issue { domain, email } => {
            let email = email.unwrap_or_else(|| ctx.env().email.clone());
            let mut rec = StepRecorder::new();
            if certificates::paths_for(&ctx, &domain).kind == CertificateKind::Acme {
                let needed = certificates::certbot_packages(ctx.config().web_server);
                packages::ensure_installed(&ctx, &needed, &mut rec).await?;
            }
            let paths = certificates::issue(&ctx, &domain, &email, &mut rec)
                .await
                .with_context(|| format!("Failed to issue a certificate for {}", domain))?;
            println!("✓ {} certificate for {}", kind_label(paths.kind), domain);
            println!("  Certificate: {}", paths.cert.display());
            println!("  Key: {}", paths.key.display());
        }
        CertCommands::Renew => {
            let reports = certificates::renew(&ctx).await?;
            let mut failed = 0;
            for report in &reports {
                match &report.result {
                    RenewalResult::Renewed => println!("✓ {} renewed", report.domain),
                    RenewalResult::Untouched { days_left } => {
                        println!("= {} valid for {} more days", report.domain, days_left)
                    }
                    RenewalResult::Failed(error) => {
                        failed += 1;
                        println!("✗ {}: {}", report.domain, error);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} renewals failed", failed, reports.len());
            }
        }
        CertCommands::List => {
            let certs = certificates::list(&ctx)?;
            if certs.is_empty() {
                println!("No certificates");
            } else {
                println!("{}", render(&certs));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_certificate_table() {
        let rendered = render(&[
            CertificateInfo {
                domain: "shop.example.com".to_string(),
                kind: CertificateKind::Acme,
                cert: PathBuf::from("/etc/letsencrypt/live/shop.example.com/fullchain.pem"),
                days_left: Some(12),
            },
            CertificateInfo {
                domain: "203.0.113.10".to_string(),
                kind: CertificateKind::SelfSigned,
                cert: PathBuf::from("/var/lib/panelo/ssl/203.0.113.10/cert.pem"),
                days_left: None,
            },
        ])
        .to_string();
        assert!(rendered.contains("shop.example.com"));
        assert!(rendered.contains("self-signed"));
        assert!(rendered.contains("unreadable"));
    }
}
