//! Certificate renewal against the fake host

use panelo_provision::certificates::{self, RenewalResult, days_remaining};
use panelo_provision::testing::Fixture;
use panelo_provision::StepRecorder;
use panelo_state::{Role, User};
use std::path::Path;

async fn fixture_with_admin() -> Fixture {
    let fixture = Fixture::new().await.unwrap();
    fixture
        .ctx
        .store()
        .update(|state| {
            state
                .add_user(User::new("admin", "admin@example.com", Role::Admin, "!"))
                .map(|_| ())
        })
        .unwrap();
    fixture
}

/// Replace the certificate at `path` with one valid for `days`
fn write_cert(path: &Path, domain: &str, days: i64) {
    let mut params = rcgen::CertificateParams::new(vec![domain.to_string()]);
    params.not_before = time::OffsetDateTime::now_utc() - time::Duration::days(1);
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
    let cert = rcgen::Certificate::from_params(params).unwrap();
    std::fs::write(path, cert.serialize_pem().unwrap()).unwrap();
}

#[smol_potat::test]
async fn test_fresh_certificate_is_untouched() {
    let fixture = fixture_with_admin().await;
    let paths = certificates::issue(
        &fixture.ctx,
        "10.0.0.5",
        "admin@example.com",
        &mut StepRecorder::new(),
    )
    .await
    .unwrap();
    let before = std::fs::read_to_string(&paths.cert).unwrap();

    let reports = certificates::renew(&fixture.ctx).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].domain, "10.0.0.5");
    assert!(matches!(
        reports[0].result,
        RenewalResult::Untouched { days_left } if days_left > 30
    ));
    assert_eq!(std::fs::read_to_string(&paths.cert).unwrap(), before);
    assert_eq!(fixture.host.count("certbot"), 0);
}

#[smol_potat::test]
async fn test_expiring_self_signed_is_regenerated() {
    let fixture = fixture_with_admin().await;
    let paths = certificates::issue(
        &fixture.ctx,
        "10.0.0.5",
        "admin@example.com",
        &mut StepRecorder::new(),
    )
    .await
    .unwrap();
    write_cert(&paths.cert, "10.0.0.5", 10);
    assert!(days_remaining(&paths.cert).unwrap() <= 10);

    let reports = certificates::renew(&fixture.ctx).await.unwrap();
    assert_eq!(reports[0].result, RenewalResult::Renewed);
    assert!(days_remaining(&paths.cert).unwrap() > 300);
    assert_eq!(fixture.host.count("certbot"), 0);
}

#[smol_potat::test]
async fn test_expiring_acme_certificate_goes_through_certbot() {
    let fixture = fixture_with_admin().await;
    let paths = certificates::issue(
        &fixture.ctx,
        "shop.example.com",
        "admin@example.com",
        &mut StepRecorder::new(),
    )
    .await
    .unwrap();
    write_cert(&paths.cert, "shop.example.com", 5);
    fixture.host.clear_calls();

    let reports = certificates::renew(&fixture.ctx).await.unwrap();
    assert_eq!(reports[0].domain, "shop.example.com");
    assert_eq!(reports[0].result, RenewalResult::Renewed);
    assert_eq!(
        fixture.host.count("certbot renew --cert-name shop.example.com"),
        1
    );
    assert!(days_remaining(&paths.cert).unwrap() > 300);
}

#[smol_potat::test]
async fn test_failed_certbot_renewal_is_reported() {
    let fixture = fixture_with_admin().await;
    let paths = certificates::issue(
        &fixture.ctx,
        "shop.example.com",
        "admin@example.com",
        &mut StepRecorder::new(),
    )
    .await
    .unwrap();
    write_cert(&paths.cert, "shop.example.com", 5);
    fixture.host.fail_on("certbot renew");

    let reports = certificates::renew(&fixture.ctx).await.unwrap();
    assert!(matches!(reports[0].result, RenewalResult::Failed(_)));
}
