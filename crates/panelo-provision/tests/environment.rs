//! Address and host detection against the fake host

use panelo_provision::environment::{self, AddressSource, Environment, is_local_domain};
use panelo_provision::testing::Fixture;
use panelo_provision::OsFamily;

#[smol_potat::test]
async fn test_fixture_detects_echo_address() {
    let fixture = Fixture::new().await.unwrap();
    let env = fixture.ctx.env();
    assert_eq!(env.os, OsFamily::Debian);
    assert_eq!(env.public_address, "203.0.113.10");
    assert_eq!(env.domain, "203.0.113.10");
    assert_eq!(env.hostname, "panel-host");
    assert_eq!(env.email, "admin@panel-host");
    assert!(matches!(env.address_source, AddressSource::Echo(_)));
    assert!(is_local_domain(&env.domain));
}

#[smol_potat::test]
async fn test_address_falls_back_in_order() {
    let fixture = Fixture::new().await.unwrap();
    let host = &fixture.host;

    host.set_echo_address(None);
    let (address, source) = environment::detect_address(host.as_ref()).await;
    assert_eq!(address, "10.0.0.5");
    assert_eq!(source, AddressSource::LocalRoute);

    host.set_route_address(None);
    host.set_ipv6_address(Some("2001:db8::10"));
    let (address, source) = environment::detect_address(host.as_ref()).await;
    assert_eq!(address, "2001:db8::10");
    assert_eq!(source, AddressSource::Ipv6);

    host.set_ipv6_address(None);
    let (address, source) = environment::detect_address(host.as_ref()).await;
    assert_eq!(address, "127.0.0.1");
    assert_eq!(source, AddressSource::Loopback);
}

#[smol_potat::test]
async fn test_every_echo_service_is_tried() {
    let fixture = Fixture::new().await.unwrap();
    fixture.host.set_echo_address(None);
    fixture.host.clear_calls();

    environment::detect_address(fixture.host.as_ref()).await;
    assert_eq!(
        fixture.host.count("curl -4 -fsS --max-time 5 https://"),
        environment::ECHO_SERVICES.len()
    );
}

#[smol_potat::test]
async fn test_configured_domain_overrides_the_address() {
    let mut config = panelo_config::Config::default();
    config.domain = Some("panel.example.com".to_string());
    config.email = Some("ops@example.com".to_string());
    let fixture = Fixture::with_config(config, OsFamily::Rhel).await.unwrap();

    let env = fixture.ctx.env();
    assert_eq!(env.os, OsFamily::Rhel);
    assert_eq!(env.domain, "panel.example.com");
    assert_eq!(env.email, "ops@example.com");
    assert_eq!(env.public_address, "203.0.113.10");
}

#[smol_potat::test]
async fn test_local_detection_reuses_the_recorded_address() {
    let fixture = Fixture::new().await.unwrap();
    let paths = fixture.ctx.paths();
    assert!(paths.data(environment::ENVIRONMENT_FILE).is_file());
    fixture.host.set_echo_address(None);
    fixture.host.clear_calls();

    let env = Environment::detect_local(fixture.host.as_ref(), paths, None, None)
        .await
        .unwrap();
    assert_eq!(env.public_address, "203.0.113.10");
    assert_eq!(env.domain, "203.0.113.10");
    assert_eq!(fixture.host.count("curl"), 0);

    let domain = Some("panel.example.com");
    let env = Environment::detect_local(fixture.host.as_ref(), paths, domain, None)
        .await
        .unwrap();
    assert_eq!(env.domain, "panel.example.com");
    assert_eq!(env.email, "admin@panel-host");
}

#[smol_potat::test]
async fn test_local_detection_without_a_record_stays_offline() {
    let fixture = Fixture::new().await.unwrap();
    let paths = fixture.ctx.paths();
    std::fs::remove_file(paths.data(environment::ENVIRONMENT_FILE)).unwrap();
    fixture.host.clear_calls();

    let env = Environment::detect_local(fixture.host.as_ref(), paths, None, None)
        .await
        .unwrap();
    assert_eq!(env.public_address, "10.0.0.5");
    assert_eq!(env.address_source, AddressSource::LocalRoute);
    assert_eq!(fixture.host.count("curl"), 0);
    assert!(Environment::recorded(paths).is_none());
}
