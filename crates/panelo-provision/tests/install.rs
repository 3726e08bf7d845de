//! Full provisioning runs against the fake host

use panelo_config::Config;
use panelo_provision::components::web_server::DEFAULT_VHOST;
use panelo_provision::testing::Fixture;
use panelo_provision::vhost::vhost_path;
use panelo_provision::{ComponentId, ComponentStatus, Driver, OsFamily, Supervisor};
use panelo_state::{RunStatus, StepOutcome};

#[smol_potat::test]
async fn test_fresh_install_succeeds() {
    let fixture = Fixture::new().await.unwrap();
    let report = Driver::new(&fixture.ctx).run().await.unwrap();

    assert!(report.succeeded(), "failure: {:?}", report.failure);
    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(report.credentials_written);
    assert_eq!(report.steps.first().unwrap().id, ComponentId::Base);
    assert_eq!(report.steps.last().unwrap().id, ComponentId::Supervisor);

    let host = &fixture.host;
    assert!(host.has_package("nginx"));
    assert!(host.has_network("panelo-network"));
    for container in ["panelo-mysql", "panelo-api", "panelo-dashboard", "panelo-filebrowser"] {
        assert!(host.container(container).unwrap().running, "{container} not running");
    }
    assert!(host.unit_enabled("panelo.service"));
    assert!(host.unit_active("docker"));
    for port in [22, 80, 443, 3000, 3001, 8080] {
        assert!(host.open_ports().contains(&port), "port {port} closed");
    }
    assert!(vhost_path(&fixture.ctx, DEFAULT_VHOST).exists());
    assert!(fixture.ctx.paths().credentials_file().exists());
}

#[smol_potat::test]
async fn test_second_run_changes_nothing() {
    let fixture = Fixture::new().await.unwrap();
    Driver::new(&fixture.ctx).run().await.unwrap().into_result().unwrap();
    let containers = fixture.host.containers();
    fixture.host.clear_calls();

    let report = Driver::new(&fixture.ctx).run().await.unwrap();
    assert!(report.succeeded());
    assert!(report.unchanged(), "steps: {:?}", report.steps);
    assert!(!report.credentials_written);

    assert_eq!(fixture.host.containers(), containers);
    assert_eq!(fixture.host.count("docker run"), 0);
    assert_eq!(fixture.host.count("docker network create"), 0);
    assert_eq!(fixture.host.count("apt-get install"), 0);
    assert_eq!(fixture.host.count("docker exec -i"), 0);
}

#[smol_potat::test]
async fn test_schema_seeds_two_accounts() {
    let fixture = Fixture::new().await.unwrap();
    Driver::new(&fixture.ctx).run().await.unwrap().into_result().unwrap();

    let sql = fixture.host.executed_sql();
    assert_eq!(sql.len(), 1);
    assert!(sql[0].contains("server_panel"));
    assert!(sql[0].contains(panelo_state::SEED_ADMIN_EMAIL));
    assert!(sql[0].contains(panelo_state::SEED_USER_EMAIL));

    let state = fixture.ctx.store().load().unwrap();
    assert_eq!(state.users.len(), 2);
}

#[smol_potat::test]
async fn test_failed_step_rolls_back_earlier_changes() {
    let fixture = Fixture::new().await.unwrap();
    fixture.host.fail_on("docker pull mysql");

    let report = Driver::new(&fixture.ctx).run().await.unwrap();
    let (failed, _) = report.failure.as_ref().unwrap();
    assert_eq!(*failed, ComponentId::Database);
    assert!(matches!(report.status, RunStatus::RolledBack { .. }));
    assert!(matches!(
        report.steps.last().unwrap().outcome,
        StepOutcome::Failed { .. }
    ));

    assert!(!vhost_path(&fixture.ctx, DEFAULT_VHOST).exists());
    assert!(!fixture.host.has_network("panelo-network"));
    assert!(!fixture.host.has_package("nginx"));
    assert!(!fixture.host.unit_enabled("nginx"));
    assert!(!fixture.ctx.paths().credentials_file().exists());

    let journal = fixture.ctx.journal().latest().unwrap().unwrap();
    assert_eq!(journal.id, report.run_id);
    assert!(matches!(journal.status, RunStatus::RolledBack { .. }));
}

#[smol_potat::test]
async fn test_failure_without_rollback_keeps_changes() {
    let mut fixture = Fixture::new().await.unwrap();
    fixture.reconfigure(|config| config.settings.rollback_on_failure = false);
    fixture.host.fail_on("docker pull mysql");

    let report = Driver::new(&fixture.ctx).run().await.unwrap();
    assert!(matches!(report.status, RunStatus::Failed { .. }));
    assert!(vhost_path(&fixture.ctx, DEFAULT_VHOST).exists());

    fixture.host.clear_failures();
    let mut driver = Driver::new(&fixture.ctx);
    let rollback = driver.rollback(&report.run_id.to_string()).await.unwrap();
    assert!(!rollback.applied.is_empty());
    assert!(!vhost_path(&fixture.ctx, DEFAULT_VHOST).exists());

    let run = fixture.ctx.journal().load(&report.run_id.to_string()).unwrap();
    assert!(matches!(run.status, RunStatus::RolledBack { .. }));
}

#[smol_potat::test]
async fn test_skipped_database_short_circuits_panel() {
    let mut config = Config::default();
    config.components.skip = vec!["database".to_string()];
    let fixture = Fixture::with_config(config, OsFamily::Debian).await.unwrap();

    let report = Driver::new(&fixture.ctx).run().await.unwrap();
    assert!(report.succeeded());
    for id in [ComponentId::Database, ComponentId::Panel, ComponentId::Backup] {
        let step = report.steps.iter().find(|step| step.id == id).unwrap();
        assert!(matches!(step.outcome, StepOutcome::Skipped { .. }), "{id} ran");
    }
    assert!(fixture.host.container("panelo-mysql").is_none());
    assert!(fixture.host.container("panelo-api").is_none());
}

#[smol_potat::test]
async fn test_rhel_host_uses_dnf_and_firewalld() {
    let fixture = Fixture::with_config(Config::default(), OsFamily::Rhel)
        .await
        .unwrap();
    Driver::new(&fixture.ctx).run().await.unwrap().into_result().unwrap();

    assert!(fixture.host.count("dnf install -y") > 0);
    assert_eq!(fixture.host.count("apt-get"), 0);
    assert_eq!(fixture.host.count("firewall-cmd --permanent --add-port=443/tcp"), 1);
    assert!(fixture.host.count("firewall-cmd --reload") > 0);
    let vhost = vhost_path(&fixture.ctx, DEFAULT_VHOST);
    assert!(vhost.starts_with(fixture.dir.path().join("etc/nginx/conf.d")));
}

#[smol_potat::test]
async fn test_schema_applied_after_earlier_failure() {
    let mut fixture = Fixture::new().await.unwrap();
    fixture.reconfigure(|config| config.settings.rollback_on_failure = false);
    fixture.host.fail_on("docker exec -i -e MYSQL_PWD");

    let report = Driver::new(&fixture.ctx).run().await.unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.failure.as_ref().unwrap().0, ComponentId::Database);
    assert!(fixture.host.executed_sql().is_empty());
    assert!(fixture.host.container("panelo-mysql").is_some());

    fixture.host.clear_failures();
    let report = Driver::new(&fixture.ctx).run().await.unwrap();
    assert!(report.succeeded(), "failure: {:?}", report.failure);
    let sql = fixture.host.executed_sql();
    assert_eq!(sql.len(), 1);
    assert!(sql[0].contains("server_panel"));
}

#[smol_potat::test]
async fn test_single_component_install() {
    let fixture = Fixture::new().await.unwrap();
    let mut driver = Driver::new(&fixture.ctx);
    let report = driver.install_component(ComponentId::Base).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.steps.len(), 1);

    let err = driver.install_component(ComponentId::Monitoring).await.unwrap_err();
    assert!(matches!(err, panelo_provision::Error::Disabled(_)));
}

#[smol_potat::test]
async fn test_supervisor_stops_and_starts_services() {
    let fixture = Fixture::new().await.unwrap();
    Driver::new(&fixture.ctx).run().await.unwrap().into_result().unwrap();
    let supervisor = Supervisor::new(&fixture.ctx).unwrap();

    supervisor.stop_all().await.unwrap();
    assert!(!fixture.host.container("panelo-api").unwrap().running);
    assert!(!fixture.host.container("panelo-filebrowser").unwrap().running);
    assert!(fixture.host.container("panelo-mysql").unwrap().running);

    supervisor.start_all().await.unwrap();
    let statuses = supervisor.status().await.unwrap();
    let panel = statuses
        .iter()
        .find(|(id, _)| *id == ComponentId::Panel)
        .map(|(_, status)| status.clone());
    assert_eq!(panel, Some(ComponentStatus::Running));
    assert!(fixture.host.container("panelo-filebrowser").unwrap().running);
}
