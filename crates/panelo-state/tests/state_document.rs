//! Persisted state across store reloads

use chrono::Utc;
use panelo_config::AppKind;
use panelo_state::{
    AppStatus, Application, Domain, Error, Journal, ProvisionRun, RunStatus, StateStore, User,
    Role, app_key,
};
use tempfile::TempDir;
use uuid::Uuid;

fn application(owner: Uuid, name: &str, user: &str, port: u16) -> Application {
    let now = Utc::now();
    Application {
        id: Uuid::new_v4(),
        owner,
        name: name.to_string(),
        kind: AppKind::Static,
        domain: format!("{}.example.com", name),
        port,
        status: AppStatus::Running,
        container: app_key(name, user),
        config: serde_json::json!({}),
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn test_allocations_survive_reload() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());

    let port = store
        .update(|state| {
            let alice = state.add_user(User::new("alice", "alice@example.com", Role::User, "!"))?;
            let port = state
                .ports
                .allocate("site-alice", AppKind::Static, AppKind::Static.default_pool())?;
            state.upsert_application(application(alice.id, "site", "alice", port));
            state.upsert_domain(Domain::new(alice.id, "site.example.com"))?;
            Ok::<_, Error>(port)
        })
        .unwrap();

    let reloaded = StateStore::new(dir.path()).load().unwrap();
    assert_eq!(reloaded.ports.get_allocation("site-alice"), Some(port));
    assert_eq!(reloaded.application("site", "alice").unwrap().port, port);
    assert!(reloaded.domain("SITE.example.com").is_some());

    let mut state = reloaded;
    let again = state
        .ports
        .allocate("site-alice", AppKind::Static, AppKind::Static.default_pool())
        .unwrap();
    assert_eq!(again, port);
}

#[test]
fn test_user_removal_frees_ports_for_others() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path());
    let pool = AppKind::Php.default_pool();

    let port = store
        .update(|state| {
            let bob = state.add_user(User::new("bob", "bob@example.com", Role::User, "!"))?;
            let port = state.ports.allocate("shop-bob", AppKind::Php, pool)?;
            state.upsert_application(application(bob.id, "shop", "bob", port));
            state.upsert_domain(Domain::new(bob.id, "shop.example.com"))?;
            Ok::<_, Error>(port)
        })
        .unwrap();

    let removed = store.update(|state| state.remove_user("bob")).unwrap();
    assert_eq!(removed.applications.len(), 1);
    assert_eq!(removed.domains.len(), 1);

    let state = store.load().unwrap();
    assert!(state.user("bob").is_none());
    assert!(state.applications.is_empty());
    assert!(state.domain("shop.example.com").is_none());

    let reused = store
        .update(|state| state.ports.allocate("shop-carol", AppKind::Php, pool))
        .unwrap();
    assert_eq!(reused, port);
}

#[test]
fn test_journal_lists_runs_oldest_first() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::new(dir.path().join("journal"));

    let mut first = ProvisionRun::new("install");
    first.started_at = Utc::now() - chrono::Duration::minutes(5);
    first.finish(RunStatus::Succeeded);
    journal.save(&first).unwrap();

    let mut second = ProvisionRun::new("deploy blog-alice");
    second.finish(RunStatus::Failed {
        error: "port pool exhausted".to_string(),
    });
    journal.save(&second).unwrap();

    let runs = journal.list().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, first.id);
    assert_eq!(journal.latest().unwrap().unwrap().label, "deploy blog-alice");

    std::fs::write(dir.path().join("journal/garbage.json"), "{").unwrap();
    assert_eq!(journal.list().unwrap().len(), 2);
}
