//! The panel state document and the invariants it enforces

use crate::error::{Error, Result};
use crate::models::{AppStatus, Application, Domain, Role, Secrets, User, UserStatus};
use crate::ports::PortAllocator;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Email of the seeded administrator
pub const SEED_ADMIN_EMAIL: &str = "admin@panelo.com";
/// Email of the seeded regular user
pub const SEED_USER_EMAIL: &str = "user@panelo.com";

/// Everything the panel persists about a host
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PanelState {
    /// Users
    #[serde(default)]
    pub users: Vec<User>,
    /// Applications
    #[serde(default)]
    pub applications: Vec<Application>,
    /// Domains
    #[serde(default)]
    pub domains: Vec<Domain>,
    /// Host port allocations
    #[serde(default)]
    pub ports: PortAllocator,
    /// Generated secrets
    #[serde(default)]
    pub secrets: Secrets,
}

/// What a user removal took with it
#[derive(Debug, Clone)]
pub struct RemovedUser {
    /// The removed user
    pub user: User,
    /// Cascaded applications
    pub applications: Vec<Application>,
    /// Cascaded domains
    pub domains: Vec<Domain>,
}

/// Container and allocation key of an application
pub fn app_key(name: &str, user: &str) -> String {
    format!("{}-{}", name, user)
}

impl PanelState {
    /// Find a user by name
    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Find a user by id
    pub fn user_by_id(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Find a user by email, ignoring case
    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    /// Add a user, rejecting duplicate names and emails
    pub fn add_user(&mut self, user: User) -> Result<User> {
        if self
            .users
            .iter()
            .any(|u| u.name == user.name || u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(Error::UserExists(user.email));
        }
        info!("Adding user {} <{}>", user.name, user.email);
        self.users.push(user.clone());
        Ok(user)
    }

    /// Return the named user, creating an active regular user when absent
    ///
    /// Deactivated users are rejected.
    pub fn ensure_user(&mut self, name: &str, email: &str) -> Result<User> {
        if let Some(user) = self.user(name) {
            if !user.is_active() {
                return Err(Error::UserInactive(name.to_string()));
            }
            return Ok(user.clone());
        }
        let user = User::new(name, email, Role::User, "!");
        self.add_user(user)
    }

    /// Mark a user inactive
    pub fn deactivate_user(&mut self, name: &str) -> Result<()> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.name == name)
            .ok_or_else(|| Error::UserNotFound(name.to_string()))?;
        user.status = UserStatus::Inactive;
        user.updated_at = Utc::now();
        Ok(())
    }

    /// Remove a user together with its applications and domains
    pub fn remove_user(&mut self, name: &str) -> Result<RemovedUser> {
        let index = self
            .users
            .iter()
            .position(|u| u.name == name)
            .ok_or_else(|| Error::UserNotFound(name.to_string()))?;
        let user = self.users.remove(index);

        let (applications, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.applications)
            .into_iter()
            .partition(|app| app.owner == user.id);
        self.applications = kept;
        for app in &applications {
            self.ports.release(&app.container);
        }

        let (domains, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.domains)
            .into_iter()
            .partition(|domain| domain.owner == user.id);
        self.domains = kept;

        info!(
            "Removed user {} with {} applications and {} domains",
            user.name,
            applications.len(),
            domains.len()
        );
        Ok(RemovedUser {
            user,
            applications,
            domains,
        })
    }

    /// Insert the default admin and user accounts when absent
    ///
    /// Returns the number of rows inserted.
    pub fn seed_default_users(&mut self, admin_hash: &str, user_hash: &str) -> usize {
        let mut inserted = 0;
        for (name, email, role, hash) in [
            ("admin", SEED_ADMIN_EMAIL, Role::Admin, admin_hash),
            ("user", SEED_USER_EMAIL, Role::User, user_hash),
        ] {
            if self.users.iter().any(|u| u.email == email) {
                continue;
            }
            if self.add_user(User::new(name, email, role, hash)).is_ok() {
                inserted += 1;
            }
        }
        inserted
    }

    /// Find an application by name and owner name
    pub fn application(&self, name: &str, user: &str) -> Option<&Application> {
        let owner = self.user(user)?.id;
        self.applications
            .iter()
            .find(|app| app.owner == owner && app.name == name)
    }

    /// Insert or replace an application (matched on owner and name)
    pub fn upsert_application(&mut self, app: Application) {
        match self
            .applications
            .iter_mut()
            .find(|existing| existing.owner == app.owner && existing.name == app.name)
        {
            Some(existing) => {
                let created_at = existing.created_at;
                let id = existing.id;
                *existing = Application {
                    id,
                    created_at,
                    updated_at: Utc::now(),
                    ..app
                };
            }
            None => self.applications.push(app),
        }
    }

    /// Update the status of an application
    pub fn set_application_status(
        &mut self,
        name: &str,
        user: &str,
        status: AppStatus,
    ) -> Result<()> {
        let owner = self
            .user(user)
            .ok_or_else(|| Error::UserNotFound(user.to_string()))?
            .id;
        let app = self
            .applications
            .iter_mut()
            .find(|app| app.owner == owner && app.name == name)
            .ok_or_else(|| Error::ApplicationNotFound(app_key(name, user)))?;
        app.status = status;
        app.updated_at = Utc::now();
        Ok(())
    }

    /// Remove an application and release its port
    pub fn remove_application(&mut self, name: &str, user: &str) -> Result<Application> {
        let owner = self
            .user(user)
            .ok_or_else(|| Error::UserNotFound(user.to_string()))?
            .id;
        let index = self
            .applications
            .iter()
            .position(|app| app.owner == owner && app.name == name)
            .ok_or_else(|| Error::ApplicationNotFound(app_key(name, user)))?;
        let app = self.applications.remove(index);
        self.ports.release(&app.container);
        Ok(app)
    }

    /// Find a domain by name
    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Register a domain, or update it when the same owner registers it again
    pub fn upsert_domain(&mut self, domain: Domain) -> Result<()> {
        match self
            .domains
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(&domain.name))
        {
            Some(existing) if existing.owner != domain.owner => {
                Err(Error::DomainExists(domain.name))
            }
            Some(existing) => {
                let id = existing.id;
                let created_at = existing.created_at;
                *existing = Domain {
                    id,
                    created_at,
                    ..domain
                };
                Ok(())
            }
            None => {
                self.domains.push(domain);
                Ok(())
            }
        }
    }

    /// Remove a domain
    pub fn remove_domain(&mut self, name: &str) -> Option<Domain> {
        let index = self
            .domains
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(name))?;
        Some(self.domains.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DomainStatus;
    use panelo_config::AppKind;

    fn app(owner: Uuid, name: &str, user: &str, port: u16) -> Application {
        let now = Utc::now();
        Application {
            id: Uuid::new_v4(),
            owner,
            name: name.to_string(),
            kind: AppKind::Static,
            domain: format!("{}.example.com", name),
            port,
            status: AppStatus::Creating,
            container: app_key(name, user),
            config: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_seed_inserts_exactly_two_users_once() {
        let mut state = PanelState::default();
        assert_eq!(state.seed_default_users("$argon2id$a", "$argon2id$b"), 2);
        assert_eq!(state.seed_default_users("$argon2id$a", "$argon2id$b"), 0);
        assert_eq!(state.users.len(), 2);
        assert_eq!(state.user("admin").unwrap().role, Role::Admin);
        assert_eq!(state.user("user").unwrap().email, SEED_USER_EMAIL);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let mut state = PanelState::default();
        state
            .add_user(User::new("alice", "alice@example.com", Role::User, "!"))
            .unwrap();
        let err = state
            .add_user(User::new("alice2", "ALICE@example.com", Role::User, "!"))
            .unwrap_err();
        assert!(matches!(err, Error::UserExists(_)));
    }

    #[test]
    fn test_inactive_user_cannot_be_ensured() {
        let mut state = PanelState::default();
        state.ensure_user("bob", "bob@host").unwrap();
        state.deactivate_user("bob").unwrap();
        assert!(matches!(
            state.ensure_user("bob", "bob@host"),
            Err(Error::UserInactive(_))
        ));
        // Deactivation keeps the record
        assert!(state.user("bob").is_some());
    }

    #[test]
    fn test_remove_user_cascades() {
        let mut state = PanelState::default();
        let alice = state.ensure_user("alice", "alice@host").unwrap();
        let bob = state.ensure_user("bob", "bob@host").unwrap();

        state.ports.allocate_specific("blog-alice", 8300).unwrap();
        state.ports.allocate_specific("site-bob", 8301).unwrap();
        state.upsert_application(app(alice.id, "blog", "alice", 8300));
        state.upsert_application(app(bob.id, "site", "bob", 8301));
        state
            .upsert_domain(Domain::new(alice.id, "blog.example.com"))
            .unwrap();

        let removed = state.remove_user("alice").unwrap();
        assert_eq!(removed.applications.len(), 1);
        assert_eq!(removed.domains.len(), 1);
        assert_eq!(state.applications.len(), 1);
        assert!(state.domains.is_empty());
        assert_eq!(state.ports.get_allocation("blog-alice"), None);
        assert_eq!(state.ports.get_allocation("site-bob"), Some(8301));
    }

    #[test]
    fn test_domain_unique_across_owners() {
        let mut state = PanelState::default();
        let alice = state.ensure_user("alice", "alice@host").unwrap();
        let bob = state.ensure_user("bob", "bob@host").unwrap();

        state
            .upsert_domain(Domain::new(alice.id, "shop.example.com"))
            .unwrap();
        let mut again = Domain::new(alice.id, "shop.example.com");
        again.status = DomainStatus::Active;
        state.upsert_domain(again).unwrap();
        assert_eq!(state.domains.len(), 1);
        assert_eq!(state.domains[0].status, DomainStatus::Active);

        let err = state
            .upsert_domain(Domain::new(bob.id, "SHOP.example.com"))
            .unwrap_err();
        assert!(matches!(err, Error::DomainExists(_)));
    }

    #[test]
    fn test_upsert_application_keeps_identity() {
        let mut state = PanelState::default();
        let alice = state.ensure_user("alice", "alice@host").unwrap();
        let first = app(alice.id, "blog", "alice", 8300);
        let id = first.id;
        state.upsert_application(first);

        let mut second = app(alice.id, "blog", "alice", 8300);
        second.status = AppStatus::Running;
        state.upsert_application(second);

        assert_eq!(state.applications.len(), 1);
        assert_eq!(state.applications[0].id, id);
        assert_eq!(
            state.application("blog", "alice").unwrap().status,
            AppStatus::Running
        );
    }
}
