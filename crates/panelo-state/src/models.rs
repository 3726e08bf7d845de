//! Data model for panel-managed entities

use chrono::{DateTime, Utc};
use panelo_config::AppKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// User role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Panel administrator
    Admin,
    /// Regular hosting user
    User,
}

/// Account status; users are deactivated, never hard-deleted outside a cascade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Can log in and deploy
    Active,
    /// Deactivated
    Inactive,
}

/// A panel user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,
    /// Login name; also the suffix of container names
    pub name: String,
    /// Unique email
    pub email: String,
    /// Opaque credential (PHC hash string)
    pub password_hash: String,
    /// Role
    pub role: Role,
    /// Status
    pub status: UserStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create an active user
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user may deploy applications
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Application lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    /// Container is up
    Running,
    /// Container exists but is not running
    Stopped,
    /// Deployment in progress
    Creating,
    /// Deployment failed or the container vanished
    Error,
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppStatus::Running => "running",
            AppStatus::Stopped => "stopped",
            AppStatus::Creating => "creating",
            AppStatus::Error => "error",
        })
    }
}

/// A deployed application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user id
    pub owner: Uuid,
    /// Application name, unique per owner
    pub name: String,
    /// Deployment template kind
    pub kind: AppKind,
    /// Routed domain
    pub domain: String,
    /// Host port the container is published on
    pub port: u16,
    /// Lifecycle status
    pub status: AppStatus,
    /// Container name (`<name>-<user>`)
    pub container: String,
    /// Free-form template parameters (variant, version, tls)
    pub config: serde_json::Value,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Domain status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    /// Virtual host written, certificate not yet present
    Pending,
    /// Serving
    Active,
    /// Certificate issuance failed
    Failed,
}

/// A routed domain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Domain {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user id
    pub owner: Uuid,
    /// Globally unique domain name
    pub name: String,
    /// Whether TLS is served
    pub tls_enabled: bool,
    /// Certificate path
    pub cert_path: Option<PathBuf>,
    /// Private key path
    pub key_path: Option<PathBuf>,
    /// Status
    pub status: DomainStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Domain {
    /// Create a pending domain without TLS
    pub fn new(owner: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            name: name.into(),
            tls_enabled: false,
            cert_path: None,
            key_path: None,
            status: DomainStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Secrets generated once per host
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Secrets {
    /// Database root password
    pub database_root_password: Option<String>,
    /// Initial panel admin password
    pub admin_password: Option<String>,
    /// Set once the credentials file has been written
    pub credentials_written: bool,
}
