//! Persisted panel state
//!
//! The panel keeps a small JSON document per host describing the users,
//! applications and domains it manages, the host ports handed out to
//! applications, and the generated secrets. Provisioning runs are journaled
//! separately so that a failed run can be undone.

#![warn(missing_docs)]

pub mod error;
pub mod journal;
pub mod models;
pub mod ports;
pub mod state;
pub mod store;

pub use error::{Error, Result};
pub use journal::{Journal, ProvisionRun, RunStatus, StepOutcome, StepRecord, UndoAction};
pub use models::{
    AppStatus, Application, Domain, DomainStatus, Role, Secrets, User, UserStatus,
};
pub use ports::PortAllocator;
pub use state::{PanelState, RemovedUser, SEED_ADMIN_EMAIL, SEED_USER_EMAIL, app_key};
pub use store::{RunLock, StateStore};
