//! Idempotent host provisioning for panelo
//!
//! The crate turns a validated [`panelo_config::Config`] into a running panel
//! host. A [`Plan`] orders the enabled [`Component`]s by their dependencies and
//! the [`Driver`] installs them one after another, journaling every change so a
//! failed run can be rolled back. Each component inspects the host first and
//! only acts on drift, which makes a second run a no-op.
//!
//! On top of the base install the crate provides:
//!
//! - [`Deployer`] for per-user application containers behind a reverse proxy
//! - [`certificates`] for self-signed and ACME TLS
//! - [`BackupRunner`] for compressed archives of user data and the database
//! - [`Supervisor`] for starting and stopping the installed services as a unit
//!
//! All host access goes through a [`command_executor::Launcher`], so the same
//! code drives a real machine or the fake host from the `test-utils` feature.

#![warn(missing_docs)]

pub mod backup;
pub mod certificates;
pub mod component;
pub mod components;
pub mod context;
pub mod credentials;
pub mod deploy;
pub mod driver;
pub mod environment;
pub mod error;
pub mod host;
pub mod plan;
pub mod readiness;
pub mod reconciler;
pub mod supervisor;
pub mod templates;
pub mod vhost;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use backup::{BackupArchive, BackupRunner};
pub use component::{Component, ComponentId, ComponentState, ComponentStatus, Outcome};
pub use context::{HostPaths, ProvisionContext};
pub use deploy::{AppSummary, DeployRequest, Deployer, Deployment};
pub use driver::{Driver, RollbackReport, RunReport, StepReport};
pub use environment::{AddressSource, Environment, OsFamily};
pub use error::{Error, Result};
pub use plan::{Plan, StepStatus};
pub use reconciler::StepRecorder;
pub use supervisor::Supervisor;
