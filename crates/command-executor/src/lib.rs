//! Runtime-agnostic command execution library
//!
//! This crate provides the single seam through which panelo touches the host:
//! package managers, the container engine, service managers and web server
//! tooling are all driven by building a [`Command`] and handing it to a
//! [`Launcher`].

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod launcher;
pub mod process;

pub use backends::LocalLauncher;
#[cfg(feature = "test-utils")]
pub use backends::ScriptedLauncher;
pub use command::{Command, CommandBuilder};
pub use error::{Error, Result};
pub use launcher::Launcher;
pub use process::{ExitResult, ExitStatus};
