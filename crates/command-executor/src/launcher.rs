//! Launcher trait for executing commands on the host

use crate::command::Command;
use crate::error::Result;
use crate::process::ExitResult;
use async_trait::async_trait;
use std::sync::Arc;

/// A launcher that can execute commands in a specific context
///
/// A non-zero exit status is not an error at this layer: callers decide how
/// to interpret it. Errors are reserved for commands that could not run at all.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Execute a command and wait for it to complete, capturing output
    async fn execute(&self, command: &Command) -> Result<ExitResult>;

    /// Execute a command and report only whether it exited successfully
    ///
    /// Commands that cannot be spawned count as unsuccessful.
    async fn probe(&self, command: &Command) -> bool {
        matches!(self.execute(command).await, Ok(result) if result.success())
    }
}

#[async_trait]
impl<L: Launcher + ?Sized> Launcher for &L {
    async fn execute(&self, command: &Command) -> Result<ExitResult> {
        (**self).execute(command).await
    }
}

#[async_trait]
impl<L: Launcher + ?Sized> Launcher for Box<L> {
    async fn execute(&self, command: &Command) -> Result<ExitResult> {
        (**self).execute(command).await
    }
}

#[async_trait]
impl<L: Launcher + ?Sized> Launcher for Arc<L> {
    async fn execute(&self, command: &Command) -> Result<ExitResult> {
        (**self).execute(command).await
    }
}
