//! Local process execution backend

use async_process::Stdio;
use async_trait::async_trait;
use futures_lite::io::AsyncWriteExt;
use std::io::ErrorKind;
use tracing::{debug, trace};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::process::ExitResult;

/// Launcher for executing processes locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

#[async_trait]
impl Launcher for LocalLauncher {
    async fn execute(&self, command: &Command) -> Result<ExitResult> {
        debug!("exec: {}", command.display());

        let mut async_cmd = command.prepare();
        async_cmd.stdout(Stdio::piped());
        async_cmd.stderr(Stdio::piped());
        async_cmd.stdin(if command.get_stdin().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = async_cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                Error::command_not_found(command.get_program().to_string_lossy())
            }
            _ => Error::spawn_failed(format!("{}: {}", command.display(), e)),
        })?;

        let input = command.get_stdin().map(<[u8]>::to_vec);
        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(input)) = (pipe, input) {
                pipe.write_all(&input).await?;
                pipe.close().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        let (fed, output) = futures_lite::future::zip(feed, child.output()).await;
        fed?;
        let output = output?;

        let result = ExitResult {
            status: output.status.into(),
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(
            "exit {:?} for {}: {}",
            result.status.code,
            command.get_program().to_string_lossy(),
            result.diagnostic()
        );
        Ok(result)
    }
}
