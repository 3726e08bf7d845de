//! Scripted launcher used by tests in dependent crates

use async_trait::async_trait;
use std::sync::Mutex;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::process::ExitResult;

/// A launcher that answers commands from prefix rules and records every call
///
/// Rules are checked in insertion order against [`Command::display`]; the
/// first matching prefix wins. Without a matching rule the fallback answer is
/// used, or [`Error::Unscripted`] when no fallback is set.
#[derive(Default)]
pub struct ScriptedLauncher {
    rules: Mutex<Vec<(String, ExitResult)>>,
    fallback: Option<ExitResult>,
    calls: Mutex<Vec<Command>>,
}

impl ScriptedLauncher {
    /// A launcher with no rules that errors on every command
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher that answers every unmatched command with success and no output
    pub fn permissive() -> Self {
        Self {
            fallback: Some(ExitResult::ok("")),
            ..Self::default()
        }
    }

    /// Add a rule answering commands that start with `prefix`
    pub fn on(self, prefix: impl Into<String>, response: ExitResult) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((prefix.into(), response));
        self
    }

    /// Add a rule at runtime, taking precedence over existing rules
    pub fn add_rule(&self, prefix: impl Into<String>, response: ExitResult) {
        self.rules
            .lock()
            .unwrap()
            .insert(0, (prefix.into(), response));
    }

    /// All commands executed so far, rendered
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(Command::display)
            .collect()
    }

    /// All commands executed so far
    pub fn commands(&self) -> Vec<Command> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of executed commands starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn execute(&self, command: &Command) -> Result<ExitResult> {
        let line = command.display();
        self.calls.lock().unwrap().push(command.clone());

        let rules = self.rules.lock().unwrap();
        if let Some((_, response)) = rules.iter().find(|(prefix, _)| line.starts_with(prefix)) {
            return Ok(response.clone());
        }
        self.fallback
            .clone()
            .ok_or(Error::Unscripted { command: line })
    }
}
