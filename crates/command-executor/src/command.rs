//! Command type for building executable commands

use async_process::Command as AsyncCommand;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// A command to be executed on the host
///
/// Unlike `async_process::Command`, this type is `Clone`, comparable and can
/// be rendered for logs, which lets test launchers match on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The program to execute
    program: OsString,
    /// The arguments to pass to the program
    args: Vec<OsString>,
    /// Environment variables to set
    env: BTreeMap<OsString, OsString>,
    /// Working directory for the command
    current_dir: Option<PathBuf>,
    /// Bytes written to the child's stdin before it is closed
    stdin: Option<Vec<u8>>,
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            stdin: None,
        }
    }

    /// Run `script` through `sh -c`
    pub fn shell(script: impl AsRef<str>) -> Self {
        let mut cmd = Self::new("sh");
        cmd.arg("-c").arg(script.as_ref());
        cmd
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Feed `input` to the process on stdin
    pub fn stdin_bytes(&mut self, input: impl Into<Vec<u8>>) -> &mut Self {
        self.stdin = Some(input.into());
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Get the environment variables
    pub fn get_envs(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// Get the current directory
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Get the stdin payload, if any
    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Render the command line as a single space separated string
    ///
    /// Arguments are not quoted. The rendering is meant for logs and for
    /// prefix matching in test launchers, not for re-parsing by a shell.
    pub fn display(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Prepare this command for execution by converting to an `async_process::Command`
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);
        for (key, val) in &self.env {
            cmd.env(key, val);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Builder pattern helper
impl Command {
    /// Create a builder for this command (for chaining)
    pub fn builder<S: AsRef<OsStr>>(program: S) -> CommandBuilder {
        CommandBuilder(Command::new(program))
    }
}

/// Builder wrapper for more ergonomic command construction
pub struct CommandBuilder(Command);

impl CommandBuilder {
    /// Add an argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.0.arg(arg);
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0.args(args);
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.0.env(key, val);
        self
    }

    /// Set the working directory
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.0.current_dir(dir);
        self
    }

    /// Feed bytes on stdin
    pub fn stdin_bytes(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.0.stdin_bytes(input);
        self
    }

    /// Build the command
    pub fn build(self) -> Command {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_with_args() {
        let mut cmd = Command::new("docker");
        cmd.arg("network").arg("inspect").arg("panelo-network");

        assert_eq!(cmd.get_args().len(), 3);
        assert_eq!(cmd.display(), "docker network inspect panelo-network");
    }

    #[test]
    fn test_shell_wraps_script() {
        let cmd = Command::shell("curl -fsSL https://get.docker.com | sh");
        assert_eq!(cmd.get_program(), "sh");
        assert_eq!(cmd.get_args()[0], "-c");
        assert_eq!(
            cmd.display(),
            "sh -c curl -fsSL https://get.docker.com | sh"
        );
    }

    #[test]
    fn test_command_builder() {
        let cmd = Command::builder("mysql")
            .args(["-uroot", "server_panel"])
            .env("MYSQL_PWD", "secret")
            .current_dir("/tmp")
            .stdin_bytes("SELECT 1;")
            .build();

        assert_eq!(cmd.get_program(), "mysql");
        assert_eq!(
            cmd.get_envs().get(OsStr::new("MYSQL_PWD")),
            Some(&OsString::from("secret"))
        );
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/tmp")));
        assert_eq!(cmd.get_stdin(), Some("SELECT 1;".as_bytes()));
    }

    #[test]
    fn test_command_clone_is_equal() {
        let cmd1 = Command::builder("systemctl").arg("reload").arg("nginx").build();
        let cmd2 = cmd1.clone();
        assert_eq!(cmd1, cmd2);
        assert_eq!(cmd1.to_string(), "systemctl reload nginx");
    }
}
