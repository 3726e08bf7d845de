//! Process exit types

use serde::{Deserialize, Serialize};

/// Process exit status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// A status with the given exit code
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        self.signal.is_some()
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Result of executing a command to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitResult {
    /// Exit status
    pub status: ExitStatus,
    /// Captured stdout
    pub output: String,
    /// Captured stderr
    pub stderr: String,
}

impl ExitResult {
    /// A successful result with the given stdout
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            status: ExitStatus::from_code(0),
            output: output.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: ExitStatus::from_code(code),
            output: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited with code 0
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout with surrounding whitespace removed
    pub fn trimmed(&self) -> &str {
        self.output.trim()
    }

    /// Best available diagnostic text (stderr, falling back to stdout)
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.output.trim()
        } else {
            stderr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let mut result = ExitResult::failed(1, "  E: Unable to locate package\n");
        assert_eq!(result.diagnostic(), "E: Unable to locate package");

        result.stderr.clear();
        result.output = "partial output\n".to_string();
        assert_eq!(result.diagnostic(), "partial output");
    }

    #[test]
    fn test_success_requires_zero() {
        assert!(ExitResult::ok("").success());
        assert!(!ExitResult::failed(100, "").success());
        let signalled = ExitStatus {
            code: None,
            signal: Some(9),
        };
        assert!(!signalled.success());
        assert!(signalled.terminated_by_signal());
    }
}
