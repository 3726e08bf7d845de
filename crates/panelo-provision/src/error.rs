//! Error types for provisioning

use thiserror::Error;

/// Provisioning error type
#[derive(Error, Debug)]
pub enum Error {
    /// The host cannot be provisioned (unsupported OS, missing privileges)
    #[error("Environment error: {0}")]
    Environment(String),

    /// A package, image or host command failed
    #[error("Dependency error: `{command}` failed: {output}")]
    Dependency {
        /// The command line that failed
        command: String,
        /// Its diagnostic output
        output: String,
    },

    /// Bounded readiness polling gave up
    #[error("{what} not ready after {attempts} attempts")]
    Readiness {
        /// What was polled
        what: String,
        /// Attempts made
        attempts: u32,
    },

    /// Invalid configuration or plan
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest errors
    #[error(transparent)]
    Manifest(#[from] panelo_config::ConfigError),

    /// State store errors
    #[error("State error: {0}")]
    State(#[from] panelo_state::Error),

    /// Command executor errors
    #[error("Command execution error: {0}")]
    Command(#[from] command_executor::Error),

    /// Certificate generation or parsing failed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown component, application or archive
    #[error("Not found: {0}")]
    NotFound(String),

    /// A provisioning step failed
    #[error("Step {component} failed: {source}")]
    Step {
        /// Component id
        component: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The component is disabled by configuration
    #[error("Component {0} is disabled")]
    Disabled(String),
}

impl Error {
    /// Dependency error from a failed command
    pub(crate) fn dependency(
        command: &command_executor::Command,
        result: &command_executor::ExitResult,
    ) -> Self {
        Error::Dependency {
            command: command.display(),
            output: match result.diagnostic() {
                "" => format!("exit status {:?}", result.status.code),
                text => text.to_string(),
            },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
