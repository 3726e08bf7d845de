//! Error types for panel state

use thiserror::Error;

/// Panel state error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// User is deactivated
    #[error("User is inactive: {0}")]
    UserInactive(String),

    /// Application not found
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    /// Domain owned by someone else
    #[error("Domain already registered: {0}")]
    DomainExists(String),

    /// Port already allocated to another owner
    #[error("Port {port} already allocated to {owner}")]
    PortUnavailable {
        /// Requested port
        port: u16,
        /// Current owner
        owner: String,
    },

    /// Port is reserved for system services
    #[error("Port {0} is reserved")]
    ReservedPort(u16),

    /// No free port left in a pool
    #[error("No free port in pool {pool} for {kind}")]
    PortPoolExhausted {
        /// Application kind
        kind: String,
        /// The exhausted pool
        pool: String,
    },

    /// Provisioning run not found in the journal
    #[error("Provisioning run not found: {0}")]
    RunNotFound(String),

    /// Another run holds the lock
    #[error("Another panelo run is in progress (lock {path} held by pid {pid})")]
    Locked {
        /// Lock file path
        path: String,
        /// Pid recorded in the lock file
        pid: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
