//! CLI error types

use foundry_policy::PolicyError;
use thiserror::Error;

/// Exit code for an explicit policy denial
pub const EXIT_DENIED: i32 = 3;

/// Exit code for policy engine or bundle failures
pub const EXIT_INFRASTRUCTURE: i32 = 2;

/// CLI errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Error raised by the policy library
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid command-line input
    #[error("Invalid input: {0}")]
    Input(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Policy(e) if e.is_denied() => EXIT_DENIED,
            CliError::Policy(e) if e.is_infrastructure() => EXIT_INFRASTRUCTURE,
            _ => 1,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
