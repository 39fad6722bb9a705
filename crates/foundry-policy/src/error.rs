//! Error taxonomy for the policy backbone
//!
//! Infrastructure failures (`Load`, `Push`, `Protocol`, `Connection`) are
//! always propagated to the caller. `Denied` is a domain outcome that each
//! service maps to its own rejection at the boundary.

use std::fmt;
use thiserror::Error;

/// Policy backbone errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy source missing, unreadable, undeclared or duplicated
    #[error("Policy load error: {0}")]
    Load(String),

    /// One or more modules failed to publish
    #[error("Failed to publish one or more policy modules: {0}")]
    Push(PushFailures),

    /// The engine answered with an unexpected status or shape
    #[error("Policy engine protocol error: {0}")]
    Protocol(String),

    /// Transport failure, including timeouts
    #[error("Policy engine connection error: {0}")]
    Connection(String),

    /// The engine explicitly returned `allow = false`
    #[error("Policy {path} denied the request: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Denied {
        /// Decision path that was evaluated
        path: String,
        /// Reason reported by the engine
        reason: Option<String>,
    },

    /// Revocation list bytes could not be decoded
    #[error("Revocation list parse error: {0}")]
    Parse(String),

    /// Revocation request failed validation
    #[error("Invalid revocation request: {0}")]
    InvalidRequest(String),

    /// Audit log could not be read or written
    #[error("Audit error: {0}")]
    Audit(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PolicyError {
    /// Check if this is an explicit policy denial
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// Check if this error is an infrastructure fault rather than a decision
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Load(_) | Self::Push(_) | Self::Protocol(_) | Self::Connection(_)
        )
    }

    /// Reason attached to a denial, if any
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            Self::Denied { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for PolicyError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// A single module that failed to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    /// Policy id the module was addressed by
    pub policy_id: String,
    /// HTTP status (0 when the request never completed)
    pub status: u16,
    /// Engine or transport message
    pub message: String,
}

impl fmt::Display for PushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.policy_id, self.status, self.message)
    }
}

/// Aggregated publish failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushFailures(pub Vec<PushFailure>);

impl PushFailures {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PushFailure> {
        self.0.iter()
    }

    /// Policy ids that failed, in publish order
    pub fn policy_ids(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.policy_id.as_str()).collect()
    }
}

impl fmt::Display for PushFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
