//! Decision normalization

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    pub reason: Option<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
        }
    }

    /// Normalize an engine `result`
    ///
    /// Accepts a bare boolean or an object with a boolean `allow` and an
    /// optional string `reason`.
    pub fn from_result(result: &Value) -> Result<Self> {
        match result {
            Value::Bool(allow) => Ok(Self {
                allow: *allow,
                reason: None,
            }),
            Value::Object(fields) => {
                let allow = match fields.get("allow") {
                    Some(Value::Bool(allow)) => *allow,
                    Some(other) => {
                        return Err(PolicyError::Protocol(format!(
                            "Decision 'allow' must be a boolean, got {}",
                            other
                        )))
                    }
                    None => {
                        return Err(PolicyError::Protocol(
                            "Decision result is missing 'allow'".to_string(),
                        ))
                    }
                };

                let reason = match fields.get("reason") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(reason)) => Some(reason.clone()),
                    Some(other) => {
                        return Err(PolicyError::Protocol(format!(
                            "Decision 'reason' must be a string, got {}",
                            other
                        )))
                    }
                };

                Ok(Self { allow, reason })
            }
            other => Err(PolicyError::Protocol(format!(
                "Unexpected decision result: {}",
                other
            ))),
        }
    }
}
