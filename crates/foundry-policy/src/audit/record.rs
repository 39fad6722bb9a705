//! Audit record types

use super::integrity::compute_hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Policy decision evaluated by the client
    Decision,
    /// Revocation feed poll outcome
    RevocationFeed,
}

/// One line of the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record id
    pub id: String,

    /// When the record was written
    pub ts: DateTime<Utc>,

    pub kind: AuditKind,

    /// Service that owns the log
    pub service: String,

    /// Decision path or feed data document
    pub package: String,

    pub allow: bool,

    pub reason: Option<String>,

    /// Policy bundle version the decision was made against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Wall time spent on the evaluation
    pub elapsed_ms: f64,

    /// Decision input, when input echo is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,

    /// Hash of the preceding record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,

    /// Hash of this record
    pub entry_hash: String,
}

/// A record before it is linked into the chain
#[derive(Debug, Clone)]
pub struct PendingRecord {
    kind: AuditKind,
    package: String,
    allow: bool,
    reason: Option<String>,
    version: Option<String>,
    elapsed_ms: f64,
    input: Option<serde_json::Value>,
}

impl PendingRecord {
    pub fn new(kind: AuditKind, package: impl Into<String>, allow: bool) -> Self {
        Self {
            kind,
            package: package.into(),
            allow,
            reason: None,
            version: None,
            elapsed_ms: 0.0,
            input: None,
        }
    }

    pub fn reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn input(mut self, input: Option<serde_json::Value>) -> Self {
        self.input = input;
        self
    }

    /// Stamp, link and hash the record
    pub(crate) fn finalize(self, service: &str, previous_hash: Option<String>) -> AuditRecord {
        let mut record = AuditRecord {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            kind: self.kind,
            service: service.to_string(),
            package: self.package,
            allow: self.allow,
            reason: self.reason,
            version: self.version,
            elapsed_ms: self.elapsed_ms,
            input: self.input,
            previous_hash,
            entry_hash: String::new(),
        };
        record.entry_hash = compute_hash(&record);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization_shape() {
        let record = PendingRecord::new(AuditKind::Decision, "foundry/spawn", false)
            .reason(Some("quota exceeded".into()))
            .elapsed_ms(1.5)
            .finalize("spawn_service", None);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "decision");
        assert_eq!(value["service"], "spawn_service");
        assert_eq!(value["allow"], false);
        assert_eq!(value["reason"], "quota exceeded");
        assert!(value.get("previous_hash").is_none());
        assert!(value.get("input").is_none());
        assert_eq!(record.entry_hash.len(), 64);

        let parsed: AuditRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_feed_kind_is_snake_case() {
        let value = serde_json::to_value(AuditKind::RevocationFeed).unwrap();
        assert_eq!(value, "revocation_feed");
    }
}
