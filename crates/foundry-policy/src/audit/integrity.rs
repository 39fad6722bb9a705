//! Hash chain over audit records

use super::record::AuditRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Head of the integrity chain
#[derive(Debug, Default)]
pub struct IntegrityChain {
    /// Hash of the last record in the chain
    last_hash: Option<String>,

    /// Total number of records
    entry_count: u64,
}

impl IntegrityChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from existing state
    pub fn from_state(last_hash: Option<String>, entry_count: u64) -> Self {
        Self {
            last_hash,
            entry_count,
        }
    }

    /// Previous hash for the next record
    pub fn previous_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    /// Advance the chain past `record`
    pub fn update(&mut self, record: &AuditRecord) {
        self.last_hash = Some(record.entry_hash.clone());
        self.entry_count += 1;
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn head_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }
}

/// Outcome of verifying a sequence of records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_entries: usize,
    pub verified_entries: usize,
    pub first_invalid_index: Option<usize>,
    pub error_message: Option<String>,
}

/// SHA-256 over every field except `entry_hash`
pub(crate) fn compute_hash(record: &AuditRecord) -> String {
    let canonical = match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(mut fields)) => {
            fields.remove("entry_hash");
            serde_json::Value::Object(fields).to_string()
        }
        _ => String::new(),
    };

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute every hash and check the linkage between neighbours
pub fn verify_chain(records: &[AuditRecord]) -> ChainVerification {
    let mut result = ChainVerification {
        valid: true,
        total_entries: records.len(),
        verified_entries: 0,
        first_invalid_index: None,
        error_message: None,
    };

    for (i, record) in records.iter().enumerate() {
        if compute_hash(record) != record.entry_hash {
            result.valid = false;
            result.first_invalid_index = Some(i);
            result.error_message = Some(format!("Record {} has invalid hash", record.id));
            return result;
        }

        if i > 0 {
            let expected = &records[i - 1].entry_hash;
            if record.previous_hash.as_ref() != Some(expected) {
                result.valid = false;
                result.first_invalid_index = Some(i);
                result.error_message = Some(format!(
                    "Record {} has broken chain link (expected prev: {}, got: {:?})",
                    record.id, expected, record.previous_hash
                ));
                return result;
            }
        }

        result.verified_entries = i + 1;
    }

    result
}
