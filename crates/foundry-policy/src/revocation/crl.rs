//! Certificate-revocation list parsing

use crate::error::{PolicyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use x509_parser::pem::parse_x509_pem;
use x509_parser::revocation_list::CertificateRevocationList;
use x509_parser::time::ASN1Time;

/// Revoked serials extracted from one CRL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationSnapshot {
    /// Lowercase hex serials without leading zeros, sorted and unique
    pub runtime_ids: Vec<String>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

impl RevocationSnapshot {
    pub fn contains(&self, runtime_id: &str) -> bool {
        self.runtime_ids
            .binary_search_by(|id| id.as_str().cmp(runtime_id))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.runtime_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtime_ids.is_empty()
    }

    /// Document published to the engine's data API
    pub fn as_document(&self) -> serde_json::Value {
        serde_json::json!({
            "runtimeIds": self.runtime_ids,
            "thisUpdate": self.this_update,
            "nextUpdate": self.next_update,
        })
    }

    /// `{"revocation": {"runtimeIds": [...]}}`
    pub fn as_policy_input(&self) -> serde_json::Value {
        serde_json::json!({ "revocation": { "runtimeIds": self.runtime_ids } })
    }
}

/// SHA-256 hex digest of the raw list bytes
pub fn crl_fingerprint(document: &[u8]) -> String {
    hex::encode(Sha256::digest(document))
}

/// Parse a PEM or DER encoded CRL
pub fn parse_crl(document: &[u8]) -> Result<RevocationSnapshot> {
    if let Ok((_, pem)) = parse_x509_pem(document) {
        match parse_der(&pem.contents) {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => debug!(label = %pem.label, error = %e, "PEM block is not a CRL, trying DER"),
        }
    }

    parse_der(document).map_err(|e| PolicyError::Parse(format!("Unable to parse CRL: {}", e)))
}

fn parse_der(der: &[u8]) -> std::result::Result<RevocationSnapshot, String> {
    let (_, crl) = x509_parser::parse_x509_crl(der).map_err(|e| e.to_string())?;
    snapshot_from(&crl)
}

fn snapshot_from(crl: &CertificateRevocationList<'_>) -> std::result::Result<RevocationSnapshot, String> {
    let mut runtime_ids: Vec<String> = crl
        .iter_revoked_certificates()
        .map(|revoked| serial_hex(revoked.raw_serial()))
        .collect();
    runtime_ids.sort();
    runtime_ids.dedup();

    let this_update = to_utc(crl.last_update())?;
    let next_update = crl.next_update().map(to_utc).transpose()?;

    Ok(RevocationSnapshot {
        runtime_ids,
        this_update,
        next_update,
    })
}

fn serial_hex(raw: &[u8]) -> String {
    let encoded = hex::encode(raw);
    let trimmed = encoded.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn to_utc(time: ASN1Time) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| format!("CRL timestamp out of range: {}", time))
}
