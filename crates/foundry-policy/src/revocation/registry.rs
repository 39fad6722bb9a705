//! In-memory registry of explicitly revoked runtime identifiers

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::{PolicyError, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum runtime identifier length
pub const MAX_RUNTIME_ID_LEN: usize = 128;

/// Maximum revocation reason length
pub const MAX_REASON_LEN: usize = 512;

/// Maximum revocation TTL (one day)
pub const MAX_TTL_SECS: u64 = 86_400;

/// One revoked runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationEntry {
    pub runtime_id: String,
    pub reason: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RevocationEntry {
    /// Whether the entry is still in force at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| expires > now)
    }
}

/// Validated revocation input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub runtime_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl RevokeRequest {
    pub fn new(runtime_id: impl Into<String>) -> Self {
        Self {
            runtime_id: runtime_id.into(),
            reason: None,
            ttl_seconds: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }

    /// Trim and bound-check every field
    pub fn validate(self) -> Result<Self> {
        let runtime_id = self.runtime_id.trim().to_string();
        if runtime_id.is_empty() {
            return Err(PolicyError::InvalidRequest(
                "runtimeId must not be empty".to_string(),
            ));
        }
        if runtime_id.chars().count() > MAX_RUNTIME_ID_LEN {
            return Err(PolicyError::InvalidRequest(format!(
                "runtimeId exceeds {} characters",
                MAX_RUNTIME_ID_LEN
            )));
        }

        let reason = self
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if let Some(reason) = &reason {
            if reason.chars().count() > MAX_REASON_LEN {
                return Err(PolicyError::InvalidRequest(format!(
                    "reason exceeds {} characters",
                    MAX_REASON_LEN
                )));
            }
        }

        if let Some(ttl) = self.ttl_seconds {
            if ttl == 0 || ttl > MAX_TTL_SECS {
                return Err(PolicyError::InvalidRequest(format!(
                    "ttlSeconds must be between 1 and {}",
                    MAX_TTL_SECS
                )));
            }
        }

        Ok(Self {
            runtime_id,
            reason,
            ttl_seconds: self.ttl_seconds,
        })
    }
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Active runtime ids, sorted
    pub runtime_ids: Vec<String>,
    /// Active entries, sorted by id
    pub entries: Vec<RevocationEntry>,
    pub last_updated: Option<DateTime<Utc>>,
    pub stale: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<String, RevocationEntry>,
    last_update: Option<DateTime<Utc>>,
}

impl RegistryState {
    fn prune(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_active(now));
        let expired = before - self.entries.len();
        if expired > 0 {
            debug!(expired, "Pruned expired revocations");
        }
    }
}

/// TTL-based store of revoked runtimes
///
/// All mutations and the read-time prune run under one lock.
#[derive(Debug)]
pub struct RevocationRegistry {
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    state: Mutex<RegistryState>,
}

impl RevocationRegistry {
    /// Registry on the system clock with the given staleness threshold
    pub fn new(stale_after: std::time::Duration) -> Self {
        Self::with_clock(Arc::new(SystemClock), stale_after)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, stale_after: std::time::Duration) -> Self {
        Self {
            clock,
            stale_after: Duration::from_std(stale_after).unwrap_or_else(|_| Duration::days(36_500)),
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(std::time::Duration::from_secs(config.stale_after_secs))
    }

    /// Revoke `runtime_id`, replacing any existing entry
    pub fn revoke(
        &self,
        runtime_id: &str,
        reason: Option<&str>,
        ttl_seconds: Option<u64>,
    ) -> Result<RevocationEntry> {
        let mut request = RevokeRequest::new(runtime_id);
        request.reason = reason.map(str::to_string);
        request.ttl_seconds = ttl_seconds;
        self.apply(request)
    }

    /// Revoke from an already-built request
    pub fn apply(&self, request: RevokeRequest) -> Result<RevocationEntry> {
        let request = request.validate()?;

        let mut state = self.state.lock();
        let now = self.clock.now();
        let entry = RevocationEntry {
            runtime_id: request.runtime_id.clone(),
            reason: request.reason,
            issued_at: now,
            expires_at: request
                .ttl_seconds
                .map(|ttl| now + Duration::seconds(ttl as i64)),
        };

        state.entries.insert(request.runtime_id, entry.clone());
        state.last_update = Some(now);

        info!(
            runtime_id = %entry.runtime_id,
            expires_at = ?entry.expires_at,
            "Runtime revoked"
        );
        Ok(entry)
    }

    /// Remove any revocation for `runtime_id`; returns whether one existed
    pub fn reinstate(&self, runtime_id: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.remove(runtime_id.trim()).is_some();
        if removed {
            state.last_update = Some(self.clock.now());
            info!(runtime_id, "Runtime reinstated");
        }
        removed
    }

    /// Whether `runtime_id` is currently revoked
    pub fn is_revoked(&self, runtime_id: &str) -> bool {
        let mut state = self.state.lock();
        state.prune(self.clock.now());
        state.entries.contains_key(runtime_id.trim())
    }

    /// Drop every revocation
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.last_update = Some(self.clock.now());
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut state = self.state.lock();
        let now = self.clock.now();
        state.prune(now);

        let mut entries: Vec<RevocationEntry> = state.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.runtime_id.cmp(&b.runtime_id));
        let runtime_ids = entries.iter().map(|e| e.runtime_id.clone()).collect();

        let stale = match state.last_update {
            None => true,
            Some(last) => now - last > self.stale_after,
        };

        RegistrySnapshot {
            runtime_ids,
            entries,
            last_updated: state.last_update,
            stale,
        }
    }

    /// `{"revocation": {"runtimeIds": [...]}}`
    pub fn as_policy_input(&self) -> serde_json::Value {
        serde_json::json!({ "revocation": { "runtimeIds": self.snapshot().runtime_ids } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn registry() -> (Arc<ManualClock>, RevocationRegistry) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let registry =
            RevocationRegistry::with_clock(clock.clone(), std::time::Duration::from_secs(300));
        (clock, registry)
    }

    #[test]
    fn test_ttl_expiry_observed_on_read() {
        let (clock, registry) = registry();
        registry.revoke("r-1", None, Some(5)).unwrap();

        clock.advance_secs(3);
        assert_eq!(registry.snapshot().runtime_ids, vec!["r-1"]);

        clock.advance_secs(3);
        assert!(registry.snapshot().runtime_ids.is_empty());
        assert!(!registry.is_revoked("r-1"));
    }

    #[test]
    fn test_permanent_revocation_and_reinstate() {
        let (_, registry) = registry();
        let entry = registry.revoke("r-123", Some("compromised"), None).unwrap();
        assert!(entry.expires_at.is_none());
        assert_eq!(entry.reason.as_deref(), Some("compromised"));
        assert_eq!(registry.snapshot().runtime_ids, vec!["r-123"]);

        assert!(registry.reinstate("r-123"));
        assert!(registry.snapshot().runtime_ids.is_empty());
        assert!(!registry.reinstate("r-1"));
    }

    #[test]
    fn test_staleness() {
        let (clock, registry) = registry();
        assert!(registry.snapshot().stale);

        registry.revoke("r-1", None, None).unwrap();
        assert!(!registry.snapshot().stale);

        clock.advance_secs(300);
        assert!(!registry.snapshot().stale);

        clock.advance_secs(1);
        assert!(registry.snapshot().stale);

        registry.reinstate("r-1");
        assert!(!registry.snapshot().stale);
    }

    #[test]
    fn test_unknown_reinstate_is_not_a_mutation() {
        let (_, registry) = registry();
        assert!(!registry.reinstate("ghost"));
        assert!(registry.snapshot().stale);
        assert!(registry.snapshot().last_updated.is_none());
    }

    #[test]
    fn test_revoke_overwrites_existing_entry() {
        let (clock, registry) = registry();
        registry.revoke("r-1", Some("first"), Some(10)).unwrap();
        clock.advance_secs(5);
        let entry = registry.revoke("r-1", Some("second"), None).unwrap();

        clock.advance_secs(60);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.entries, vec![entry]);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let (_, registry) = registry();
        for id in ["r-3", "r-1", "r-2"] {
            registry.revoke(id, None, None).unwrap();
        }
        assert_eq!(registry.snapshot().runtime_ids, vec!["r-1", "r-2", "r-3"]);
        assert_eq!(
            registry.as_policy_input(),
            serde_json::json!({"revocation": {"runtimeIds": ["r-1", "r-2", "r-3"]}})
        );

        registry.clear();
        assert!(registry.snapshot().runtime_ids.is_empty());
    }

    #[test]
    fn test_validation() {
        let (_, registry) = registry();

        let entry = registry.revoke("  r-9  ", Some("   "), Some(1)).unwrap();
        assert_eq!(entry.runtime_id, "r-9");
        assert!(entry.reason.is_none());

        for (id, reason, ttl) in [
            ("", None, None),
            ("   ", None, None),
            (&*"x".repeat(129), None, None),
            ("r-1", Some(&*"y".repeat(513)), None),
            ("r-1", None, Some(0)),
            ("r-1", None, Some(86_401)),
        ] {
            let err = registry.revoke(id, reason, ttl).unwrap_err();
            assert!(matches!(err, PolicyError::InvalidRequest(_)));
        }

        assert!(registry.revoke(&"x".repeat(128), None, Some(86_400)).is_ok());
    }

    #[test]
    fn test_concurrent_mutations_never_tear_snapshots() {
        let (_, registry) = registry();

        std::thread::scope(|scope| {
            for t in 0..8 {
                let registry = &registry;
                scope.spawn(move || {
                    for i in 0..200 {
                        let id = format!("t{}-r{}", t, i % 5);
                        match i % 3 {
                            0 => {
                                registry.revoke(&id, Some("rotation"), None).unwrap();
                            }
                            1 => {
                                registry.reinstate(&id);
                            }
                            _ => {
                                let snapshot = registry.snapshot();
                                let ids: Vec<&str> =
                                    snapshot.entries.iter().map(|e| e.runtime_id.as_str()).collect();
                                assert_eq!(snapshot.runtime_ids, ids);
                                assert!(snapshot.runtime_ids.windows(2).all(|w| w[0] < w[1]));
                            }
                        }
                    }

                    for r in 0..5 {
                        let id = format!("t{}-r{}", t, r);
                        if r < 3 {
                            registry.revoke(&id, None, None).unwrap();
                        } else {
                            registry.reinstate(&id);
                        }
                    }
                });
            }
        });

        let mut expected: Vec<String> = (0..8)
            .flat_map(|t| (0..3).map(move |r| format!("t{}-r{}", t, r)))
            .collect();
        expected.sort();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.runtime_ids, expected);
        assert_eq!(snapshot.entries.len(), expected.len());
        assert!(!snapshot.stale);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let (_, registry) = registry();
        let entry = registry.revoke("r-1", None, Some(60)).unwrap();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["runtimeId"], "r-1");
        assert!(value["expiresAt"].is_string());
        assert!(value.get("issuedAt").is_some());
    }
}
