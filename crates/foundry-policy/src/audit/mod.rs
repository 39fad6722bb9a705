//! Hash-chained audit trail
//!
//! Every decision and every revocation feed event is appended as one JSON
//! object per line. Each record carries the SHA-256 hash of its predecessor so
//! that edits, removals and reordering are detectable with [`verify_chain`].

mod integrity;
mod logger;
mod record;

pub use integrity::{verify_chain, ChainVerification, IntegrityChain};
pub use logger::AuditLogger;
pub use record::{AuditKind, AuditRecord, PendingRecord};
