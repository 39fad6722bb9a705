//! Revocation state
//!
//! Two sources feed it: explicit revoke/reinstate calls held in the
//! [`RevocationRegistry`], and a certificate-revocation list ingested by the
//! [`FeedPoller`]. Both project to the same `{"revocation": {"runtimeIds"}}`
//! policy input.

mod crl;
mod feed;
mod registry;

pub use crl::{crl_fingerprint, parse_crl, RevocationSnapshot};
pub use feed::{FeedHandle, FeedPoller, FeedSource, FeedStatus, HttpFeedSource, PollOutcome, PublishState};
pub use registry::{
    RegistrySnapshot, RevocationEntry, RevocationRegistry, RevokeRequest, MAX_REASON_LEN,
    MAX_RUNTIME_ID_LEN, MAX_TTL_SECS,
};
