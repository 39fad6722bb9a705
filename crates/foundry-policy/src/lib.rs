//! # Foundry Policy
//!
//! Policy-gated trust and revocation backbone shared by every Foundry service.
//!
//! ## Overview
//!
//! Services never talk to the policy engine directly. They go through this
//! crate, which covers four concerns:
//!
//! - **Bundles**: discover Rego sources on disk, fingerprint them into a
//!   content-addressed version and package them as a `tar.gz` archive
//! - **Decisions**: publish bundle modules to the engine and evaluate decision
//!   paths with a strict error taxonomy (denied vs. infrastructure failure)
//! - **Audit**: append every decision and feed event to a hash-chained
//!   JSON-lines file
//! - **Revocation**: an in-memory TTL registry of revoked runtime identifiers
//!   plus a background poller that ingests a certificate-revocation list
//!
//! ## Key Components
//!
//! - [`PolicyBundle`]: Immutable, versioned set of [`PolicyModule`]s
//! - [`DecisionClient`]: Publish/evaluate client with blocking and async forms
//! - [`AuditLogger`]: Tamper-evident decision log
//! - [`RevocationRegistry`]: Explicit revocations with TTL expiry
//! - [`FeedPoller`]: CRL ingestion loop
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use foundry_policy::{
//!     AuditLogger, DecisionClient, PolicyBundle, PolicyError, TransportKind,
//! };
//!
//! # fn example() -> foundry_policy::Result<()> {
//! let bundle = PolicyBundle::from_directories(&["policies"])?;
//! let audit = Arc::new(AuditLogger::from_env("spawn_service")?);
//!
//! let client = DecisionClient::builder("http://opa:8181", "spawn_service")
//!     .transport_kind(TransportKind::Ureq)
//!     .bundle_version(bundle.version())
//!     .audit_logger(audit)
//!     .build()?;
//!
//! client.publish_bundle(&bundle, None)?;
//!
//! let input = serde_json::json!({ "tenant": "blue", "track": "netplus" });
//! match client.ensure_allow("foundry/spawn", &input) {
//!     Ok(decision) => println!("allowed: {:?}", decision.reason),
//!     Err(PolicyError::Denied { reason, .. }) => println!("forbidden: {:?}", reason),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod audit;
pub mod bundle;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod revocation;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use audit::{AuditKind, AuditLogger, AuditRecord, ChainVerification};
pub use bundle::{
    discover_policy_modules, discover_policy_root, load_policy_module, parse_package,
    BundleManifest, PolicyBundle, PolicyModule, DEFAULT_PATTERN,
};
pub use client::{Decision, DecisionClient, DecisionClientBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AuditConfig, BundleConfig, EngineConfig, FeedConfig, LoggingConfig, PolicyConfig,
    RegistryConfig,
};
pub use error::{PolicyError, PushFailure, PushFailures, Result};
pub use revocation::{
    crl_fingerprint, parse_crl, FeedHandle, FeedPoller, FeedSource, FeedStatus, HttpFeedSource,
    PollOutcome, PublishState, RegistrySnapshot, RevocationEntry, RevocationRegistry,
    RevocationSnapshot, RevokeRequest,
};
pub use transport::{
    AsyncHttpTransport, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport,
    TransportKind, Transports, UreqTransport,
};
