//! Background ingestion of a certificate-revocation list

use super::crl::{crl_fingerprint, parse_crl, RevocationSnapshot};
use crate::audit::AuditLogger;
use crate::client::DecisionClient;
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, FeedConfig, MIN_POLL_INTERVAL_SECS};
use crate::error::{PolicyError, Result};
use crate::transport::{AsyncHttpTransport, HttpRequest, Transports};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Where CRL bytes come from
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// CRL served over HTTP
pub struct HttpFeedSource {
    url: String,
    transport: Arc<dyn AsyncHttpTransport>,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, transport: Arc<dyn AsyncHttpTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        let response = self.transport.send(&HttpRequest::get(self.url.clone())).await?;
        if !response.is_success() {
            return Err(PolicyError::Protocol(format!(
                "GET {} returned status {}",
                self.url, response.status
            )));
        }
        Ok(response.body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Result of publishing a freshly parsed snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishState {
    Published,
    /// This fingerprint already reached the engine
    AlreadyPublished,
    /// No publisher configured
    Disabled,
    Failed(String),
}

/// Result of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Refreshed {
        fingerprint: String,
        revoked: usize,
        publish: PublishState,
    },
    Failed {
        error: String,
    },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Refreshed { .. })
    }
}

/// Health of the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub snapshot: Option<RevocationSnapshot>,
    pub fingerprint: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub stale: bool,
}

#[derive(Debug, Default)]
struct FeedState {
    snapshot: Option<RevocationSnapshot>,
    fingerprint: Option<String>,
    published_fingerprint: Option<String>,
    last_attempt: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    consecutive_failures: u32,
}

/// Periodic CRL poller
///
/// The poller is the only writer of its state. The lock is never held across
/// an `.await`.
pub struct FeedPoller {
    source: Arc<dyn FeedSource>,
    publisher: Option<Arc<DecisionClient>>,
    data_document: String,
    interval: Duration,
    stale_after: chrono::Duration,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<AuditLogger>>,
    state: RwLock<FeedState>,
}

impl FeedPoller {
    /// Poller with default settings and no publisher
    pub fn new(source: Arc<dyn FeedSource>) -> Self {
        let defaults = FeedConfig::default();
        Self {
            source,
            publisher: None,
            data_document: defaults.data_document.clone(),
            interval: defaults.effective_interval(),
            stale_after: chrono::Duration::seconds(defaults.stale_after_secs as i64),
            clock: Arc::new(SystemClock),
            audit: None,
            state: RwLock::new(FeedState::default()),
        }
    }

    /// Build from configuration
    ///
    /// `publisher` is ignored when publishing is disabled.
    pub fn from_config(
        feed: &FeedConfig,
        engine: &EngineConfig,
        publisher: Option<Arc<DecisionClient>>,
    ) -> Result<Self> {
        let url = feed
            .source_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PolicyError::Config("feed.source_url is not set".to_string()))?;

        let transports = Transports::build(engine.transport, engine.timeout())?;
        let source = Arc::new(HttpFeedSource::new(url, transports.non_blocking));

        let mut poller = Self::new(source)
            .interval(Duration::from_secs(feed.poll_interval_secs))
            .stale_after(Duration::from_secs(feed.stale_after_secs))
            .data_document(feed.data_document.clone());
        if feed.publish_enabled {
            poller.publisher = publisher;
        }
        Ok(poller)
    }

    /// Publish snapshots through `client`
    pub fn publisher(mut self, client: Arc<DecisionClient>) -> Self {
        self.publisher = Some(client);
        self
    }

    /// Engine data document name
    pub fn data_document(mut self, name: impl Into<String>) -> Self {
        self.data_document = name.into();
        self
    }

    /// Poll interval, floored at [`MIN_POLL_INTERVAL_SECS`]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_secs(MIN_POLL_INTERVAL_SECS));
        self
    }

    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::days(36_500));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn audit_logger(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.interval
    }

    /// Fetch, parse and publish once; never fails
    pub async fn poll_once(&self) -> PollOutcome {
        let started = Instant::now();
        let now = self.clock.now();
        self.state.write().last_attempt = Some(now);

        let document = match self.source.fetch().await {
            Ok(document) => document,
            Err(e) => return self.record_failure(format!("fetch failed: {}", e), started),
        };

        let fingerprint = crl_fingerprint(&document);
        let snapshot = match parse_crl(&document) {
            Ok(snapshot) => snapshot,
            Err(e) => return self.record_failure(e.to_string(), started),
        };

        let revoked = snapshot.len();
        let needs_publish = {
            let mut state = self.state.write();
            state.snapshot = Some(snapshot.clone());
            state.fingerprint = Some(fingerprint.clone());
            state.last_success = Some(now);
            state.last_error = None;
            state.consecutive_failures = 0;
            state.published_fingerprint.as_deref() != Some(fingerprint.as_str())
        };

        let publish = match &self.publisher {
            None => PublishState::Disabled,
            Some(_) if !needs_publish => PublishState::AlreadyPublished,
            Some(client) => {
                match client
                    .put_data_async(&self.data_document, &snapshot.as_document())
                    .await
                {
                    Ok(()) => {
                        self.state.write().published_fingerprint = Some(fingerprint.clone());
                        PublishState::Published
                    }
                    Err(e) => {
                        warn!(document = %self.data_document, error = %e, "Failed to publish revocation snapshot");
                        PublishState::Failed(e.to_string())
                    }
                }
            }
        };

        info!(
            source = %self.source.describe(),
            fingerprint = %fingerprint,
            revoked,
            publish = ?publish,
            "Revocation feed refreshed"
        );

        let reason = match &publish {
            PublishState::Failed(error) => Some(format!("publish failed: {}", error)),
            _ => None,
        };
        self.audit_event(
            true,
            reason,
            Some(&fingerprint),
            Some(serde_json::json!({ "revoked": revoked })),
            started,
        );

        PollOutcome::Refreshed {
            fingerprint,
            revoked,
            publish,
        }
    }

    fn record_failure(&self, error: String, started: Instant) -> PollOutcome {
        let failures = {
            let mut state = self.state.write();
            state.last_error = Some(error.clone());
            state.consecutive_failures += 1;
            state.consecutive_failures
        };

        warn!(
            source = %self.source.describe(),
            error = %error,
            consecutive_failures = failures,
            "Revocation feed poll failed, keeping previous snapshot"
        );
        self.audit_event(false, Some(error.clone()), None, None, started);

        PollOutcome::Failed { error }
    }

    fn audit_event(
        &self,
        success: bool,
        reason: Option<String>,
        fingerprint: Option<&str>,
        detail: Option<serde_json::Value>,
        started: Instant,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Err(e) =
            audit.log_feed_event(&self.data_document, success, reason, fingerprint, detail, elapsed_ms)
        {
            warn!(error = %e, "Failed to write revocation feed audit record");
        }
    }

    /// Most recently parsed snapshot
    pub fn current_snapshot(&self) -> Option<RevocationSnapshot> {
        self.state.read().snapshot.clone()
    }

    /// `{"revocation": {"runtimeIds": [...]}}`, empty before the first success
    pub fn as_policy_input(&self) -> serde_json::Value {
        match &self.state.read().snapshot {
            Some(snapshot) => snapshot.as_policy_input(),
            None => serde_json::json!({ "revocation": { "runtimeIds": [] } }),
        }
    }

    pub fn status(&self) -> FeedStatus {
        let now = self.clock.now();
        let state = self.state.read();

        let stale = match state.last_success {
            None => true,
            Some(last) => {
                now - last > self.stale_after
                    || state
                        .snapshot
                        .as_ref()
                        .and_then(|s| s.next_update)
                        .map_or(false, |next| next <= now)
            }
        };

        FeedStatus {
            snapshot: state.snapshot.clone(),
            fingerprint: state.fingerprint.clone(),
            last_attempt: state.last_attempt,
            last_success: state.last_success,
            last_error: state.last_error.clone(),
            consecutive_failures: state.consecutive_failures,
            stale,
        }
    }

    /// Run the poll loop on the current runtime
    ///
    /// The first poll happens immediately.
    pub fn spawn(self: Arc<Self>) -> FeedHandle {
        let (shutdown, mut signal) = watch::channel(false);
        let poller = self;

        let handle = tokio::spawn(async move {
            info!(
                source = %poller.source.describe(),
                interval_secs = poller.interval.as_secs(),
                "Starting revocation feed poller"
            );

            let mut ticker = tokio::time::interval(poller.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = poller.poll_once().await;
                        debug!(success = outcome.is_success(), "Revocation feed tick");
                    }
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Revocation feed poller stopped");
        });

        FeedHandle { handle, shutdown }
    }
}

impl std::fmt::Debug for FeedPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPoller")
            .field("source", &self.source.describe())
            .field("data_document", &self.data_document)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Handle to a running poll loop
pub struct FeedHandle {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl FeedHandle {
    /// Stop the loop after the current poll and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|e| PolicyError::Connection(format!("Feed poller task failed: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
