//! Publish and decision client for the policy engine
//!
//! Every operation exists in a blocking form and an `_async` form with the
//! same semantics. Request construction and response interpretation are shared;
//! only the transport call differs.

mod decision;

pub use decision::Decision;

use crate::audit::AuditLogger;
use crate::bundle::PolicyBundle;
use crate::config::PolicyConfig;
use crate::error::{PolicyError, PushFailure, PushFailures, Result};
use crate::transport::{HttpRequest, HttpResponse, Method, TransportKind, Transports};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for `/v1/policies` and `/v1/data`
#[derive(Debug)]
pub struct DecisionClient {
    base_url: String,
    service: String,
    transports: Transports,
    audit: Option<Arc<AuditLogger>>,
    bundle_version: Option<String>,
    include_input: bool,
}

/// Builder for [`DecisionClient`]
pub struct DecisionClientBuilder {
    base_url: String,
    service: String,
    transport_kind: TransportKind,
    timeout: Duration,
    transports: Option<Transports>,
    audit: Option<Arc<AuditLogger>>,
    bundle_version: Option<String>,
    include_input: bool,
}

impl DecisionClientBuilder {
    /// Transport implementation to build
    pub fn transport_kind(mut self, kind: TransportKind) -> Self {
        self.transport_kind = kind;
        self
    }

    /// Per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use pre-built transports instead of `transport_kind`
    pub fn transports(mut self, transports: Transports) -> Self {
        self.transports = Some(transports);
        self
    }

    /// Audit every decision to `logger`
    pub fn audit_logger(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    /// Bundle version recorded with every decision
    pub fn bundle_version(mut self, version: impl Into<String>) -> Self {
        self.bundle_version = Some(version.into());
        self
    }

    /// Echo decision input into audit records
    pub fn include_input(mut self, include: bool) -> Self {
        self.include_input = include;
        self
    }

    pub fn build(self) -> Result<DecisionClient> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(PolicyError::Config(
                "Policy engine base URL must not be empty".to_string(),
            ));
        }

        let transports = match self.transports {
            Some(transports) => transports,
            None => Transports::build(self.transport_kind, self.timeout)?,
        };

        Ok(DecisionClient {
            base_url,
            service: self.service,
            transports,
            audit: self.audit,
            bundle_version: self.bundle_version,
            include_input: self.include_input,
        })
    }
}

impl DecisionClient {
    /// Start building a client for `service`
    pub fn builder(base_url: impl Into<String>, service: impl Into<String>) -> DecisionClientBuilder {
        DecisionClientBuilder {
            base_url: base_url.into(),
            service: service.into(),
            transport_kind: TransportKind::default(),
            timeout: DEFAULT_TIMEOUT,
            transports: None,
            audit: None,
            bundle_version: None,
            include_input: true,
        }
    }

    /// Build a client from configuration, with an audit logger for `service`
    pub fn from_config(service: &str, config: &PolicyConfig) -> Result<DecisionClientBuilder> {
        let audit = AuditLogger::from_config(service, &config.audit)?;
        Ok(Self::builder(config.engine.base_url.clone(), service)
            .transport_kind(config.engine.transport)
            .timeout(config.engine.timeout())
            .include_input(config.audit.include_input)
            .audit_logger(Arc::new(audit)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Bundle version this client tags decisions with
    pub fn bundle_version(&self) -> Option<&str> {
        self.bundle_version.as_deref()
    }

    pub fn audit_logger(&self) -> Option<&Arc<AuditLogger>> {
        self.audit.as_ref()
    }

    // ========== Publish ==========

    /// Publish every module of `bundle`
    ///
    /// All modules are attempted; failures are aggregated into one
    /// [`PolicyError::Push`]. Returns the published policy ids.
    #[instrument(skip(self, bundle), fields(service = %self.service, version = %bundle.version()))]
    pub fn publish_bundle(&self, bundle: &PolicyBundle, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut outcome = PublishOutcome::default();
        for module in bundle.modules() {
            let id = module.policy_id(prefix);
            let request = self.policy_request(&id, &module.source);
            outcome.record(id, self.transports.blocking.send(&request));
        }
        outcome.finish(bundle)
    }

    /// Async form of [`publish_bundle`](Self::publish_bundle)
    #[instrument(skip(self, bundle), fields(service = %self.service, version = %bundle.version()))]
    pub async fn publish_bundle_async(
        &self,
        bundle: &PolicyBundle,
        prefix: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut outcome = PublishOutcome::default();
        for module in bundle.modules() {
            let id = module.policy_id(prefix);
            let request = self.policy_request(&id, &module.source);
            outcome.record(id, self.transports.non_blocking.send(&request).await);
        }
        outcome.finish(bundle)
    }

    // ========== Evaluate ==========

    /// Evaluate `path` and return the raw `result`
    #[instrument(skip(self, input), fields(service = %self.service))]
    pub fn evaluate(&self, path: &str, input: &Value) -> Result<Value> {
        let request = self.evaluate_request(path, input)?;
        let response = self.transports.blocking.send(&request)?;
        extract_result(&request, response)
    }

    /// Async form of [`evaluate`](Self::evaluate)
    #[instrument(skip(self, input), fields(service = %self.service))]
    pub async fn evaluate_async(&self, path: &str, input: &Value) -> Result<Value> {
        let request = self.evaluate_request(path, input)?;
        let response = self.transports.non_blocking.send(&request).await?;
        extract_result(&request, response)
    }

    /// Evaluate, normalize and audit
    pub fn decide(&self, path: &str, input: &Value) -> Result<Decision> {
        let started = Instant::now();
        let decision = Decision::from_result(&self.evaluate(path, input)?)?;
        self.audit_decision(path, &decision, input, started);
        Ok(decision)
    }

    /// Async form of [`decide`](Self::decide)
    ///
    /// The audit append runs on the blocking pool.
    pub async fn decide_async(&self, path: &str, input: &Value) -> Result<Decision> {
        let started = Instant::now();
        let decision = Decision::from_result(&self.evaluate_async(path, input).await?)?;
        self.audit_decision_async(path, &decision, input, started).await;
        Ok(decision)
    }

    /// Decide and turn `allow = false` into [`PolicyError::Denied`]
    pub fn ensure_allow(&self, path: &str, input: &Value) -> Result<Decision> {
        require_allow(path, self.decide(path, input)?)
    }

    /// Async form of [`ensure_allow`](Self::ensure_allow)
    pub async fn ensure_allow_async(&self, path: &str, input: &Value) -> Result<Decision> {
        require_allow(path, self.decide_async(path, input).await?)
    }

    // ========== Data ==========

    /// Replace the data document `name` with `value`
    #[instrument(skip(self, value), fields(service = %self.service))]
    pub fn put_data(&self, name: &str, value: &Value) -> Result<()> {
        let request = self.data_request(name, value)?;
        let response = self.transports.blocking.send(&request)?;
        expect_success(&request, &response)
    }

    /// Async form of [`put_data`](Self::put_data)
    #[instrument(skip(self, value), fields(service = %self.service))]
    pub async fn put_data_async(&self, name: &str, value: &Value) -> Result<()> {
        let request = self.data_request(name, value)?;
        let response = self.transports.non_blocking.send(&request).await?;
        expect_success(&request, &response)
    }

    // ========== Helpers ==========

    fn policy_request(&self, id: &str, source: &str) -> HttpRequest {
        HttpRequest::new(Method::Put, format!("{}/v1/policies/{}", self.base_url, id))
            .body("text/plain", source.as_bytes().to_vec())
    }

    fn evaluate_request(&self, path: &str, input: &Value) -> Result<HttpRequest> {
        HttpRequest::new(Method::Post, self.data_url(path)).json(&json!({ "input": input }))
    }

    fn data_request(&self, name: &str, value: &Value) -> Result<HttpRequest> {
        HttpRequest::new(Method::Put, self.data_url(name)).json(&json!({ "value": value }))
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/v1/data/{}", self.base_url, path.trim_matches('/'))
    }

    fn audit_decision(&self, path: &str, decision: &Decision, input: &Value, started: Instant) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(path, allow = decision.allow, elapsed_ms, "Policy decision");

        let Some(audit) = &self.audit else {
            return;
        };
        let input = self.include_input.then_some(input);
        if let Err(e) = audit.log_decision(
            path,
            decision,
            input,
            self.bundle_version.as_deref(),
            elapsed_ms,
        ) {
            warn!(path, error = %e, "Failed to write decision audit record");
        }
    }

    async fn audit_decision_async(
        &self,
        path: &str,
        decision: &Decision,
        input: &Value,
        started: Instant,
    ) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(path, allow = decision.allow, elapsed_ms, "Policy decision");

        let Some(audit) = self.audit.clone() else {
            return;
        };
        let package = path.to_string();
        let decision = decision.clone();
        let input = self.include_input.then(|| input.clone());
        let version = self.bundle_version.clone();

        let written = tokio::task::spawn_blocking(move || {
            audit.log_decision(&package, &decision, input.as_ref(), version.as_deref(), elapsed_ms)
        })
        .await;

        match written {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(path, error = %e, "Failed to write decision audit record"),
            Err(e) => warn!(path, error = %e, "Decision audit task failed"),
        }
    }
}

#[derive(Default)]
struct PublishOutcome {
    published: Vec<String>,
    failures: Vec<PushFailure>,
}

impl PublishOutcome {
    fn record(&mut self, policy_id: String, response: Result<HttpResponse>) {
        match response {
            Ok(response) if response.is_success() => {
                debug!(policy_id = %policy_id, "Published policy module");
                self.published.push(policy_id);
            }
            Ok(response) => {
                warn!(policy_id = %policy_id, status = response.status, "Policy module rejected");
                self.failures.push(PushFailure {
                    policy_id,
                    status: response.status,
                    message: response.text().trim().to_string(),
                });
            }
            Err(e) => {
                warn!(policy_id = %policy_id, error = %e, "Policy module publish failed");
                self.failures.push(PushFailure {
                    policy_id,
                    status: 0,
                    message: e.to_string(),
                });
            }
        }
    }

    fn finish(self, bundle: &PolicyBundle) -> Result<Vec<String>> {
        if !self.failures.is_empty() {
            return Err(PolicyError::Push(PushFailures(self.failures)));
        }
        info!(
            version = %bundle.version(),
            modules = self.published.len(),
            "Published policy bundle"
        );
        Ok(self.published)
    }
}

fn expect_success(request: &HttpRequest, response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(PolicyError::Protocol(format!(
            "{} {} returned status {}: {}",
            request.method,
            request.url,
            response.status,
            response.text().trim()
        )))
    }
}

fn extract_result(request: &HttpRequest, response: HttpResponse) -> Result<Value> {
    expect_success(request, &response)?;

    let body = response.json().map_err(|e| {
        PolicyError::Protocol(format!("{} returned a non-JSON body: {}", request.url, e))
    })?;

    match body {
        Value::Object(mut fields) => fields.remove("result").ok_or_else(|| {
            PolicyError::Protocol(format!("{} response has no 'result'", request.url))
        }),
        _ => Err(PolicyError::Protocol(format!(
            "{} response is not a JSON object",
            request.url
        ))),
    }
}

fn require_allow(path: &str, decision: Decision) -> Result<Decision> {
    if decision.allow {
        Ok(decision)
    } else {
        Err(PolicyError::Denied {
            path: path.to_string(),
            reason: decision.reason,
        })
    }
}
