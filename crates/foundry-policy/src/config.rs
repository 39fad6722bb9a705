//! Configuration for the policy backbone
//!
//! Layered with the `config` crate: serialized defaults, then an optional
//! file, then `FOUNDRY__`-prefixed environment variables
//! (e.g. `FOUNDRY__ENGINE__BASE_URL`).

use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Floor applied to the revocation feed poll interval
pub const MIN_POLL_INTERVAL_SECS: u64 = 30;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Policy engine connection
    #[serde(default)]
    pub engine: EngineConfig,

    /// Audit log location
    #[serde(default)]
    pub audit: AuditConfig,

    /// Revocation registry tuning
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Revocation feed poller
    #[serde(default)]
    pub feed: FeedConfig,

    /// Policy bundle discovery
    #[serde(default)]
    pub bundle: BundleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Policy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// HTTP transport implementation
    #[serde(default)]
    pub transport: TransportKind,

    /// Path segment prepended to published policy ids
    #[serde(default)]
    pub policy_prefix: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            transport: TransportKind::default(),
            policy_prefix: None,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Explicit audit file path
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Directory for `<service>.jsonl` files when no path is set
    #[serde(default = "default_audit_directory")]
    pub directory: PathBuf,

    /// Environment variable that overrides every other setting
    #[serde(default = "default_audit_env_var")]
    pub env_var: String,

    /// Echo decision input into audit records
    #[serde(default = "default_true")]
    pub include_input: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: None,
            directory: default_audit_directory(),
            env_var: default_audit_env_var(),
            include_input: true,
        }
    }
}

/// Revocation registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Seconds without a mutation before the registry reports itself stale
    #[serde(default = "default_registry_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_registry_stale_after(),
        }
    }
}

/// Revocation feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// URL of the certificate-revocation list
    #[serde(default)]
    pub source_url: Option<String>,

    /// Poll interval in seconds (floored at [`MIN_POLL_INTERVAL_SECS`])
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Publish each new snapshot to the policy engine
    #[serde(default = "default_true")]
    pub publish_enabled: bool,

    /// Engine data document the snapshot is published under
    #[serde(default = "default_data_document")]
    pub data_document: String,

    /// Seconds since the last successful poll before the feed is stale
    #[serde(default = "default_feed_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            poll_interval_secs: default_poll_interval(),
            publish_enabled: true,
            data_document: default_data_document(),
            stale_after_secs: default_feed_stale_after(),
        }
    }
}

impl FeedConfig {
    /// Poll interval with the minimum floor applied
    pub fn effective_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}

/// Policy bundle discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Directories scanned for policy sources
    #[serde(default = "default_policy_dirs")]
    pub policy_dirs: Vec<PathBuf>,

    /// File name glob for policy sources
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            policy_dirs: default_policy_dirs(),
            pattern: default_pattern(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://opa:8181".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_audit_directory() -> PathBuf {
    PathBuf::from("audits")
}

fn default_audit_env_var() -> String {
    "OPA_AUDIT_LOG".to_string()
}

fn default_registry_stale_after() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    300
}

fn default_data_document() -> String {
    "revocation".to_string()
}

fn default_feed_stale_after() -> u64 {
    900
}

fn default_policy_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("policies")]
}

fn default_pattern() -> String {
    crate::bundle::DEFAULT_PATTERN.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PolicyConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&PolicyConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FOUNDRY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
