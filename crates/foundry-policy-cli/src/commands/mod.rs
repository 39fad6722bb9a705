//! CLI command implementations

pub mod bundle;
pub mod decision;
pub mod revocation;

use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use foundry_policy::{
    discover_policy_root, AuditLogger, DecisionClient, PolicyBundle, PolicyConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Service name written into audit records produced by the CLI
pub const CLI_SERVICE: &str = "foundry-policy-cli";

/// Resolved configuration shared by every command
pub struct Context {
    pub config: PolicyConfig,
    pub output: OutputFormat,
}

impl Context {
    /// Load the bundle from `POLICY_DIR` or the configured directories
    pub fn load_bundle(&self) -> CliResult<PolicyBundle> {
        let roots: Vec<PathBuf> = discover_policy_root(&self.config.bundle.policy_dirs);
        Ok(PolicyBundle::from_directories_with_pattern(
            roots.as_slice(),
            &self.config.bundle.pattern,
        )?)
    }

    /// Decision client for the configured engine
    pub fn client(&self, audit: bool, bundle_version: Option<&str>) -> CliResult<DecisionClient> {
        let engine = &self.config.engine;
        if engine.base_url.trim().is_empty() {
            return Err(CliError::Config("engine.base_url is empty".to_string()));
        }

        let mut builder = DecisionClient::builder(engine.base_url.clone(), CLI_SERVICE)
            .transport_kind(engine.transport)
            .timeout(engine.timeout())
            .include_input(self.config.audit.include_input);
        if audit {
            let logger = AuditLogger::from_config(CLI_SERVICE, &self.config.audit)?;
            builder = builder.audit_logger(Arc::new(logger));
        }
        if let Some(version) = bundle_version {
            builder = builder.bundle_version(version);
        }
        Ok(builder.build()?)
    }
}
