//! Append-only JSON-lines audit logger

use super::integrity::{verify_chain, ChainVerification, IntegrityChain};
use super::record::{AuditKind, AuditRecord, PendingRecord};
use crate::client::Decision;
use crate::config::AuditConfig;
use crate::error::{PolicyError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

struct LogState {
    chain: IntegrityChain,
    file: File,
}

/// Tamper-evident decision log for one service
///
/// Chain update and file append happen under one lock, so concurrent callers
/// always produce whole lines in chain order.
pub struct AuditLogger {
    path: PathBuf,
    service: String,
    state: Mutex<LogState>,
}

impl AuditLogger {
    /// Open (or create) the log at `path`, resuming its chain
    pub fn new(path: impl Into<PathBuf>, service: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| audit_io(&path, e))?;
            }
        }

        let chain = if path.exists() {
            load_chain_state(&path)?
        } else {
            IntegrityChain::new()
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| audit_io(&path, e))?;
        terminate_partial_line(&mut file).map_err(|e| audit_io(&path, e))?;

        debug!(path = %path.display(), entries = chain.entry_count(), "Opened audit log");
        Ok(Self {
            path,
            service: service.into(),
            state: Mutex::new(LogState { chain, file }),
        })
    }

    /// Resolve the target path from configuration
    ///
    /// The environment override wins, then the explicit path, then
    /// `<directory>/<service>.jsonl`.
    pub fn from_config(service: &str, config: &AuditConfig) -> Result<Self> {
        Self::new(resolve_path(service, config), service)
    }

    /// Resolve the target path from default configuration and the environment
    pub fn from_env(service: &str) -> Result<Self> {
        Self::from_config(service, &AuditConfig::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Records written so far, including those resumed from disk
    pub fn entry_count(&self) -> u64 {
        self.state.lock().chain.entry_count()
    }

    /// Append a decision record
    pub fn log_decision(
        &self,
        package: &str,
        decision: &Decision,
        input: Option<&serde_json::Value>,
        version: Option<&str>,
        elapsed_ms: f64,
    ) -> Result<AuditRecord> {
        let pending = PendingRecord::new(AuditKind::Decision, package, decision.allow)
            .reason(decision.reason.clone())
            .version(version.map(str::to_string))
            .elapsed_ms(elapsed_ms)
            .input(input.cloned());
        self.append(pending)
    }

    /// Append a revocation feed event
    ///
    /// `success` lands in `allow`; the CRL fingerprint, when known, in `version`.
    pub fn log_feed_event(
        &self,
        data_document: &str,
        success: bool,
        reason: Option<String>,
        fingerprint: Option<&str>,
        detail: Option<serde_json::Value>,
        elapsed_ms: f64,
    ) -> Result<AuditRecord> {
        let pending = PendingRecord::new(AuditKind::RevocationFeed, data_document, success)
            .reason(reason)
            .version(fingerprint.map(str::to_string))
            .elapsed_ms(elapsed_ms)
            .input(detail);
        self.append(pending)
    }

    fn append(&self, pending: PendingRecord) -> Result<AuditRecord> {
        let mut state = self.state.lock();
        let record = pending.finalize(&self.service, state.chain.previous_hash());

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let file = &mut state.file;
        file.write_all(&line)
            .and_then(|_| file.flush())
            .map_err(|e| audit_io(&self.path, e))?;

        state.chain.update(&record);
        Ok(record)
    }

    /// Read every record from disk
    ///
    /// Lines that do not parse are skipped with a warning; a record written
    /// after a torn line still links to the last whole record before it.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>> {
        let _guard = self.state.lock();
        read_records(&self.path)
    }

    /// Verify hashes and linkage of the whole file
    pub fn verify(&self) -> Result<ChainVerification> {
        Ok(verify_chain(&self.read_all()?))
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("path", &self.path)
            .field("service", &self.service)
            .finish()
    }
}

fn resolve_path(service: &str, config: &AuditConfig) -> PathBuf {
    if let Ok(path) = std::env::var(&config.env_var) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(path) = &config.path {
        return path.clone();
    }
    config.directory.join(format!("{}.jsonl", service))
}

fn audit_io(path: &Path, err: std::io::Error) -> PolicyError {
    PolicyError::Audit(format!("{}: {}", path.display(), err))
}

fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| audit_io(path, e))?;
    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| audit_io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = number + 1,
                error = %e,
                "Skipping unparsable audit line"
            ),
        }
    }
    Ok(records)
}

/// Start a fresh line if the previous writer died mid-append
fn terminate_partial_line(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!("Audit log ends with a partial record; starting a new line");
        file.write_all(b"\n")?;
        file.flush()?;
    }
    Ok(())
}

fn load_chain_state(path: &Path) -> Result<IntegrityChain> {
    let records = read_records(path)?;
    let last_hash = records.last().map(|r| r.entry_hash.clone());
    Ok(IntegrityChain::from_state(last_hash, records.len() as u64))
}
