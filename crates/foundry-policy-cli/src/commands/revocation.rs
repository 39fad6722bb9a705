//! Revocation list and feed commands

use super::{Context, CLI_SERVICE};
use crate::error::CliResult;
use crate::output::{print_field, print_json, print_warning, OutputFormat};
use clap::Subcommand;
use foundry_policy::{crl_fingerprint, parse_crl, AuditLogger, FeedPoller, FeedStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// CRL subcommands
#[derive(Subcommand)]
pub enum CrlCommands {
    /// Parse a PEM or DER CRL and print its revoked serials
    Inspect {
        /// CRL file
        file: PathBuf,
    },
}

/// Feed subcommands
#[derive(Subcommand)]
pub enum FeedCommands {
    /// Run the feed poller until interrupted
    Run {
        /// CRL URL (overrides feed.source_url)
        #[arg(long)]
        source: Option<String>,

        /// Do not publish snapshots to the engine
        #[arg(long)]
        no_publish: bool,
    },
}

/// Execute a CRL command
pub fn execute_crl(command: CrlCommands, ctx: &Context) -> CliResult<()> {
    match command {
        CrlCommands::Inspect { file } => {
            let document = std::fs::read(&file)?;
            let fingerprint = crl_fingerprint(&document);
            let snapshot = parse_crl(&document)?;

            match ctx.output {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "fingerprint": fingerprint,
                    "snapshot": snapshot,
                }))?,
                OutputFormat::Text => {
                    print_field("Fingerprint", &fingerprint);
                    print_field("This update", snapshot.this_update.to_rfc3339());
                    print_field(
                        "Next update",
                        snapshot
                            .next_update
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "-".to_string()),
                    );
                    print_field("Revoked", snapshot.len());
                    for id in &snapshot.runtime_ids {
                        println!("  {}", id);
                    }
                }
            }
            Ok(())
        }
    }
}

/// Execute a feed command
pub async fn execute_feed(command: FeedCommands, ctx: &Context) -> CliResult<()> {
    match command {
        FeedCommands::Run { source, no_publish } => {
            let mut feed = ctx.config.feed.clone();
            if let Some(source) = source {
                feed.source_url = Some(source);
            }
            if no_publish {
                feed.publish_enabled = false;
            }

            let publisher = if feed.publish_enabled {
                Some(Arc::new(ctx.client(false, None)?))
            } else {
                None
            };
            let audit = Arc::new(AuditLogger::from_config(CLI_SERVICE, &ctx.config.audit)?);

            let poller = Arc::new(
                FeedPoller::from_config(&feed, &ctx.config.engine, publisher)?.audit_logger(audit),
            );
            let handle = poller.clone().spawn();

            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, stopping feed poller");
            handle.shutdown().await?;

            print_status(&poller.status(), ctx.output)
        }
    }
}

fn print_status(status: &FeedStatus, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(status),
        OutputFormat::Text => {
            if status.stale {
                print_warning("Revocation feed is stale");
            }
            print_field(
                "Fingerprint",
                status.fingerprint.as_deref().unwrap_or("-"),
            );
            print_field(
                "Revoked",
                status.snapshot.as_ref().map_or(0, |s| s.len()),
            );
            print_field("Failures", status.consecutive_failures);
            if let Some(error) = &status.last_error {
                print_field("Last error", error);
            }
            Ok(())
        }
    }
}
