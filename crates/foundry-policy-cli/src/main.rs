//! Foundry policy CLI
//!
//! Operator interface to the policy backbone:
//! - Inspect, version and package policy bundles
//! - Publish bundles and evaluate decisions against the engine
//! - Inspect revocation lists and run the revocation feed poller

use clap::{Parser, Subcommand};
use foundry_policy::{telemetry, PolicyConfig};
use std::path::PathBuf;

mod commands;
mod error;
mod output;

use commands::{bundle, decision, revocation, Context};
use error::{CliError, CliResult};
use output::{print_error, OutputFormat};

/// Foundry policy CLI application
#[derive(Parser)]
#[command(name = "foundry-policy")]
#[command(about = "Foundry policy bundles, decisions and revocation feeds", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FOUNDRY_CONFIG")]
    config: Option<String>,

    /// Policy directory (repeatable; overrides bundle.policy_dirs)
    #[arg(short = 'd', long = "policy-dir")]
    policy_dirs: Vec<PathBuf>,

    /// Policy engine base URL
    #[arg(short, long, env = "FOUNDRY_ENGINE")]
    engine: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Inspect and package the policy bundle
    Bundle {
        #[command(subcommand)]
        command: bundle::BundleCommands,
    },

    /// Publish every bundle module to the engine
    Publish {
        /// Path segment prepended to policy ids
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Evaluate a decision path
    Eval {
        /// Decision path, e.g. foundry/spawn
        path: String,

        /// Input document as JSON, or @FILE
        #[arg(short, long, default_value = "{}")]
        input: String,

        /// Exit with code 3 when the decision is a denial
        #[arg(long)]
        ensure: bool,

        /// Append the decision to the audit log
        #[arg(long)]
        audit: bool,
    },

    /// Certificate-revocation list tools
    Crl {
        #[command(subcommand)]
        command: revocation::CrlCommands,
    },

    /// Revocation feed poller
    Feed {
        #[command(subcommand)]
        command: revocation::FeedCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config =
        PolicyConfig::load(cli.config.as_deref()).map_err(|e| CliError::Config(e.to_string()))?;

    // Command output goes to stdout; keep library logging quiet unless asked
    config.logging.level = if cli.verbose { "debug" } else { "warn" }.to_string();
    telemetry::init_tracing(&config.logging);

    if !cli.policy_dirs.is_empty() {
        config.bundle.policy_dirs = cli.policy_dirs;
    }
    if let Some(engine) = cli.engine {
        config.engine.base_url = engine;
    }

    let ctx = Context {
        config,
        output: cli.output,
    };

    match cli.command {
        Commands::Bundle { command } => bundle::execute(command, &ctx),
        Commands::Publish { prefix } => decision::publish(&ctx, prefix).await,
        Commands::Eval {
            path,
            input,
            ensure,
            audit,
        } => decision::eval(&ctx, &path, &input, ensure, audit).await,
        Commands::Crl { command } => revocation::execute_crl(command, &ctx),
        Commands::Feed { command } => revocation::execute_feed(command, &ctx).await,
    }
}
