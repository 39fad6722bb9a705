//! Bundle inspection and packaging commands

use super::Context;
use crate::error::{CliError, CliResult};
use crate::output::{print_field, print_json, print_success, OutputFormat};
use clap::Subcommand;
use std::path::PathBuf;

/// Bundle subcommands
#[derive(Subcommand)]
pub enum BundleCommands {
    /// Print the content-addressed bundle version
    Version,

    /// Print the bundle manifest
    Manifest,

    /// Package the bundle as a tar.gz archive
    Archive {
        /// Destination file
        #[arg(short, long, required_unless_present = "base64")]
        out: Option<PathBuf>,

        /// Print the archive as base64 instead of writing a file
        #[arg(long)]
        base64: bool,
    },
}

/// Execute a bundle command
pub fn execute(command: BundleCommands, ctx: &Context) -> CliResult<()> {
    let bundle = ctx.load_bundle()?;

    match command {
        BundleCommands::Version => {
            match ctx.output {
                OutputFormat::Text => println!("{}", bundle.version()),
                OutputFormat::Json => print_json(&serde_json::json!({ "version": bundle.version() }))?,
            }
            Ok(())
        }

        BundleCommands::Manifest => {
            let manifest = bundle.manifest();
            match ctx.output {
                OutputFormat::Json => print_json(&manifest)?,
                OutputFormat::Text => {
                    print_field("Version", &manifest.version);
                    print_field("Generated", manifest.generated_at.to_rfc3339());
                    println!("Packages:");
                    for package in &manifest.packages {
                        println!("  {}", package);
                    }
                    println!("Files:");
                    for file in &manifest.files {
                        println!("  {}", file);
                    }
                }
            }
            Ok(())
        }

        BundleCommands::Archive { out, base64 } => {
            if base64 {
                println!("{}", bundle.to_base64()?);
                return Ok(());
            }

            let out = out.ok_or_else(|| CliError::Input("--out is required".to_string()))?;
            bundle.write_archive(&out)?;
            match ctx.output {
                OutputFormat::Text => print_success(&format!(
                    "Wrote {} modules to {} (version {})",
                    bundle.len(),
                    out.display(),
                    bundle.version()
                )),
                OutputFormat::Json => print_json(&serde_json::json!({
                    "path": out,
                    "version": bundle.version(),
                    "modules": bundle.len(),
                }))?,
            }
            Ok(())
        }
    }
}
