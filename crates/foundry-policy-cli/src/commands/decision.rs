//! Publish and evaluate commands

use super::Context;
use crate::error::{CliError, CliResult};
use crate::output::{print_field, print_json, print_success, OutputFormat};
use colored::*;
use foundry_policy::Decision;
use serde_json::Value;

/// Publish every module of the local bundle
pub async fn publish(ctx: &Context, prefix: Option<String>) -> CliResult<()> {
    let bundle = ctx.load_bundle()?;
    let client = ctx.client(false, Some(bundle.version()))?;
    let prefix = prefix.or_else(|| ctx.config.engine.policy_prefix.clone());

    let ids = client.publish_bundle_async(&bundle, prefix.as_deref()).await?;
    match ctx.output {
        OutputFormat::Text => {
            print_success(&format!(
                "Published {} modules (version {})",
                ids.len(),
                bundle.version()
            ));
            for id in &ids {
                println!("  {}", id);
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "version": bundle.version(),
            "published": ids,
        }))?,
    }
    Ok(())
}

/// Evaluate a decision path
pub async fn eval(ctx: &Context, path: &str, input: &str, ensure: bool, audit: bool) -> CliResult<()> {
    let input = parse_input(input)?;
    let client = ctx.client(audit, None)?;

    let decision = if ensure {
        client.ensure_allow_async(path, &input).await?
    } else {
        client.decide_async(path, &input).await?
    };

    print_decision(path, &decision, ctx.output)
}

fn print_decision(path: &str, decision: &Decision, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(decision),
        OutputFormat::Text => {
            let verdict = if decision.allow {
                "allow".green()
            } else {
                "deny".red()
            };
            print_field("Path", path);
            print_field("Decision", verdict);
            if let Some(reason) = &decision.reason {
                print_field("Reason", reason);
            }
            Ok(())
        }
    }
}

/// Parse `--input`: inline JSON or `@path/to/file.json`
pub fn parse_input(raw: &str) -> CliResult<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| CliError::Input(format!("Cannot read input file {}: {}", path, e)))?,
        None => raw.to_string(),
    };

    let value: Value = serde_json::from_str(&text)
        .map_err(|e| CliError::Input(format!("Input is not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(CliError::Input("Input must be a JSON object".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inline_input() {
        let value = parse_input(r#"{"tenant":"blue"}"#).unwrap();
        assert_eq!(value["tenant"], "blue");
        assert!(parse_input("[1,2]").is_err());
        assert!(parse_input("not json").is_err());
    }

    #[test]
    fn test_parse_input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, r#"{"track":"netplus"}"#).unwrap();

        let value = parse_input(&format!("@{}", path.display())).unwrap();
        assert_eq!(value["track"], "netplus");
        assert!(parse_input("@/definitely/missing.json").is_err());
    }
}
