//! Recursive discovery of policy sources

use super::module::{parse_package, read_source, PolicyModule};
use crate::error::{PolicyError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Default glob for policy source files
pub const DEFAULT_PATTERN: &str = "*.rego";

/// Environment variable overriding the policy directory
pub const POLICY_DIR_ENV: &str = "POLICY_DIR";

/// Discover and load every policy module under `roots`
///
/// Files are visited in path order within each root and roots in the order
/// given. Every module must declare a package, and packages must be unique
/// across all roots.
pub fn discover_policy_modules<P: AsRef<Path>>(
    roots: &[P],
    pattern: &str,
) -> Result<Vec<PolicyModule>> {
    let matcher = glob::Pattern::new(pattern)
        .map_err(|e| PolicyError::Load(format!("Invalid policy pattern '{}': {}", pattern, e)))?;

    let roots: Vec<PathBuf> = if roots.is_empty() {
        vec![std::env::current_dir()?]
    } else {
        roots.iter().map(|r| r.as_ref().to_path_buf()).collect()
    };

    let mut modules = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for root in &roots {
        for path in matching_files(root, &matcher)? {
            let source = read_source(&path)?;
            let package = parse_package(&source)
                .ok_or_else(|| {
                    PolicyError::Load(format!(
                        "Unable to find package declaration in {}",
                        path.display()
                    ))
                })?
                .to_string();

            if let Some(previous) = seen.get(&package) {
                return Err(PolicyError::Load(format!(
                    "Duplicate policy package detected: {} ({} and {})",
                    package,
                    previous.display(),
                    path.display()
                )));
            }
            seen.insert(package.clone(), path.clone());

            debug!(package = %package, path = %path.display(), "Discovered policy module");
            modules.push(PolicyModule {
                package,
                relative_path: relative_path(root, &path),
                path,
                source,
            });
        }
    }

    Ok(modules)
}

fn matching_files(root: &Path, matcher: &glob::Pattern) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(PolicyError::Load(format!(
            "Policy directory '{}' does not exist",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            PolicyError::Load(format!("Failed to scan {}: {}", root.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| matcher.matches(name))
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve the policy directory, honouring `POLICY_DIR`
pub fn discover_policy_root(configured: &[PathBuf]) -> Vec<PathBuf> {
    match std::env::var(POLICY_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => vec![PathBuf::from(dir)],
        _ => configured.to_vec(),
    }
}
