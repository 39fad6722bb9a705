//! Policy modules and package declarations
//!
//! A package declaration is recognised by a one-line grammar:
//!
//! ```text
//! declaration := ws* "package" ws+ path rest
//! path        := (alphanumeric | "_" | "." | "/")+
//! ```
//!
//! The first line of a module matching `declaration` wins; `rest` is ignored.

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PACKAGE_KEYWORD: &str = "package";

/// A single policy source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyModule {
    /// Dotted package identifier declared by the module
    pub package: String,

    /// Filesystem path the module was read from
    pub path: PathBuf,

    /// Path relative to the discovery root, `/`-separated
    pub relative_path: String,

    /// Raw policy source
    pub source: String,
}

impl PolicyModule {
    pub fn new(
        package: impl Into<String>,
        path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            path: path.into(),
            relative_path: relative_path.into(),
            source: source.into(),
        }
    }

    /// Identifier used for `/v1/policies/{id}`
    ///
    /// `foundry.training_gate` with prefix `/bundles/` becomes
    /// `bundles/foundry/training_gate`.
    pub fn policy_id(&self, prefix: Option<&str>) -> String {
        policy_id_for(&self.package, prefix)
    }
}

/// Map a package to a slash-separated policy id
pub fn policy_id_for(package: &str, prefix: Option<&str>) -> String {
    let dotted = package.replace('/', ".").replace("..", ".");
    let id = dotted.replace('.', "/");

    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, id),
        None => id,
    }
}

/// Extract the package declared by a policy source
pub fn parse_package(source: &str) -> Option<&str> {
    source.lines().find_map(parse_declaration_line)
}

fn parse_declaration_line(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix(PACKAGE_KEYWORD)?;

    let path_start = rest.trim_start();
    if path_start.len() == rest.len() {
        // keyword must be followed by whitespace ("packages" is not a declaration)
        return None;
    }

    let end = path_start
        .char_indices()
        .find(|(_, c)| !is_path_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(path_start.len());

    if end == 0 {
        None
    } else {
        Some(&path_start[..end])
    }
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '/'
}

/// Read a policy file and decode it as UTF-8
pub(crate) fn read_source(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| {
        PolicyError::Load(format!("Failed to read policy file {}: {}", path.display(), e))
    })?;

    String::from_utf8(bytes).map_err(|_| {
        PolicyError::Load(format!("Policy file is not valid UTF-8: {}", path.display()))
    })
}

/// Load a single module, falling back to the file stem as package
pub fn load_policy_module(path: impl AsRef<Path>) -> Result<PolicyModule> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PolicyError::Load(format!(
            "Policy file not found: {}",
            path.display()
        )));
    }

    let source = read_source(path)?;
    let package = match parse_package(&source) {
        Some(package) => package.to_string(),
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                PolicyError::Load(format!(
                    "Unable to determine package for policy file {}",
                    path.display()
                ))
            })?,
    };

    let relative_path = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(PolicyModule {
        package,
        path: path.to_path_buf(),
        relative_path,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_declaration() {
        assert_eq!(parse_package("package demo.example\nallow = true\n"), Some("demo.example"));
        assert_eq!(
            parse_package("# header\n\n   package foundry.training_gate  # trailing\n"),
            Some("foundry.training_gate")
        );
        assert_eq!(parse_package("package\tfoundry/runtime\n"), Some("foundry/runtime"));
    }

    #[test]
    fn test_parse_package_rejects_non_declarations() {
        assert_eq!(parse_package("default allow = false\n"), None);
        assert_eq!(parse_package("packages foo.bar\n"), None);
        assert_eq!(parse_package("package \n"), None);
        assert_eq!(parse_package("package {\n"), None);
        assert_eq!(parse_package(""), None);
    }

    #[test]
    fn test_first_declaration_wins() {
        let source = "package first.pkg\npackage second.pkg\n";
        assert_eq!(parse_package(source), Some("first.pkg"));
    }

    #[test]
    fn test_policy_id() {
        let module = PolicyModule::new("foundry.training_gate", "a.rego", "a.rego", "");
        assert_eq!(module.policy_id(None), "foundry/training_gate");
        assert_eq!(module.policy_id(Some("/bundles/")), "bundles/foundry/training_gate");
        assert_eq!(module.policy_id(Some("")), "foundry/training_gate");

        assert_eq!(policy_id_for("foundry/spawn", None), "foundry/spawn");
        assert_eq!(policy_id_for("foundry..spawn", None), "foundry/spawn");
    }

    #[test]
    fn test_load_policy_module_extracts_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.rego");
        std::fs::write(&path, "package demo.example\nallow = true\n").unwrap();

        let module = load_policy_module(&path).unwrap();
        assert_eq!(module.package, "demo.example");
        assert_eq!(module.path, path);
        assert_eq!(module.relative_path, "example.rego");
        assert!(module.source.contains("allow = true"));
    }

    #[test]
    fn test_load_policy_module_without_package_uses_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fallback.rego");
        std::fs::write(&path, "default allow = false\n").unwrap();

        let module = load_policy_module(&path).unwrap();
        assert_eq!(module.package, "fallback");
    }

    #[test]
    fn test_load_missing_module_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_policy_module(dir.path().join("missing.rego")).unwrap_err();
        assert!(matches!(err, PolicyError::Load(_)));
    }
}
