//! Policy bundles
//!
//! A [`PolicyBundle`] is an immutable, ordered set of [`PolicyModule`]s plus an
//! auxiliary JSON data map. Its version is a SHA-256 digest over the module
//! files sorted by relative path; the data map is not part of it.

mod archive;
mod discover;
mod module;

pub use archive::{BundleManifest, DATA_ENTRY, MANIFEST_ENTRY};
pub use discover::{discover_policy_modules, discover_policy_root, DEFAULT_PATTERN, POLICY_DIR_ENV};
pub use module::{load_policy_module, parse_package, policy_id_for, PolicyModule};

use crate::error::{PolicyError, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Versioned set of policy modules
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyBundle {
    modules: Vec<PolicyModule>,
    data: Map<String, Value>,
    version: String,
}

impl PolicyBundle {
    /// Build a bundle from already-loaded modules
    ///
    /// Fails when two modules declare the same package or share a relative
    /// path, since either would collide in the archive.
    pub fn from_modules(modules: Vec<PolicyModule>) -> Result<Self> {
        let mut packages = HashSet::new();
        let mut paths = HashSet::new();
        for module in &modules {
            if !packages.insert(module.package.as_str()) {
                return Err(PolicyError::Load(format!(
                    "Duplicate policy package detected: {}",
                    module.package
                )));
            }
            if !paths.insert(module.relative_path.as_str()) {
                return Err(PolicyError::Load(format!(
                    "Duplicate policy path detected: {} ({})",
                    module.relative_path,
                    module.path.display()
                )));
            }
        }

        let version = compute_version(&modules);
        Ok(Self {
            modules,
            data: Map::new(),
            version,
        })
    }

    /// Discover `*.rego` modules under every root
    pub fn from_directories<P: AsRef<Path>>(roots: &[P]) -> Result<Self> {
        Self::from_directories_with_pattern(roots, DEFAULT_PATTERN)
    }

    /// Discover modules matching `pattern` under every root
    pub fn from_directories_with_pattern<P: AsRef<Path>>(roots: &[P], pattern: &str) -> Result<Self> {
        let modules = discover_policy_modules(roots, pattern)?;
        if modules.is_empty() {
            let listed: Vec<String> = roots
                .iter()
                .map(|r| r.as_ref().display().to_string())
                .collect();
            return Err(PolicyError::Load(format!(
                "No policy modules matching '{}' found in [{}]",
                pattern,
                listed.join(", ")
            )));
        }
        Self::from_modules(modules)
    }

    /// Discover modules under a single root
    pub fn from_directory(root: impl AsRef<Path>) -> Result<Self> {
        Self::from_directories(&[root.as_ref()])
    }

    /// Return a copy of this bundle carrying `data`
    pub fn with_data(&self, data: Map<String, Value>) -> Self {
        Self {
            modules: self.modules.clone(),
            data,
            version: self.version.clone(),
        }
    }

    /// Content-addressed version
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn modules(&self) -> &[PolicyModule] {
        &self.modules
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Look up a module by package
    pub fn module(&self, package: &str) -> Option<&PolicyModule> {
        self.modules.iter().find(|m| m.package == package)
    }

    /// Package to source mapping
    pub fn module_map(&self) -> BTreeMap<String, String> {
        self.modules
            .iter()
            .map(|m| (m.package.clone(), m.source.clone()))
            .collect()
    }

    /// JSON document with every module and, when present, the data map
    pub fn to_document(&self) -> Value {
        let modules: Vec<Value> = self
            .modules
            .iter()
            .map(|m| {
                serde_json::json!({
                    "package": m.package,
                    "path": m.relative_path,
                    "source": m.source,
                })
            })
            .collect();

        let mut document = Map::new();
        document.insert("modules".to_string(), Value::Array(modules));
        if !self.data.is_empty() {
            document.insert("data".to_string(), Value::Object(self.data.clone()));
        }
        Value::Object(document)
    }

    /// Manifest describing this bundle
    pub fn manifest(&self) -> BundleManifest {
        BundleManifest::for_bundle(self)
    }
}

/// SHA-256 over `(relative path, bytes)` pairs sorted by path
///
/// Every path and every body is followed by a NUL byte.
pub fn compute_version(modules: &[PolicyModule]) -> String {
    let mut sorted: Vec<&PolicyModule> = modules.iter().collect();
    sorted.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut hasher = Sha256::new();
    for module in sorted {
        hasher.update(module.relative_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(module.source.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_version_is_stable_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "spawn.rego", "package foundry.spawn\nallow = true\n");
        write(dir.path(), "gates/train.rego", "package foundry.train\nallow = false\n");

        let first = PolicyBundle::from_directory(dir.path()).unwrap();
        let second = PolicyBundle::from_directory(dir.path()).unwrap();
        assert_eq!(first.version(), second.version());
        assert_eq!(first.version().len(), 64);

        write(dir.path(), "spawn.rego", "package foundry.spawn\nallow = True\n");
        let changed = PolicyBundle::from_directory(dir.path()).unwrap();
        assert_ne!(first.version(), changed.version());
    }

    #[test]
    fn test_data_does_not_change_version() {
        let bundle = PolicyBundle::from_modules(vec![PolicyModule::new(
            "a.b", "a.rego", "a.rego", "package a.b\n",
        )])
        .unwrap();

        let mut data = Map::new();
        data.insert("k".into(), Value::from(1));
        let with_data = bundle.with_data(data);

        assert_eq!(bundle.version(), with_data.version());
        assert!(bundle.data().is_empty());
        assert_eq!(with_data.data()["k"], 1);
    }

    #[test]
    fn test_empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "nothing here");

        let err = PolicyBundle::from_directory(dir.path()).unwrap_err();
        assert!(matches!(err, PolicyError::Load(_)));
    }

    #[test]
    fn test_from_modules_rejects_duplicates() {
        let err = PolicyBundle::from_modules(vec![
            PolicyModule::new("a.b", "x.rego", "x.rego", "package a.b\n"),
            PolicyModule::new("a.b", "y.rego", "y.rego", "package a.b\n"),
        ])
        .unwrap_err();
        assert!(matches!(err, PolicyError::Load(_)));
    }

    #[test]
    fn test_roots_sharing_a_relative_path_are_rejected() {
        let one = tempfile::tempdir().unwrap();
        let two = tempfile::tempdir().unwrap();
        write(one.path(), "main.rego", "package one.main\n");
        write(two.path(), "main.rego", "package two.main\n");

        let err = PolicyBundle::from_directories(&[one.path(), two.path()]).unwrap_err();
        assert!(matches!(err, PolicyError::Load(_)));
        assert!(err.to_string().contains("main.rego"));

        std::fs::remove_file(two.path().join("main.rego")).unwrap();
        write(two.path(), "two/main.rego", "package two.main\n");
        let bundle = PolicyBundle::from_directories(&[one.path(), two.path()]).unwrap();
        assert_eq!(bundle.manifest().files, vec!["main.rego", "two/main.rego"]);
    }

    #[test]
    fn test_path_and_body_cannot_alias() {
        let left = compute_version(&[PolicyModule::new("a", "ab", "ab", "c")]);
        let right = compute_version(&[PolicyModule::new("a", "a", "a", "bc")]);
        assert_ne!(left, right);
    }

    #[test]
    fn test_document_and_module_map() {
        let bundle = PolicyBundle::from_modules(vec![
            PolicyModule::new("foundry.spawn", "/p/spawn.rego", "spawn.rego", "package foundry.spawn\n"),
        ])
        .unwrap();

        let document = bundle.to_document();
        assert_eq!(document["modules"][0]["package"], "foundry.spawn");
        assert_eq!(document["modules"][0]["path"], "spawn.rego");
        assert!(document.get("data").is_none());

        let map = bundle.module_map();
        assert_eq!(map["foundry.spawn"], "package foundry.spawn\n");
        assert!(bundle.module("foundry.spawn").is_some());
    }

    fn modules_from(contents: &[String]) -> Vec<PolicyModule> {
        contents
            .iter()
            .enumerate()
            .map(|(i, body)| {
                let name = format!("m{}.rego", i);
                PolicyModule::new(format!("pkg.m{}", i), name.clone(), name, body.clone())
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_version_is_pure(contents in prop::collection::vec("[a-z =\n]{0,40}", 1..6)) {
            let modules = modules_from(&contents);
            let mut reversed = modules.clone();
            reversed.reverse();

            prop_assert_eq!(compute_version(&modules), compute_version(&reversed));

            let mut edited = contents.clone();
            edited[0].push('x');
            prop_assert_ne!(compute_version(&modules), compute_version(&modules_from(&edited)));
        }
    }
}
