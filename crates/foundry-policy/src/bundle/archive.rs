//! Bundle manifest and `tar.gz` packaging

use super::PolicyBundle;
use crate::error::{PolicyError, Result};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Archive entry holding the manifest
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Archive entry holding auxiliary data
pub const DATA_ENTRY: &str = "data.json";

/// Descriptive summary of a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Content-addressed bundle version
    pub version: String,

    /// When the manifest was generated (not part of the version)
    pub generated_at: DateTime<Utc>,

    /// Declared packages, sorted
    pub packages: Vec<String>,

    /// Relative module paths, sorted
    pub files: Vec<String>,
}

impl BundleManifest {
    pub(crate) fn for_bundle(bundle: &PolicyBundle) -> Self {
        let mut packages: Vec<String> = bundle.modules().iter().map(|m| m.package.clone()).collect();
        packages.sort();

        let mut files: Vec<String> = bundle
            .modules()
            .iter()
            .map(|m| m.relative_path.clone())
            .collect();
        files.sort();

        Self {
            version: bundle.version().to_string(),
            generated_at: Utc::now(),
            packages,
            files,
        }
    }
}

impl PolicyBundle {
    /// Package modules, manifest and data into a gzip-compressed tar archive
    pub fn to_archive(&self) -> Result<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut modules: Vec<_> = self.modules().iter().collect();
        modules.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        for module in modules {
            append_entry(&mut builder, &module.relative_path, module.source.as_bytes())?;
        }

        let manifest = serde_json::to_vec_pretty(&self.manifest())?;
        append_entry(&mut builder, MANIFEST_ENTRY, &manifest)?;

        if !self.data().is_empty() {
            let data = serde_json::to_vec_pretty(self.data())?;
            append_entry(&mut builder, DATA_ENTRY, &data)?;
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| PolicyError::Load(format!("Failed to finish bundle archive: {}", e)))?;
        let bytes = encoder
            .finish()
            .map_err(|e| PolicyError::Load(format!("Failed to compress bundle archive: {}", e)))?;

        Ok(bytes)
    }

    /// Archive encoded as standard base64
    pub fn to_base64(&self) -> Result<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_archive()?))
    }

    /// Write the archive to `dest`, creating parent directories
    pub fn write_archive(&self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref();
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let bytes = self.to_archive()?;
        std::fs::write(dest, &bytes)?;

        info!(
            path = %dest.display(),
            version = %self.version(),
            bytes = bytes.len(),
            "Wrote policy bundle archive"
        );
        Ok(())
    }
}

fn append_entry<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    contents: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    builder
        .append_data(&mut header, name, contents)
        .map_err(|e| PolicyError::Load(format!("Failed to add {} to bundle archive: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::PolicyModule;
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use std::io::Read;

    fn bundle() -> PolicyBundle {
        PolicyBundle::from_modules(vec![
            PolicyModule::new("foundry.spawn", "/p/spawn.rego", "spawn.rego", "package foundry.spawn\n"),
            PolicyModule::new(
                "foundry.training_gate",
                "/p/gates/training.rego",
                "gates/training.rego",
                "package foundry.training_gate\n",
            ),
        ])
        .unwrap()
    }

    fn unpack(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut entries = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            entries.insert(name, contents);
        }
        entries
    }

    #[test]
    fn test_manifest_is_sorted() {
        let manifest = bundle().manifest();
        assert_eq!(manifest.packages, vec!["foundry.spawn", "foundry.training_gate"]);
        assert_eq!(manifest.files, vec!["gates/training.rego", "spawn.rego"]);
        assert_eq!(manifest.version, bundle().version());
    }

    #[test]
    fn test_archive_contains_modules_and_manifest() {
        let bundle = bundle();
        let entries = unpack(&bundle.to_archive().unwrap());

        assert_eq!(entries["spawn.rego"], b"package foundry.spawn\n");
        assert!(entries.contains_key("gates/training.rego"));
        assert!(!entries.contains_key(DATA_ENTRY));

        let manifest: BundleManifest = serde_json::from_slice(&entries[MANIFEST_ENTRY]).unwrap();
        assert_eq!(manifest.version, bundle.version());
    }

    #[test]
    fn test_archive_includes_data_when_present() {
        let mut data = serde_json::Map::new();
        data.insert("tracks".into(), serde_json::json!(["netplus"]));
        let bundle = bundle().with_data(data);

        let entries = unpack(&bundle.to_archive().unwrap());
        let data: serde_json::Value = serde_json::from_slice(&entries[DATA_ENTRY]).unwrap();
        assert_eq!(data["tracks"][0], "netplus");
    }

    #[test]
    fn test_base64_decodes_to_archive() {
        let encoded = bundle().to_base64().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert!(unpack(&decoded).contains_key(MANIFEST_ENTRY));
    }

    #[test]
    fn test_write_archive_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out/nested/bundle.tar.gz");
        bundle().write_archive(&dest).unwrap();

        let bytes = std::fs::read(&dest).unwrap();
        assert!(unpack(&bytes).contains_key("spawn.rego"));
    }
}
