//! Addon catalog.
//!
//! Read-only reference data describing the addons that *could* be
//! installed: display metadata plus the release feed each one updates
//! from. Entries are YAML manifests, one file per addon folder name, in a
//! catalog directory. The engine never mutates the catalog.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

/// Flag marking an addon that manages its own updates once installed.
pub const SELF_UPDATING_FLAG: &str = "self-updating";

/// Catalog manifest for one addon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    /// Stable folder identity; filled from the manifest filename.
    #[serde(default)]
    pub folder_name: String,
    /// Human-readable addon name.
    #[serde(default)]
    pub addon_name: String,
    /// Short description shown to the user.
    #[serde(default)]
    pub description: String,
    /// Addon developer.
    #[serde(default)]
    pub developer: String,
    /// Project website.
    #[serde(default)]
    pub website: String,
    /// Release feed queried for updates.
    #[serde(default)]
    pub host_url: String,
    /// Behavior flags (e.g. "self-updating").
    #[serde(default)]
    pub additional_flags: Vec<String>,
}

impl CatalogEntry {
    /// Returns true if the entry carries the given flag.
    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.additional_flags.iter().any(|f| f == flag)
    }

    /// Returns true if the addon manages its own updates once installed.
    #[must_use]
    pub fn is_self_updating(&self) -> bool {
        self.has_flag(SELF_UPDATING_FLAG)
    }
}

/// Catalog of known addons, keyed by folder name.
#[derive(Debug, Default)]
pub struct Catalog {
    /// Entries keyed by folder name.
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the default catalog directory (`~/.loadstone/catalog/`).
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".loadstone")
            .join("catalog")
    }

    /// Loads every `*.yaml` manifest in a directory.
    ///
    /// Individual manifests that fail to parse are skipped with a
    /// warning; a missing directory yields an empty catalog.
    pub fn load_dir(dir: &Path) -> io::Result<Self> {
        let mut catalog = Self::new();

        if !dir.exists() {
            debug!("Catalog directory {} does not exist", dir.display());
            return Ok(catalog);
        }

        for entry in fs::read_dir(dir)?.filter_map(Result::ok) {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if !is_yaml {
                continue;
            }

            let Some(folder_name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match Self::load_manifest(&path, folder_name) {
                Ok(manifest) => {
                    debug!("Loaded catalog entry: {}", folder_name);
                    catalog.entries.insert(folder_name.to_string(), manifest);
                }
                Err(e) => {
                    warn!("Skipping catalog manifest {}: {}", path.display(), e);
                }
            }
        }

        Ok(catalog)
    }

    /// Parses a single manifest file.
    fn load_manifest(path: &Path, folder_name: &str) -> Result<CatalogEntry, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        let mut manifest: CatalogEntry =
            serde_yaml::from_str(&content).map_err(|e| e.to_string())?;
        manifest.folder_name = folder_name.to_string();
        Ok(manifest)
    }

    /// Inserts an entry directly.
    pub fn insert(&mut self, entry: CatalogEntry) {
        assert!(
            !entry.folder_name.is_empty(),
            "Folder name must not be empty"
        );
        self.entries.insert(entry.folder_name.clone(), entry);
    }

    /// Returns the entry for an addon folder, if known.
    #[must_use]
    pub fn describe(&self, folder_name: &str) -> Option<&CatalogEntry> {
        self.entries.get(folder_name)
    }

    /// Returns all entries in folder-name order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Returns the number of known addons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_dir_reads_manifests() {
        let dir = tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("dps-meter.yaml")).unwrap();
        writeln!(file, "addon_name: DPS Meter").unwrap();
        writeln!(file, "description: Combat statistics overlay").unwrap();
        writeln!(file, "developer: example-dev").unwrap();
        writeln!(file, "website: https://example.invalid/dps").unwrap();
        writeln!(file, "host_url: https://example.invalid/feed").unwrap();
        writeln!(file, "additional_flags:").unwrap();
        writeln!(file, "  - self-updating").unwrap();

        let catalog = Catalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);

        let entry = catalog.describe("dps-meter").unwrap();
        assert_eq!(entry.folder_name, "dps-meter");
        assert_eq!(entry.addon_name, "DPS Meter");
        assert!(entry.is_self_updating());
    }

    #[test]
    fn test_load_dir_skips_bad_manifest() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.yaml"), ": not [ valid yaml").unwrap();
        fs::write(dir.path().join("ok.yaml"), "addon_name: Ok Addon").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = Catalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.describe("ok").is_some());
        assert!(catalog.describe("broken").is_none());
    }

    #[test]
    fn test_missing_dir_yields_empty_catalog() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::load_dir(&dir.path().join("nope")).unwrap();
        assert!(catalog.is_empty());
    }
}
