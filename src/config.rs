//! Persisted configuration for loadstone.
//!
//! The [`UserConfig`] aggregate is the single writable source of truth for
//! installed state: game location, the loader version, and one
//! [`AddonRecord`] per managed addon folder. It is stored as JSON in
//! `~/.loadstone/config.json` and written only through
//! [`ConfigManager::save`] — mutations never auto-flush, so a batch of
//! changes persists once.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Maximum config file size (512KB).
const MAX_FILE_SIZE: u64 = 512 * 1024;

/// 64-bit client binary directory and executable name.
const BIN_FOLDER_64: &str = "bin64";
const EXE_NAME_64: &str = "Game-64.exe";

/// 32-bit client binary directory and executable name.
const BIN_FOLDER_32: &str = "bin";
const EXE_NAME_32: &str = "Game.exe";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// File too large.
    #[error("Config file too large (max {MAX_FILE_SIZE} bytes)")]
    FileTooLarge,
}

/// Persisted installation record for one addon.
///
/// `folder_name` is the stable identity shared with the catalog and the
/// on-disk layout; it never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonRecord {
    /// Addon folder name (unique key).
    pub folder_name: String,
    /// Installed version tag; empty when not installed.
    #[serde(default)]
    pub version: String,
    /// Whether the addon's files are on disk.
    #[serde(default)]
    pub installed: bool,
    /// Whether the addon is disabled (files left in place).
    #[serde(default)]
    pub disabled: bool,
    /// Extra behavior flags carried over from the catalog entry at
    /// install time (e.g. "self-updating").
    #[serde(default)]
    pub additional_flags: BTreeSet<String>,
}

impl AddonRecord {
    /// Creates an uninstalled record for the given folder.
    #[must_use]
    pub fn new(folder_name: String) -> Self {
        assert!(!folder_name.is_empty(), "Folder name must not be empty");

        Self {
            folder_name,
            version: String::new(),
            installed: false,
            disabled: false,
            additional_flags: BTreeSet::new(),
        }
    }

    /// Marks the record installed at the given version.
    pub fn mark_installed(&mut self, version: &str) {
        self.installed = true;
        self.version = version.to_string();
    }

    /// Resets the record to the uninstalled state.
    ///
    /// Clears the version and the disabled flag; an uninstalled addon has
    /// no version and nothing to disable.
    pub fn mark_uninstalled(&mut self) {
        self.installed = false;
        self.disabled = false;
        self.version.clear();
    }

    /// Returns true if the record carries the given flag.
    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.additional_flags.contains(flag)
    }
}

/// The persisted aggregate root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Game installation directory.
    #[serde(default)]
    pub game_path: PathBuf,
    /// Client binary folder relative to `game_path` ("bin64" or "bin"),
    /// unset until detected.
    #[serde(default)]
    pub bin_folder: Option<String>,
    /// Client executable name matching `bin_folder`.
    #[serde(default)]
    pub exe_name: Option<String>,
    /// Installed loader version; `None` means not installed or unknown.
    #[serde(default)]
    pub loader_version: Option<String>,
    /// Installation records keyed by addon folder name.
    #[serde(default)]
    pub addons: BTreeMap<String, AddonRecord>,
}

impl UserConfig {
    /// Probes the game directory for the client binary folder and records
    /// the matching executable name.
    ///
    /// Checks `bin64` first, then `bin`. Leaves both fields unset when
    /// neither directory exists.
    pub fn determine_system_type(&mut self) {
        for (folder, exe) in [(BIN_FOLDER_64, EXE_NAME_64), (BIN_FOLDER_32, EXE_NAME_32)] {
            if self.game_path.join(folder).is_dir() {
                self.bin_folder = Some(folder.to_string());
                self.exe_name = Some(exe.to_string());
                debug!("Detected client binary folder: {}", folder);
                return;
            }
        }
    }
}

/// Storage manager for the persisted aggregate.
///
/// Loads the whole aggregate at startup and writes it back on
/// [`save`](Self::save). Callers batch mutations and save once.
#[derive(Debug)]
pub struct ConfigManager {
    /// Path to the config file.
    path: PathBuf,
    /// In-memory aggregate.
    config: UserConfig,
}

impl ConfigManager {
    /// Creates a manager with the default path, loading existing state.
    ///
    /// Default path: `~/.loadstone/config.json`. A missing or unreadable
    /// file yields the default (empty) aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path(Self::default_path())
    }

    /// Creates a manager backed by a custom path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        assert!(!path.as_os_str().is_empty(), "path must not be empty");

        let config = Self::load_from(&path).unwrap_or_default();
        Self { path, config }
    }

    /// Returns the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".loadstone")
            .join("config.json")
    }

    /// Reads and parses the aggregate from a path.
    fn load_from(path: &Path) -> Result<UserConfig, ConfigError> {
        if !path.exists() {
            return Ok(UserConfig::default());
        }

        let meta = fs::metadata(path)?;
        if meta.len() > MAX_FILE_SIZE {
            return Err(ConfigError::FileTooLarge);
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(UserConfig::default());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Persists the whole aggregate.
    ///
    /// Creates the parent directory on first save. Callers invoke this
    /// once after a batch of mutations.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.config)?;
        fs::write(&self.path, json)?;

        debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    /// Returns the config file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the aggregate.
    #[must_use]
    pub fn config(&self) -> &UserConfig {
        &self.config
    }

    /// Returns the aggregate mutably.
    pub fn config_mut(&mut self) -> &mut UserConfig {
        &mut self.config
    }

    /// Returns the record for an addon folder, if any.
    #[must_use]
    pub fn addon(&self, folder_name: &str) -> Option<&AddonRecord> {
        self.config.addons.get(folder_name)
    }

    /// Returns the record for an addon folder, creating an uninstalled
    /// one if absent.
    pub fn addon_mut(&mut self, folder_name: &str) -> &mut AddonRecord {
        assert!(!folder_name.is_empty(), "Folder name must not be empty");

        self.config
            .addons
            .entry(folder_name.to_string())
            .or_insert_with(|| AddonRecord::new(folder_name.to_string()))
    }

    /// Inserts or replaces an addon record.
    pub fn upsert_addon(&mut self, record: AddonRecord) {
        self.config
            .addons
            .insert(record.folder_name.clone(), record);
    }

    /// Removes an addon record entirely.
    pub fn remove_addon(&mut self, folder_name: &str) {
        self.config.addons.remove(folder_name);
    }

    /// Removes every addon record. Always succeeds, even when empty.
    pub fn clear_addons(&mut self) {
        self.config.addons.clear();
    }

    /// Destructive reset: clears all addon records and the loader
    /// version. `game_path` and `bin_folder` describe the environment,
    /// not installed content, and are left untouched.
    pub fn delete_all_addons(&mut self) {
        info!("Clearing all addon records and loader version");
        self.clear_addons();
        self.config.loader_version = None;
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
