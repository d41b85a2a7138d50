//! Application self-update.
//!
//! The running process cannot replace its own binary in place, so a new
//! release is staged on disk and a pending flag (process-lifetime only,
//! never persisted) tells shutdown to spawn the external updater
//! executable, which applies the package after this process exits.

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::error::UpdateError;
use crate::progress::ProgressSink;
use crate::release::{self, ReleaseProvider};

/// Current version of loadstone.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Release feed for the application itself.
const APP_FEED_URL: &str =
    "https://api.github.com/repos/hastur-dev/loadstone/releases/latest";

/// Staging folder name under the data directory.
const STAGING_DIR: &str = "latest-release";

/// Staged package filename.
const PACKAGE_NAME: &str = "update.zip";

/// External updater executable spawned at shutdown.
#[cfg(windows)]
const UPDATER_EXE: &str = "loadstone-updater.exe";
#[cfg(not(windows))]
const UPDATER_EXE: &str = "loadstone-updater";

/// Result of a self-update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateStatus {
    /// Running the latest version; `latest` falls back to the current
    /// version when the feed listed no release.
    UpToDate { latest: String },
    /// A new release was downloaded into the staging folder.
    Staged { tag: String },
    /// Checks are disabled (environment override or dev build).
    Disabled,
}

/// Stages application updates for deferred apply.
pub struct SelfUpdater {
    /// Whether self-update checks are enabled.
    enabled: bool,
    /// Whether running from a cargo target directory.
    is_dev_mode: bool,
    /// Release feed URL.
    feed_url: String,
    /// Folder the update package is staged into.
    staging_dir: PathBuf,
    /// Version of the running binary.
    current_version: String,
    /// Set once a package has been staged this process.
    pending: bool,
}

impl SelfUpdater {
    /// Creates a self-updater with the default feed and staging folder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: env::var("LOADSTONE_NO_SELFUPDATE").is_err(),
            is_dev_mode: Self::detect_dev_mode(),
            feed_url: APP_FEED_URL.to_string(),
            staging_dir: Self::default_staging_dir(),
            current_version: VERSION.to_string(),
            pending: false,
        }
    }

    /// Overrides the feed URL.
    #[must_use]
    pub fn with_feed_url(mut self, url: String) -> Self {
        assert!(!url.is_empty(), "Feed URL must not be empty");
        self.feed_url = url;
        self
    }

    /// Overrides the staging folder.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: PathBuf) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Overrides the version treated as currently running.
    #[must_use]
    pub fn with_current_version(mut self, version: String) -> Self {
        self.current_version = version;
        self
    }

    /// Returns the default staging folder (`~/.loadstone/latest-release/`).
    #[must_use]
    pub fn default_staging_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".loadstone")
            .join(STAGING_DIR)
    }

    /// Detects if running from a cargo target directory (dev mode).
    fn detect_dev_mode() -> bool {
        if let Ok(exe_path) = env::current_exe() {
            let path_str = exe_path.to_string_lossy();
            path_str.contains("target\\debug")
                || path_str.contains("target/debug")
                || path_str.contains("target\\release")
                || path_str.contains("target/release")
        } else {
            false
        }
    }

    /// Returns true if a staged package awaits the deferred apply.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.pending
    }

    /// Returns the path the package is staged at.
    #[must_use]
    pub fn package_path(&self) -> PathBuf {
        self.staging_dir.join(PACKAGE_NAME)
    }

    /// Checks the application feed and stages a new release if one
    /// exists.
    ///
    /// The staging folder is wiped before each download, so a stale
    /// package from an earlier run never survives. Does not block the
    /// caller's remaining work; the package is applied only at shutdown.
    pub fn check_and_stage(
        &mut self,
        provider: &dyn ReleaseProvider,
        sink: &dyn ProgressSink,
    ) -> Result<SelfUpdateStatus, UpdateError> {
        if !self.enabled || self.is_dev_mode {
            debug!("Self-update check skipped (disabled or dev build)");
            return Ok(SelfUpdateStatus::Disabled);
        }

        sink.set_label("Checking for updates to loadstone");

        let release = provider.latest_release(&self.feed_url)?;
        let latest = release::reported_latest(&self.current_version, release.as_ref()).to_string();

        let Some(release) = release else {
            return Ok(SelfUpdateStatus::UpToDate { latest });
        };

        if !release::update_available(&self.current_version, &release.tag) {
            return Ok(SelfUpdateStatus::UpToDate { latest });
        }

        sink.set_label(&format!("Downloading loadstone {}", release.tag));

        if self.staging_dir.exists() {
            fs::remove_dir_all(&self.staging_dir)?;
        }
        fs::create_dir_all(&self.staging_dir)?;

        provider.download_asset(&release.asset_url, &self.package_path(), sink)?;

        self.pending = true;
        info!("Staged self-update {} at {}", release.tag, self.package_path().display());
        Ok(SelfUpdateStatus::Staged { tag: release.tag })
    }

    /// Spawns the external updater next to the current executable.
    ///
    /// Call only at shutdown, after the run has completed; the updater
    /// replaces the binary once this process exits. Returns true if a
    /// pending package caused the updater to be spawned.
    pub fn launch_updater(&self) -> io::Result<bool> {
        if !self.pending {
            return Ok(false);
        }

        let exe_dir = env::current_exe()?
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let updater = exe_dir.join(UPDATER_EXE);
        Command::new(&updater).spawn()?;

        info!("Spawned updater {}", updater.display());
        Ok(true)
    }
}

impl Default for SelfUpdater {
    fn default() -> Self {
        Self::new()
    }
}
