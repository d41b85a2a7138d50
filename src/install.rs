//! Install reconciliation.
//!
//! Converges on-disk state toward the latest known release of the addon
//! loader and of each managed addon, tolerant of repeated invocation.
//!
//! The loader check is fingerprint-keyed: "already installed and current"
//! means every expected destination file exists on disk AND the persisted
//! version equals the latest tag. Anything less (or a force flag)
//! triggers delete-known-outputs-then-re-extract, which also repairs
//! installs corrupted out-of-band.

use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::catalog::CatalogEntry;
use crate::config::ConfigManager;
use crate::error::UpdateError;
use crate::progress::ProgressSink;
use crate::release::{self, ReleaseProvider};

/// Loader entry point, loaded by the game at startup.
const LOADER_SELF_FILE: &str = "addonLoader.dll";

/// Wrapper DLLs the loader installs over the game's graphics stack.
const LOADER_D3D11_FILE: &str = "d3d11.dll";
const LOADER_DXGI_FILE: &str = "dxgi.dll";

/// Subdirectory of the game root that holds managed addon folders.
const ADDONS_SUBDIR: &str = "addons";

/// Result of one reconcile pass over a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// On-disk state already matches the latest release.
    UpToDate,
    /// Files were (re-)extracted and the record now carries this tag.
    Updated(String),
    /// The feed listed no usable release; nothing to do.
    NoRelease,
}

/// Archive formats accepted for release assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detects the format from the asset filename, defaulting to zip.
    fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else {
            Self::Zip
        }
    }
}

/// Reconciler for download-backed install operations.
///
/// Holds the injected release provider and progress sink; the persisted
/// state is passed per call so a single manager instance stays the sole
/// writer.
pub struct Reconciler<'a> {
    /// Source of release metadata and artifacts.
    provider: &'a dyn ReleaseProvider,
    /// Progress receiver.
    sink: &'a dyn ProgressSink,
    /// Directory downloaded assets are staged in.
    download_dir: PathBuf,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler over a provider and sink.
    #[must_use]
    pub fn new(provider: &'a dyn ReleaseProvider, sink: &'a dyn ProgressSink) -> Self {
        Self {
            provider,
            sink,
            download_dir: default_download_dir(),
        }
    }

    /// Overrides the download staging directory.
    #[must_use]
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = dir;
        self
    }

    /// Reconciles the shared addon loader.
    ///
    /// `force` bypasses the fingerprint check and always re-extracts.
    /// The persisted version is written (and saved) only after extraction
    /// succeeds.
    pub fn reconcile_loader(
        &self,
        manager: &mut ConfigManager,
        feed_url: &str,
        force: bool,
    ) -> Result<ReconcileOutcome, UpdateError> {
        self.sink.set_label("Checking for updates to the addon loader");

        let Some(release) = self.provider.latest_release(feed_url)? else {
            debug!("Loader feed listed no release");
            return Ok(ReconcileOutcome::NoRelease);
        };

        let game_path = manager.config().game_path.clone();
        let expected = expected_loader_files(&game_path, manager.config().bin_folder.as_deref());

        if !force && loader_is_current(&expected, manager.config().loader_version.as_deref(), &release.tag) {
            debug!("Loader {} is current, all expected files present", release.tag);
            return Ok(ReconcileOutcome::UpToDate);
        }

        self.sink.set_label("Downloading the addon loader");
        fs::create_dir_all(&self.download_dir)?;
        let archive = self.download_dir.join(asset_filename(&release.asset_url));
        if archive.exists() {
            fs::remove_file(&archive)?;
        }
        self.provider
            .download_asset(&release.asset_url, &archive, self.sink)?;

        self.sink.set_label("Installing the addon loader");

        // Delete every expected output of the previous release first, so
        // files absent from the new release don't linger. Missing files
        // are not an error.
        for path in &expected {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }

        extract_archive(&archive, &game_path)?;
        let _ = fs::remove_file(&archive);

        manager.config_mut().loader_version = Some(release.tag.clone());
        manager.save()?;

        info!("Loader updated to {}", release.tag);
        Ok(ReconcileOutcome::Updated(release.tag))
    }

    /// Installs or updates one addon from its catalog entry.
    ///
    /// Downloads only when the latest tag differs from the recorded
    /// version; extraction lands in `{game_path}/addons/{folder_name}`.
    /// The record write happens after extraction succeeds, so a failed
    /// update is observably still on the old version.
    pub fn install_or_update_addon(
        &self,
        manager: &mut ConfigManager,
        entry: &CatalogEntry,
    ) -> Result<ReconcileOutcome, UpdateError> {
        assert!(!entry.folder_name.is_empty(), "Folder name must not be empty");

        let display = if entry.addon_name.is_empty() {
            &entry.folder_name
        } else {
            &entry.addon_name
        };
        self.sink
            .set_label(&format!("Checking for updates to {}", display));

        let Some(release) = self.provider.latest_release(&entry.host_url)? else {
            debug!("Feed for {} listed no release", entry.folder_name);
            return Ok(ReconcileOutcome::NoRelease);
        };

        let installed = manager.addon(&entry.folder_name).is_some_and(|r| r.installed);
        let current = manager
            .addon(&entry.folder_name)
            .map(|r| r.version.clone())
            .unwrap_or_default();

        if installed && !release::update_available(&current, &release.tag) {
            debug!("{} {} is current", entry.folder_name, current);
            return Ok(ReconcileOutcome::UpToDate);
        }

        self.sink.set_label(&format!("Downloading {}", display));
        fs::create_dir_all(&self.download_dir)?;
        let archive = self.download_dir.join(asset_filename(&release.asset_url));
        if archive.exists() {
            fs::remove_file(&archive)?;
        }
        self.provider
            .download_asset(&release.asset_url, &archive, self.sink)?;

        self.sink.set_label(&format!("Installing {}", display));
        let target = addon_dir(&manager.config().game_path, &entry.folder_name);
        fs::create_dir_all(&target)?;
        extract_archive(&archive, &target)?;
        let _ = fs::remove_file(&archive);

        let record = manager.addon_mut(&entry.folder_name);
        record.mark_installed(&release.tag);
        record
            .additional_flags
            .extend(entry.additional_flags.iter().cloned());
        manager.save()?;

        info!("{} updated to {}", entry.folder_name, release.tag);
        Ok(ReconcileOutcome::Updated(release.tag))
    }
}

/// Clears the disabled flag on an addon record.
///
/// Returns true if a record existed. Does not save; the caller persists
/// the batch.
pub fn enable_addon(manager: &mut ConfigManager, folder_name: &str) -> bool {
    match manager.config_mut().addons.get_mut(folder_name) {
        Some(record) => {
            record.disabled = false;
            true
        }
        None => false,
    }
}

/// Sets the disabled flag on an addon record, leaving files in place so
/// re-enabling is instant.
///
/// Returns true if a record existed. Does not save.
pub fn disable_addon(manager: &mut ConfigManager, folder_name: &str) -> bool {
    match manager.config_mut().addons.get_mut(folder_name) {
        Some(record) => {
            record.disabled = true;
            true
        }
        None => false,
    }
}

/// Removes an addon's files and resets its record to the uninstalled
/// state. The folder identity stays known to the catalog regardless.
///
/// Does not save; the caller persists the batch.
pub fn delete_addon(manager: &mut ConfigManager, folder_name: &str) -> Result<(), UpdateError> {
    let dir = addon_dir(&manager.config().game_path, folder_name);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
        info!("Removed addon directory {}", dir.display());
    }

    if let Some(record) = manager.config_mut().addons.get_mut(folder_name) {
        record.mark_uninstalled();
    }
    Ok(())
}

/// Returns the managed addons directory under the game root.
#[must_use]
pub fn addons_root(game_path: &Path) -> PathBuf {
    game_path.join(ADDONS_SUBDIR)
}

/// Returns the install directory for one addon.
#[must_use]
pub fn addon_dir(game_path: &Path, folder_name: &str) -> PathBuf {
    addons_root(game_path).join(folder_name)
}

/// Expected on-disk outputs of a loader install.
///
/// The wrapper DLL is probed at every location the game may load it from:
/// the install root, the client binary folder, and its embedded browser
/// subdirectory.
#[must_use]
pub fn expected_loader_files(game_path: &Path, bin_folder: Option<&str>) -> Vec<PathBuf> {
    let mut files = vec![
        game_path.join(LOADER_SELF_FILE),
        game_path.join(LOADER_D3D11_FILE),
        game_path.join(LOADER_DXGI_FILE),
    ];

    if let Some(bin) = bin_folder {
        files.push(game_path.join(bin).join(LOADER_DXGI_FILE));
        files.push(game_path.join(bin).join("cef").join(LOADER_DXGI_FILE));
    }

    files
}

/// Fingerprint check: current iff every expected file exists AND the
/// persisted version equals the latest tag.
#[must_use]
pub fn loader_is_current(expected: &[PathBuf], persisted: Option<&str>, latest: &str) -> bool {
    expected.iter().all(|p| p.exists()) && persisted == Some(latest)
}

/// Default directory for downloaded release assets.
fn default_download_dir() -> PathBuf {
    env::temp_dir().join("loadstone-downloads")
}

/// Derives a local filename from an asset URL.
fn asset_filename(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("asset.zip")
        .to_string()
}

/// Extracts a downloaded archive into a directory.
///
/// Format is chosen from the filename; zip is the default, `.tar.gz` and
/// `.tgz` go through the tar path.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    fs::create_dir_all(dest)?;

    match ArchiveFormat::from_path(archive) {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest),
    }
}

/// Extracts a zip archive entry by entry.
fn extract_zip(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| UpdateError::ExtractionFailed(format!("failed to open archive: {}", e)))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| UpdateError::ExtractionFailed(format!("failed to read entry: {}", e)))?;

        // Entries with traversal components are skipped rather than
        // written outside the destination.
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };

        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut entry, &mut outfile)?;
        }
    }

    Ok(())
}

/// Extracts a gzip-compressed tarball.
fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = File::open(archive)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);

    tar.unpack(dest)
        .map_err(|e| UpdateError::ExtractionFailed(format!("failed to unpack tarball: {}", e)))?;

    Ok(())
}
