//! Integration tests for install reconciliation.
//!
//! Drive the reconciler against a stub release provider serving archives
//! from memory, and observe on-disk and persisted state.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use loadstone::catalog::CatalogEntry;
use loadstone::config::ConfigManager;
use loadstone::error::UpdateError;
use loadstone::install::{self, ReconcileOutcome, Reconciler};
use loadstone::progress::{NullSink, ProgressSink};
use loadstone::release::{ReleaseDescriptor, ReleaseProvider};
use tempfile::tempdir;

/// Provider serving canned releases; downloaded assets are zip archives
/// with the given entries (or deliberately corrupt bytes).
struct StubProvider {
    releases: HashMap<String, ReleaseDescriptor>,
    entries: Vec<(String, String)>,
    corrupt: bool,
    downloads: AtomicUsize,
}

impl StubProvider {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            releases: HashMap::new(),
            entries: entries
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect(),
            corrupt: false,
            downloads: AtomicUsize::new(0),
        }
    }

    fn corrupt(entries: &[(&str, &str)]) -> Self {
        let mut provider = Self::new(entries);
        provider.corrupt = true;
        provider
    }

    fn with_release(mut self, feed: &str, tag: &str) -> Self {
        self.releases.insert(
            feed.to_string(),
            ReleaseDescriptor {
                tag: tag.to_string(),
                asset_url: format!("{}/release-{}.zip", feed, tag),
            },
        );
        self
    }

    fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl ReleaseProvider for StubProvider {
    fn latest_release(&self, feed_url: &str) -> Result<Option<ReleaseDescriptor>, UpdateError> {
        Ok(self.releases.get(feed_url).cloned())
    }

    fn download_asset(
        &self,
        _url: &str,
        dest: &Path,
        _sink: &dyn ProgressSink,
    ) -> Result<(), UpdateError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        if self.corrupt {
            fs::write(dest, b"garbage that is not an archive").unwrap();
            return Ok(());
        }

        let file = File::create(dest).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in &self.entries {
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        Ok(())
    }
}

fn manager_with_game(dir: &Path) -> ConfigManager {
    let mut manager = ConfigManager::with_path(dir.join("config.json"));
    manager.config_mut().game_path = dir.join("game");
    fs::create_dir_all(dir.join("game")).unwrap();
    manager
}

fn meter_entry() -> CatalogEntry {
    CatalogEntry {
        folder_name: "dps-meter".to_string(),
        addon_name: "DPS Meter".to_string(),
        host_url: "meter-feed".to_string(),
        ..CatalogEntry::default()
    }
}

#[test]
fn addon_install_then_reconcile_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut manager = manager_with_game(dir.path());
    let provider =
        StubProvider::new(&[("meter.dll", "payload")]).with_release("meter-feed", "v.1.1");
    let reconciler = Reconciler::new(&provider, &NullSink)
        .with_download_dir(dir.path().join("downloads"));
    let entry = meter_entry();

    let outcome = reconciler
        .install_or_update_addon(&mut manager, &entry)
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Updated("v.1.1".to_string()));

    let installed = install::addon_dir(&manager.config().game_path, "dps-meter");
    assert_eq!(
        fs::read_to_string(installed.join("meter.dll")).unwrap(),
        "payload"
    );

    // A file the user placed in the addon folder witnesses that a
    // second reconcile does not touch the directory.
    fs::write(installed.join("user-settings.ini"), b"keep me").unwrap();

    let outcome = reconciler
        .install_or_update_addon(&mut manager, &entry)
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::UpToDate);
    assert_eq!(provider.download_count(), 1);
    assert!(installed.join("user-settings.ini").exists());
    assert_eq!(manager.addon("dps-meter").unwrap().version, "v.1.1");
}

#[test]
fn addon_updates_when_version_differs() {
    let dir = tempdir().unwrap();
    let mut manager = manager_with_game(dir.path());
    manager.addon_mut("dps-meter").mark_installed("v.1.0");

    let provider =
        StubProvider::new(&[("meter.dll", "new payload")]).with_release("meter-feed", "v.1.1");
    let reconciler = Reconciler::new(&provider, &NullSink)
        .with_download_dir(dir.path().join("downloads"));

    let outcome = reconciler
        .install_or_update_addon(&mut manager, &meter_entry())
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated("v.1.1".to_string()));
    assert_eq!(manager.addon("dps-meter").unwrap().version, "v.1.1");
}

#[test]
fn addon_feed_without_release_means_nothing_to_do() {
    let dir = tempdir().unwrap();
    let mut manager = manager_with_game(dir.path());
    manager.addon_mut("dps-meter").mark_installed("v.1.0");

    let provider = StubProvider::new(&[]);
    let reconciler = Reconciler::new(&provider, &NullSink)
        .with_download_dir(dir.path().join("downloads"));

    let outcome = reconciler
        .install_or_update_addon(&mut manager, &meter_entry())
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::NoRelease);
    assert_eq!(provider.download_count(), 0);
    assert_eq!(manager.addon("dps-meter").unwrap().version, "v.1.0");
}

#[test]
fn loader_reconcile_installs_and_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut manager = manager_with_game(dir.path());

    let provider = StubProvider::new(&[
        ("addonLoader.dll", "loader"),
        ("d3d11.dll", "d3d11"),
        ("dxgi.dll", "dxgi"),
    ])
    .with_release("loader-feed", "v2.0");
    let reconciler = Reconciler::new(&provider, &NullSink)
        .with_download_dir(dir.path().join("downloads"));

    let outcome = reconciler
        .reconcile_loader(&mut manager, "loader-feed", false)
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Updated("v2.0".to_string()));
    assert_eq!(manager.config().loader_version, Some("v2.0".to_string()));

    let game = manager.config().game_path.clone();
    assert!(game.join("addonLoader.dll").exists());

    // Same release, all files present: the fingerprint matches and
    // nothing is downloaded again.
    let outcome = reconciler
        .reconcile_loader(&mut manager, "loader-feed", false)
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::UpToDate);
    assert_eq!(provider.download_count(), 1);
}

#[test]
fn loader_reextracts_when_expected_file_deleted_externally() {
    let dir = tempdir().unwrap();
    let mut manager = manager_with_game(dir.path());

    let provider = StubProvider::new(&[
        ("addonLoader.dll", "loader"),
        ("d3d11.dll", "d3d11"),
        ("dxgi.dll", "dxgi"),
    ])
    .with_release("loader-feed", "v2.0");
    let reconciler = Reconciler::new(&provider, &NullSink)
        .with_download_dir(dir.path().join("downloads"));

    reconciler
        .reconcile_loader(&mut manager, "loader-feed", false)
        .unwrap();

    // Simulate out-of-band corruption: one expected file vanishes while
    // the persisted version still matches the latest tag.
    let game = manager.config().game_path.clone();
    fs::remove_file(game.join("d3d11.dll")).unwrap();

    let outcome = reconciler
        .reconcile_loader(&mut manager, "loader-feed", false)
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Updated("v2.0".to_string()));
    assert_eq!(provider.download_count(), 2);
    assert!(game.join("d3d11.dll").exists());
}

#[test]
fn loader_force_flag_bypasses_fingerprint() {
    let dir = tempdir().unwrap();
    let mut manager = manager_with_game(dir.path());

    let provider = StubProvider::new(&[
        ("addonLoader.dll", "loader"),
        ("d3d11.dll", "d3d11"),
        ("dxgi.dll", "dxgi"),
    ])
    .with_release("loader-feed", "v2.0");
    let reconciler = Reconciler::new(&provider, &NullSink)
        .with_download_dir(dir.path().join("downloads"));

    reconciler
        .reconcile_loader(&mut manager, "loader-feed", false)
        .unwrap();
    let outcome = reconciler
        .reconcile_loader(&mut manager, "loader-feed", true)
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated("v2.0".to_string()));
    assert_eq!(provider.download_count(), 2);
}

#[test]
fn extraction_failure_leaves_persisted_version_unchanged() {
    let dir = tempdir().unwrap();
    let mut manager = manager_with_game(dir.path());
    manager.config_mut().loader_version = Some("v1.0".to_string());
    manager.save().unwrap();

    let provider = StubProvider::corrupt(&[]).with_release("loader-feed", "v2.0");
    let reconciler = Reconciler::new(&provider, &NullSink)
        .with_download_dir(dir.path().join("downloads"));

    let err = reconciler
        .reconcile_loader(&mut manager, "loader-feed", false)
        .unwrap_err();
    assert!(matches!(err, UpdateError::ExtractionFailed(_)));

    // No partial version bump, in memory or on disk.
    assert_eq!(manager.config().loader_version, Some("v1.0".to_string()));
    let reloaded = ConfigManager::with_path(dir.path().join("config.json"));
    assert_eq!(reloaded.config().loader_version, Some("v1.0".to_string()));
}

#[test]
fn addon_extraction_failure_keeps_old_version() {
    let dir = tempdir().unwrap();
    let mut manager = manager_with_game(dir.path());
    manager.addon_mut("dps-meter").mark_installed("v.1.0");
    manager.save().unwrap();

    let provider = StubProvider::corrupt(&[]).with_release("meter-feed", "v.1.1");
    let reconciler = Reconciler::new(&provider, &NullSink)
        .with_download_dir(dir.path().join("downloads"));

    let err = reconciler
        .install_or_update_addon(&mut manager, &meter_entry())
        .unwrap_err();
    assert!(matches!(err, UpdateError::ExtractionFailed(_)));
    assert_eq!(manager.addon("dps-meter").unwrap().version, "v.1.0");
}
