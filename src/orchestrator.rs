//! Update orchestration.
//!
//! Sequences one full update run: self-update check, loader
//! reconciliation, then each selected addon in order. One run per
//! invocation; downloads are sequential; the first fatal error aborts the
//! whole batch and earlier successful steps are kept as-is.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::catalog::CatalogEntry;
use crate::config::ConfigManager;
use crate::error::UpdateError;
use crate::install::{ReconcileOutcome, Reconciler};
use crate::progress::ProgressSink;
use crate::release::ReleaseProvider;
use crate::selfupdate::{SelfUpdateStatus, SelfUpdater};

/// Release feed for the shared addon loader.
const LOADER_FEED_URL: &str =
    "https://api.github.com/repos/hastur-dev/loadstone-loader/releases/latest";

/// Label reported when a run finishes cleanly.
const COMPLETE_LABEL: &str = "Updates Complete";

/// Phase of an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run started yet.
    Idle,
    /// Checking the application's own release feed.
    CheckingSelf,
    /// Reconciling the shared addon loader.
    CheckingLoader,
    /// Reconciling the addon at this index of the selection.
    UpdatingAddons(usize),
    /// Terminal: the run finished cleanly.
    Completed,
    /// Terminal: a fatal error stopped the run.
    Aborted,
}

impl RunState {
    /// Returns true if the run has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// Per-addon result within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonOutcome {
    /// The generic reconcile ran to completion.
    Reconciled(ReconcileOutcome),
    /// Skipped: the addon manages its own updates and is already
    /// installed.
    SkippedSelfUpdating,
}

/// Aggregated result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Outcome of the self-update check.
    pub self_update: SelfUpdateStatus,
    /// Outcome of the loader reconcile.
    pub loader: ReconcileOutcome,
    /// Outcome per selected addon, in selection order.
    pub addons: Vec<(String, AddonOutcome)>,
}

/// Sequences a full update run.
///
/// The progress sink and release provider are injected at construction.
/// Callers must not start a second run while one is in progress.
pub struct UpdateOrchestrator<'a> {
    /// Source of release metadata and artifacts.
    provider: &'a dyn ReleaseProvider,
    /// Progress receiver.
    sink: &'a dyn ProgressSink,
    /// Loader release feed.
    loader_feed_url: String,
    /// Download staging override for the reconciler.
    download_dir: Option<PathBuf>,
    /// Current phase.
    state: RunState,
}

impl<'a> UpdateOrchestrator<'a> {
    /// Creates an orchestrator over a provider and sink.
    #[must_use]
    pub fn new(provider: &'a dyn ReleaseProvider, sink: &'a dyn ProgressSink) -> Self {
        Self {
            provider,
            sink,
            loader_feed_url: LOADER_FEED_URL.to_string(),
            download_dir: None,
            state: RunState::Idle,
        }
    }

    /// Overrides the loader feed URL.
    #[must_use]
    pub fn with_loader_feed(mut self, url: String) -> Self {
        assert!(!url.is_empty(), "Feed URL must not be empty");
        self.loader_feed_url = url;
        self
    }

    /// Overrides the reconciler's download staging directory.
    #[must_use]
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = Some(dir);
        self
    }

    /// Returns the current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs one full update pass.
    ///
    /// `selection` is processed in the order supplied. `force_loader`
    /// bypasses the loader fingerprint check. On success the sink is left
    /// at 100% with a terminal label; after that the caller may safely
    /// invoke the deferred self-update at shutdown (`updater.pending()`).
    pub fn run(
        &mut self,
        manager: &mut ConfigManager,
        updater: &mut SelfUpdater,
        selection: &[&CatalogEntry],
        force_loader: bool,
    ) -> Result<RunReport, UpdateError> {
        match self.run_inner(manager, updater, selection, force_loader) {
            Ok(report) => {
                self.state = RunState::Completed;
                self.sink.set_label(COMPLETE_LABEL);
                self.sink.set_progress(100);
                self.sink.set_complete(true);
                Ok(report)
            }
            Err(e) => {
                self.state = RunState::Aborted;
                warn!("Update run aborted: {}", e);
                self.sink.set_label(&format!("Update failed: {}", e));
                self.sink.set_complete(true);
                Err(e)
            }
        }
    }

    fn run_inner(
        &mut self,
        manager: &mut ConfigManager,
        updater: &mut SelfUpdater,
        selection: &[&CatalogEntry],
        force_loader: bool,
    ) -> Result<RunReport, UpdateError> {
        self.state = RunState::CheckingSelf;
        debug!("Run state: {:?}", self.state);
        let self_update = updater.check_and_stage(self.provider, self.sink)?;
        if let SelfUpdateStatus::Staged { ref tag } = self_update {
            info!("Self-update {} staged for deferred apply", tag);
        }

        self.state = RunState::CheckingLoader;
        debug!("Run state: {:?}", self.state);
        let mut reconciler = Reconciler::new(self.provider, self.sink);
        if let Some(ref dir) = self.download_dir {
            reconciler = reconciler.with_download_dir(dir.clone());
        }
        let loader = reconciler.reconcile_loader(manager, &self.loader_feed_url, force_loader)?;

        let mut addons = Vec::with_capacity(selection.len());
        for (i, entry) in selection.iter().enumerate() {
            self.state = RunState::UpdatingAddons(i);
            debug!("Run state: {:?} ({})", self.state, entry.folder_name);

            let already_installed = manager
                .addon(&entry.folder_name)
                .is_some_and(|r| r.installed);

            // Self-updating addons manage their own releases once they
            // exist on disk.
            if entry.is_self_updating() && already_installed {
                debug!("Skipping self-updating addon {}", entry.folder_name);
                addons.push((entry.folder_name.clone(), AddonOutcome::SkippedSelfUpdating));
                continue;
            }

            let outcome = reconciler.install_or_update_addon(manager, entry)?;
            addons.push((entry.folder_name.clone(), AddonOutcome::Reconciled(outcome)));
        }

        Ok(RunReport {
            self_update,
            loader,
            addons,
        })
    }
}
