//! Loadstone
//!
//! Addon manager for the game client. Reconciles the shared addon
//! loader and each managed addon against their release feeds, stages
//! self-updates for deferred apply, and persists installation state
//! across runs.
//!
//! # Architecture
//!
//! - **release**: Release feed client (latest tag + downloadable asset)
//! - **download**: Streaming artifact download with progress reporting
//! - **install**: Install reconciliation (fingerprint check, extract,
//!   enable/disable/delete)
//! - **config**: Persisted `UserConfig` aggregate and state store
//! - **orchestrator**: Full-run sequencing (self → loader → addons)
//! - **selfupdate**: Deferred self-update staging
//! - **catalog**: Read-only addon descriptions (YAML manifests)
//! - **management**: Batch enable/disable/delete/reset operations
//!
//! # Usage
//!
//! ```no_run
//! use loadstone::{Catalog, ConfigManager, GitHubReleaseClient, NullSink,
//!     SelfUpdater, UpdateOrchestrator};
//!
//! let mut manager = ConfigManager::new();
//! let catalog = Catalog::load_dir(&Catalog::default_dir()).unwrap();
//! let client = GitHubReleaseClient::new();
//! let sink = NullSink;
//! let mut updater = SelfUpdater::new();
//!
//! let selection: Vec<_> = catalog.entries().collect();
//! let mut orchestrator = UpdateOrchestrator::new(&client, &sink);
//! orchestrator.run(&mut manager, &mut updater, &selection, false).unwrap();
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod install;
pub mod logging;
pub mod management;
pub mod orchestrator;
pub mod progress;
pub mod release;
pub mod selfupdate;

// Re-export main types
pub use catalog::{Catalog, CatalogEntry};
pub use config::{AddonRecord, ConfigManager, UserConfig};
pub use error::UpdateError;
pub use install::{ReconcileOutcome, Reconciler};
pub use orchestrator::{RunReport, RunState, UpdateOrchestrator};
pub use progress::{NullSink, ProgressSink};
pub use release::{GitHubReleaseClient, ReleaseDescriptor, ReleaseProvider};
pub use selfupdate::{SelfUpdateStatus, SelfUpdater, VERSION};
