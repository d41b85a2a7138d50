//! Batch addon management.
//!
//! Enable/disable/delete over a user selection, force-redownload, and the
//! destructive full reset. Each batch persists the aggregate exactly
//! once; enabling five addons saves once, not five times.

use std::fs;

use tracing::{info, warn};

use crate::config::{ConfigError, ConfigManager};
use crate::error::UpdateError;
use crate::install;

/// Version stamped into installed records by [`force_redownload`].
///
/// Any string that can never equal a real release tag works; the next
/// reconcile sees a mismatch and re-downloads.
const REDOWNLOAD_SENTINEL: &str = "dummy value";

/// Enables every selected addon, persisting once.
///
/// Returns the number of records changed.
pub fn enable_selected(
    manager: &mut ConfigManager,
    folders: &[&str],
) -> Result<usize, ConfigError> {
    let mut changed = 0;
    for folder in folders {
        if install::enable_addon(manager, folder) {
            changed += 1;
        } else {
            warn!("No record for addon '{}', skipping enable", folder);
        }
    }

    if changed > 0 {
        manager.save()?;
    }
    Ok(changed)
}

/// Disables every selected addon, persisting once. Files stay on disk so
/// re-enabling is instant.
pub fn disable_selected(
    manager: &mut ConfigManager,
    folders: &[&str],
) -> Result<usize, ConfigError> {
    let mut changed = 0;
    for folder in folders {
        if install::disable_addon(manager, folder) {
            changed += 1;
        } else {
            warn!("No record for addon '{}', skipping disable", folder);
        }
    }

    if changed > 0 {
        manager.save()?;
    }
    Ok(changed)
}

/// Deletes every selected addon's files and resets their records,
/// persisting once.
pub fn delete_selected(
    manager: &mut ConfigManager,
    folders: &[&str],
) -> Result<usize, UpdateError> {
    let mut changed = 0;
    for folder in folders {
        install::delete_addon(manager, folder)?;
        changed += 1;
    }

    if changed > 0 {
        manager.save()?;
    }
    Ok(changed)
}

/// Stamps every installed record with a sentinel version so the next run
/// re-downloads regardless of what is actually current.
///
/// Intended for repairing installs the user broke by hand-editing the
/// addons folder.
pub fn force_redownload(manager: &mut ConfigManager) -> Result<usize, ConfigError> {
    let mut changed = 0;
    for record in manager.config_mut().addons.values_mut() {
        if record.installed {
            record.version = REDOWNLOAD_SENTINEL.to_string();
            changed += 1;
        }
    }

    if changed > 0 {
        manager.save()?;
    }
    info!("Marked {} addon(s) for forced redownload", changed);
    Ok(changed)
}

/// Destructive full reset: removes the managed addons directory and the
/// loader's files from disk, clears every addon record, and nulls the
/// loader version. The environment fields (game path, bin folder) stay.
pub fn delete_all(manager: &mut ConfigManager) -> Result<(), UpdateError> {
    let game_path = manager.config().game_path.clone();

    let addons = install::addons_root(&game_path);
    if addons.exists() {
        fs::remove_dir_all(&addons)?;
        info!("Removed addons directory {}", addons.display());
    }

    for file in install::expected_loader_files(&game_path, manager.config().bin_folder.as_deref())
    {
        if file.exists() {
            fs::remove_file(&file)?;
        }
    }

    manager.delete_all_addons();
    manager.save()?;
    Ok(())
}
