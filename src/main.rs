//! Loadstone - Main entry point.
//!
//! Command-line driver for the addon update engine.
//!
//! Usage: loadstone [OPTIONS] <COMMAND> [ARGS]
//!
//! Commands:
//!   update [FOLDERS...]    Update the loader and the given addons
//!                          (all catalog addons when none given)
//!   reinstall-loader       Force loader reconciliation
//!   list                   Show catalog entries and their status
//!   enable <FOLDERS...>    Re-enable disabled addons
//!   disable <FOLDERS...>   Disable addons, leaving files in place
//!   delete <FOLDERS...>    Remove addons from disk
//!   redownload             Force redownload of all installed addons
//!   delete-all             Remove every addon and reset state
//!
//! Options:
//!   --version, -v    Show version
//!   --yes            Skip confirmation prompts

use std::env;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use loadstone::catalog::Catalog;
use loadstone::config::ConfigManager;
use loadstone::logging::{self, LogConfig};
use loadstone::management;
use loadstone::progress::ProgressSink;
use loadstone::release::GitHubReleaseClient;
use loadstone::selfupdate::{SelfUpdater, VERSION};
use loadstone::{AddonRecord, UpdateOrchestrator};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("loadstone v{}", VERSION);
        return ExitCode::SUCCESS;
    }

    let assume_yes = args.iter().any(|a| a == "--yes");
    let mut words = args.iter().filter(|a| !a.starts_with('-'));
    let Some(command) = words.next() else {
        print_usage();
        return ExitCode::FAILURE;
    };
    let operands: Vec<&str> = words.map(String::as_str).collect();

    if let Err(e) = logging::init(&LogConfig::default()) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    let mut manager = ConfigManager::new();
    let catalog = match Catalog::load_dir(&Catalog::default_dir()) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Failed to read catalog: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match command.as_str() {
        "update" => run_update(&mut manager, &catalog, &operands, false),
        "reinstall-loader" => run_update(&mut manager, &catalog, &[], true),
        "list" => {
            list_addons(&manager, &catalog);
            Ok(())
        }
        "enable" => management::enable_selected(&mut manager, &operands)
            .map(|n| println!("Enabled {} addon(s).", n))
            .map_err(|e| e.to_string()),
        "disable" => management::disable_selected(&mut manager, &operands)
            .map(|n| println!("Disabled {} addon(s).", n))
            .map_err(|e| e.to_string()),
        "delete" => management::delete_selected(&mut manager, &operands)
            .map(|n| println!("Deleted {} addon(s).", n))
            .map_err(|e| e.to_string()),
        "redownload" => management::force_redownload(&mut manager)
            .map_err(|e| e.to_string())
            .and_then(|_| run_update(&mut manager, &catalog, &[], false)),
        "delete-all" => run_delete_all(&mut manager, assume_yes),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("loadstone v{}", VERSION);
    eprintln!();
    eprintln!("Usage: loadstone [OPTIONS] <COMMAND> [ARGS]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  update [FOLDERS...]    Update the loader and the given addons");
    eprintln!("  reinstall-loader       Force loader reconciliation");
    eprintln!("  list                   Show catalog entries and their status");
    eprintln!("  enable <FOLDERS...>    Re-enable disabled addons");
    eprintln!("  disable <FOLDERS...>   Disable addons, leaving files in place");
    eprintln!("  delete <FOLDERS...>    Remove addons from disk");
    eprintln!("  redownload             Force redownload of all installed addons");
    eprintln!("  delete-all             Remove every addon and reset state");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --version, -v    Show version");
    eprintln!("  --yes            Skip confirmation prompts");
}

/// Progress sink that writes labels and a percentage line to stderr.
struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn set_label(&self, text: &str) {
        eprintln!("{}", text);
    }

    fn set_progress(&self, percent: u8) {
        eprint!("\r  {:>3}%", percent);
        let _ = io::stderr().flush();
        if percent == 100 {
            eprintln!();
        }
    }

    fn set_complete(&self, _done: bool) {}
}

/// Runs a full update over the selected addons.
fn run_update(
    manager: &mut ConfigManager,
    catalog: &Catalog,
    folders: &[&str],
    force_loader: bool,
) -> Result<(), String> {
    if manager.config().game_path.as_os_str().is_empty() {
        return Err(format!(
            "Game path is not set. Edit {} and set \"game_path\".",
            manager.path().display()
        ));
    }

    manager.config_mut().determine_system_type();
    if manager.config().bin_folder.is_none() {
        return Err(
            "Unable to locate the game client binary folder. Please verify the game path."
                .to_string(),
        );
    }

    let selection: Vec<_> = if folders.is_empty() {
        catalog.entries().collect()
    } else {
        let mut picked = Vec::with_capacity(folders.len());
        for folder in folders {
            match catalog.describe(folder) {
                Some(entry) => picked.push(entry),
                None => return Err(format!("Addon '{}' is not in the catalog", folder)),
            }
        }
        picked
    };

    let client = GitHubReleaseClient::new();
    let sink = ConsoleSink;
    let mut updater = SelfUpdater::new();
    let mut orchestrator = UpdateOrchestrator::new(&client, &sink);

    orchestrator
        .run(manager, &mut updater, &selection, force_loader)
        .map_err(|e| e.to_string())?;

    // Deferred self-update: the staged package is applied by the
    // external updater after this process exits.
    match updater.launch_updater() {
        Ok(true) => eprintln!("A loadstone update was staged; the updater will apply it now."),
        Ok(false) => {}
        Err(e) => eprintln!("Failed to start the updater: {}", e),
    }

    Ok(())
}

/// Prints every catalog entry with its installation status.
fn list_addons(manager: &ConfigManager, catalog: &Catalog) {
    if catalog.is_empty() {
        println!("Catalog is empty.");
        return;
    }

    for entry in catalog.entries() {
        let status = manager
            .addon(&entry.folder_name)
            .map(status_text)
            .unwrap_or_default();
        let name = if entry.addon_name.is_empty() {
            &entry.folder_name
        } else {
            &entry.addon_name
        };
        println!("{:<24} {} {}", entry.folder_name, name, status);
    }
}

/// Status suffix for one addon record.
fn status_text(record: &AddonRecord) -> String {
    let mut status = String::new();
    if record.installed {
        if record.version.len() > 10 {
            status.push_str("(installed)");
        } else {
            status.push_str(&format!("({} installed)", record.version));
        }
    }
    if record.disabled {
        status.push_str("(disabled)");
    }
    status
}

/// Destructive full reset, double-confirmed when interactive.
fn run_delete_all(manager: &mut ConfigManager, assume_yes: bool) -> Result<(), String> {
    if !assume_yes {
        if !atty::is(atty::Stream::Stdin) {
            return Err("Refusing to delete all addons without --yes in a non-interactive shell."
                .to_string());
        }

        if !confirm("This will delete ALL addons and all data associated with them! Continue?")
            || !confirm("Are you absolutely sure? This action cannot be undone.")
        {
            println!("Aborted.");
            return Ok(());
        }
    }

    management::delete_all(manager).map_err(|e| e.to_string())?;
    println!("All addons have been removed.");
    Ok(())
}

/// Asks a yes/no question on stderr, defaulting to no.
fn confirm(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    let _ = io::stderr().flush();

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}
