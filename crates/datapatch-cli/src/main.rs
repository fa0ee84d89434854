//! Console front end for the data-patch engine.
//!
//! Provides the `datapatch` binary with subcommands for applying,
//! rolling back, scaffolding, and inspecting data patches. Compiled
//! patch types are registered into the [`PatchSet`] in [`patch_set`];
//! scaffolded unit files must be added there to become runnable.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use datapatch::{ledger, scaffold, LedgerEntry, PatchError, PatchSet, Patcher, RollbackTarget};

/// Ordered, idempotent data patch runner.
#[derive(Parser)]
#[command(name = "datapatch", about = "Ordered, idempotent data patch runner")]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, global = true, default_value = "datapatch.db")]
    db: String,

    /// Directory containing patch unit files.
    #[arg(long, global = true, default_value = "patches")]
    path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Apply all pending data patches.
    Run,
    /// Roll back data patches.
    Rollback {
        /// The number of patches to be reverted.
        #[arg(long)]
        step: Option<usize>,

        /// Revert all patches.
        #[arg(long)]
        all: bool,
    },
    /// Force-run a single patch by identifier, without tracking it.
    Single {
        /// Patch identifier (unit path relative to the patch root,
        /// extension stripped).
        identifier: String,
    },
    /// Create a new patch file.
    Make {
        /// Human-readable patch name.
        name: String,
    },
    /// Roll back the last batch, then reapply all pending patches.
    Fresh,
    /// Show applied and pending patches.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

/// The compiled patch registry.
///
/// Every scaffolded unit file must have its type registered here under
/// its identifier (the file path relative to the patch root, extension
/// stripped) before `run`, `rollback`, or `single` can execute it:
///
/// ```ignore
/// mod patches {
///     pub mod backfill_emails; // patches/2025_08_26_000001_backfill_emails.rs
/// }
///
/// fn patch_set() -> PatchSet {
///     let mut set = PatchSet::new();
///     set.register("2025_08_26_000001_backfill_emails", || {
///         Box::new(patches::backfill_emails::BackfillEmails)
///     });
///     set
/// }
/// ```
fn patch_set() -> PatchSet {
    PatchSet::new()
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

/// Dispatches the parsed command, returning the process exit code.
fn run(cli: Cli) -> i32 {
    match cli.command {
        Commands::Make { name } => cmd_make(&cli.path, &name),
        Commands::Run => open_and(&cli.db, &cli.path, cmd_run),
        Commands::Rollback { step, all } => {
            let target = RollbackTarget::from_flags(all, step);
            open_and(&cli.db, &cli.path, |patcher| cmd_rollback(patcher, target))
        }
        Commands::Single { identifier } => {
            open_and(&cli.db, &cli.path, |patcher| cmd_single(patcher, &identifier))
        }
        Commands::Fresh => open_and(&cli.db, &cli.path, cmd_fresh),
        Commands::Status { json } => {
            open_and(&cli.db, &cli.path, |patcher| cmd_status(patcher, json))
        }
    }
}

/// Opens the engine over the database and patch root, then runs `f`.
fn open_and(db: &str, root: &Path, f: impl FnOnce(&mut Patcher) -> i32) -> i32 {
    match Patcher::open(db, root, patch_set()) {
        Ok(mut patcher) => f(&mut patcher),
        Err(e) => {
            eprintln!("Error: failed to open database '{db}': {e}");
            3
        }
    }
}

fn cmd_run(patcher: &mut Patcher) -> i32 {
    println!("Checking for pending data patches...");

    match patcher.run_patches(&mut print_line, None, None) {
        Ok(0) => {
            println!("Your data is already up to date. Nothing to apply.");
            0
        }
        Ok(count) => {
            println!("Success: {count} new patch(es) have been applied.");
            0
        }
        Err(e) => {
            eprintln!("An error occurred while applying patches:");
            eprintln!("{e}");
            1
        }
    }
}

fn cmd_rollback(patcher: &mut Patcher, target: RollbackTarget) -> i32 {
    match target {
        RollbackTarget::All => println!("Rolling back ALL data patches..."),
        RollbackTarget::Steps(n) => println!("Rolling back the last {n} patch(es)..."),
        RollbackTarget::LastBatch => println!("Rolling back the last data patch batch..."),
    }

    match patcher.rollback(target, &mut print_line, None, None) {
        Ok(0) => {
            println!("Nothing to rollback.");
            0
        }
        Ok(count) => {
            println!("Success: {count} patch(es) have been rolled back.");
            0
        }
        Err(e) => {
            eprintln!("An error occurred during rollback:");
            eprintln!("{e}");
            1
        }
    }
}

fn cmd_single(patcher: &mut Patcher, identifier: &str) -> i32 {
    if patcher.run_single_patch(identifier, &mut print_line) {
        0
    } else {
        1
    }
}

fn cmd_make(root: &Path, name: &str) -> i32 {
    match scaffold::create_patch(root, name) {
        Ok(path) => {
            println!("Patch created: {}", path.display());
            0
        }
        Err(e) => {
            eprintln!("An error occurred while creating the patch:");
            eprintln!("{e}");
            1
        }
    }
}

/// Rollback of the last batch followed by a full run.
fn cmd_fresh(patcher: &mut Patcher) -> i32 {
    let code = cmd_rollback(patcher, RollbackTarget::LastBatch);
    if code != 0 {
        return code;
    }
    cmd_run(patcher)
}

#[derive(Serialize)]
struct StatusReport {
    applied: Vec<LedgerEntry>,
    pending: Vec<String>,
}

fn cmd_status(patcher: &mut Patcher, json: bool) -> i32 {
    let report = match build_status(patcher) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("An error occurred while reading patch status:");
            eprintln!("{e}");
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(body) => println!("{body}"),
            Err(e) => {
                eprintln!("Error: failed to serialize status: {e}");
                return 1;
            }
        }
        return 0;
    }

    println!("Applied patches:");
    if report.applied.is_empty() {
        println!("  (none)");
    }
    for entry in &report.applied {
        println!("  [batch {}] {}", entry.batch, entry.patch);
    }

    println!("Pending patches:");
    if report.pending.is_empty() {
        println!("  (none)");
    }
    for identifier in &report.pending {
        println!("  {identifier}");
    }

    0
}

fn build_status(patcher: &Patcher) -> Result<StatusReport, PatchError> {
    let applied = ledger::all_entries_descending(patcher.connection())?;
    let applied_ids: HashSet<&str> = applied.iter().map(|e| e.patch.as_str()).collect();

    let store = patcher.unit_store();
    let pending = store
        .list_units()?
        .iter()
        .map(|path| store.identifier_for(path))
        .filter(|identifier| !applied_ids.contains(identifier.as_str()))
        .collect();

    Ok(StatusReport { applied, pending })
}

fn print_line(line: &str) {
    println!("{line}");
}
