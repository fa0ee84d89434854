//! Ordered, idempotent data-patch runner.
//!
//! A data patch is a one-off data transformation (as opposed to a
//! schema migration): a compiled type implementing [`Patch`], identified
//! by a unit file under the patch root. The [`Patcher`] engine applies
//! pending patches in unit-path order, records them in a SQLite-backed
//! ledger grouped by batch, and rolls them back under three policies
//! (last batch, last N steps, everything).
//!
//! # Modules
//!
//! - [`error`]: [`PatchError`] with all failure modes
//! - [`patch`]: the [`Patch`] trait and the [`PatchSet`] registry
//! - [`units`]: unit file discovery and identifier derivation
//! - [`ledger`]: read/write primitives over the `data_patches` table
//! - [`schema`]: database bootstrap and migrations
//! - [`runner`]: forward application and the untracked single-patch run
//! - [`rollback`]: the three rollback policies
//! - [`hooks`]: global hooks around run/rollback cycles
//! - [`scaffold`]: generation of new patch unit files
//!
//! # Guarantees
//!
//! Each forward-applied unit runs inside its own transaction together
//! with its ledger insert; there is no cross-unit atomicity, so a
//! failing run leaves earlier units of the same run committed. Rollback
//! deletes ledger rows only after every targeted `down` succeeds, and
//! applies no per-unit transaction on the reverse path.

pub mod error;
pub mod hooks;
pub mod ledger;
pub mod patch;
pub mod rollback;
pub mod runner;
pub mod scaffold;
pub mod schema;
pub mod units;

// Re-export key types for ergonomic use.
pub use error::PatchError;
pub use hooks::Hooks;
pub use ledger::LedgerEntry;
pub use patch::{Patch, PatchResult, PatchSet};
pub use rollback::RollbackTarget;
pub use runner::Patcher;
pub use units::UnitStore;
