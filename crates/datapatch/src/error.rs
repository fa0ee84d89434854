//! Error types for the patch engine.
//!
//! [`PatchError`] covers all anticipated failure modes: ledger storage
//! errors, patch execution failures (wrapped with the failing
//! identifier), missing unit files or behaviors during rollback, and
//! scaffold filename collisions.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by patch operations.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The ledger could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Schema migration failed while opening the database.
    #[error("migration error: {0}")]
    Migration(String),

    /// A filesystem operation on the patch root failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A patch's `up` raised an error; the transaction was rolled back.
    #[error("failed to apply patch {identifier}: {source}")]
    Apply {
        identifier: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A patch's `down` raised an error during rollback.
    #[error("failed to roll back patch {identifier}: {source}")]
    Revert {
        identifier: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A unit file was discovered but no factory is registered for it.
    #[error("no patch registered for identifier: {identifier}")]
    Unregistered { identifier: String },

    /// A rollback target's source file is absent from the patch root.
    #[error("patch file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    /// A rollback target does not support `down`.
    #[error("rollback failed: patch {identifier} does not expose a down() behavior")]
    MissingDown { identifier: String },

    /// The scaffolder's generated filename already exists.
    #[error("patch file already exists: {}", path.display())]
    ScaffoldCollision { path: PathBuf },
}
