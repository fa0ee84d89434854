//! The patch ledger: read/write primitives over the `data_patches`
//! table.
//!
//! All functions take `&Connection` so they work equally on a plain
//! connection and inside an open [`rusqlite::Transaction`] via deref;
//! the runner relies on that to record a patch atomically with its `up`
//! execution. Rows are inserted by the runner, deleted by the rollback
//! engine, and never otherwise mutated.

use std::collections::HashSet;

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::PatchError;

/// One row of the patch ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub patch: String,
    pub batch: i64,
    pub created_at: String,
    pub updated_at: String,
}

const ENTRY_COLUMNS: &str = "id, patch, batch, created_at, updated_at";

fn map_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        patch: row.get(1)?,
        batch: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Highest batch number in the ledger, or `None` when it is empty.
pub fn max_batch(conn: &Connection) -> Result<Option<i64>, PatchError> {
    let batch = conn.query_row("SELECT MAX(batch) FROM data_patches", [], |row| {
        row.get::<_, Option<i64>>(0)
    })?;
    Ok(batch)
}

/// Set of all identifiers currently tracked as applied.
pub fn applied_identifiers(conn: &Connection) -> Result<HashSet<String>, PatchError> {
    let mut stmt = conn.prepare_cached("SELECT patch FROM data_patches")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
}

/// Inserts one ledger row for an applied patch.
///
/// Must be called on the same transaction that executed the patch's
/// `up` so the two commit or roll back together.
pub fn record_applied(conn: &Connection, patch: &str, batch: i64) -> Result<(), PatchError> {
    conn.execute(
        "INSERT INTO data_patches (patch, batch) VALUES (?1, ?2)",
        params![patch, batch],
    )?;
    Ok(())
}

/// Entries of one batch, ordered id descending so later-applied patches
/// within the batch roll back first.
pub fn entries_for_batch(conn: &Connection, batch: i64) -> Result<Vec<LedgerEntry>, PatchError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ENTRY_COLUMNS} FROM data_patches WHERE batch = ?1 ORDER BY id DESC"
    ))?;
    let rows = stmt.query_map(params![batch], map_entry)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// The last `n` applied entries, most recent first, ordered
/// (batch desc, id desc). Spans batch boundaries.
pub fn entries_for_last_n_steps(conn: &Connection, n: usize) -> Result<Vec<LedgerEntry>, PatchError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ENTRY_COLUMNS} FROM data_patches ORDER BY batch DESC, id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![n as i64], map_entry)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// The full ledger, ordered (batch desc, id desc).
pub fn all_entries_descending(conn: &Connection) -> Result<Vec<LedgerEntry>, PatchError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ENTRY_COLUMNS} FROM data_patches ORDER BY batch DESC, id DESC"
    ))?;
    let rows = stmt.query_map([], map_entry)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Deletes every entry of one batch as a single bulk delete.
pub fn delete_batch(conn: &Connection, batch: i64) -> Result<usize, PatchError> {
    let deleted = conn.execute("DELETE FROM data_patches WHERE batch = ?1", params![batch])?;
    Ok(deleted)
}

/// Deletes exactly the rows with the given ids.
pub fn delete_by_ids(conn: &Connection, ids: &[i64]) -> Result<usize, PatchError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("DELETE FROM data_patches WHERE id IN ({placeholders})");
    let deleted = conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
    Ok(deleted)
}

/// Truncates the entire ledger.
pub fn delete_all(conn: &Connection) -> Result<usize, PatchError> {
    let deleted = conn.execute("DELETE FROM data_patches", [])?;
    Ok(deleted)
}
