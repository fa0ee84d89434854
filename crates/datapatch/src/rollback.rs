//! Reverse application: the three rollback policies and the shared
//! down-execution pass.
//!
//! Ledger rows are deleted only after every targeted `down` has
//! succeeded, so a mid-sequence failure (missing file, missing down,
//! failing body) leaves the ledger unchanged. Unlike forward
//! application, no transaction wraps a unit's `down`: a crash between
//! executing `down` and deleting rows can leave the ledger ahead of the
//! store, and a retried rollback may run `down` again. Down bodies own
//! their idempotence.

use crate::error::PatchError;
use crate::ledger::{self, LedgerEntry};
use crate::runner::Patcher;

/// Which ledger entries a rollback targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Every entry of the highest batch (the default).
    LastBatch,
    /// The last `n` applied entries, regardless of batch boundaries.
    Steps(usize),
    /// The entire ledger.
    All,
}

impl RollbackTarget {
    /// Maps caller options with the fixed priority `all` > `step` >
    /// default last batch.
    ///
    /// A `step` of 0 counts as unset and falls back to the last-batch
    /// policy.
    pub fn from_flags(all: bool, step: Option<usize>) -> Self {
        if all {
            RollbackTarget::All
        } else if let Some(n) = step.filter(|&n| n > 0) {
            RollbackTarget::Steps(n)
        } else {
            RollbackTarget::LastBatch
        }
    }
}

impl Patcher {
    /// Rolls back applied patches under the given policy and returns how
    /// many entries were rolled back (0 is a no-op success).
    ///
    /// Global down hooks and the per-call `before`/`after` callables
    /// bracket the whole cycle exactly as in the forward runner.
    pub fn rollback(
        &self,
        target: RollbackTarget,
        log: &mut dyn FnMut(&str),
        before: Option<&dyn Fn()>,
        after: Option<&dyn Fn()>,
    ) -> Result<usize, PatchError> {
        self.hooks.fire_down_before(log);

        if let Some(before) = before {
            before();
        }

        let count = match target {
            RollbackTarget::LastBatch => self.rollback_last_batch(log)?,
            RollbackTarget::Steps(steps) => self.rollback_steps(steps, log)?,
            RollbackTarget::All => self.rollback_all(log)?,
        };

        if let Some(after) = after {
            after();
        }

        self.hooks.fire_down_after(log);

        Ok(count)
    }

    /// Rolls back the last batch of patches, deleting its rows as one
    /// bulk delete.
    fn rollback_last_batch(&self, log: &mut dyn FnMut(&str)) -> Result<usize, PatchError> {
        let Some(last_batch) = ledger::max_batch(&self.conn)? else {
            log("Nothing to rollback.");
            return Ok(0);
        };

        let entries = ledger::entries_for_batch(&self.conn, last_batch)?;
        if entries.is_empty() {
            log("No patches found in the last batch to rollback.");
            return Ok(0);
        }

        self.execute_down_methods(&entries, log)?;
        ledger::delete_batch(&self.conn, last_batch)?;

        Ok(entries.len())
    }

    /// Reverts the last `steps` applied patches, most recent first,
    /// crossing batch boundaries, then deletes exactly those rows.
    fn rollback_steps(&self, steps: usize, log: &mut dyn FnMut(&str)) -> Result<usize, PatchError> {
        if steps == 0 {
            return Ok(0);
        }

        let entries = ledger::entries_for_last_n_steps(&self.conn, steps)?;
        if entries.is_empty() {
            log("No patches to rollback.");
            return Ok(0);
        }

        self.execute_down_methods(&entries, log)?;
        let ids: Vec<i64> = entries.iter().map(|entry| entry.id).collect();
        ledger::delete_by_ids(&self.conn, &ids)?;

        Ok(entries.len())
    }

    /// Reverts every applied patch and truncates the ledger.
    fn rollback_all(&self, log: &mut dyn FnMut(&str)) -> Result<usize, PatchError> {
        let entries = ledger::all_entries_descending(&self.conn)?;
        if entries.is_empty() {
            log("No patches to rollback.");
            return Ok(0);
        }

        self.execute_down_methods(&entries, log)?;
        ledger::delete_all(&self.conn)?;

        Ok(entries.len())
    }

    /// Executes `down` for each entry in the given order.
    ///
    /// Fails fast on the first missing unit file, unregistered
    /// identifier, or missing `down` behavior; callers delete ledger
    /// rows only after this returns Ok, so failures never leave partial
    /// bookkeeping.
    fn execute_down_methods(
        &self,
        entries: &[LedgerEntry],
        log: &mut dyn FnMut(&str),
    ) -> Result<(), PatchError> {
        for entry in entries {
            let identifier = &entry.patch;
            log(&format!(" - Rolling back patch: {identifier}"));
            tracing::info!(patch = %identifier, batch = entry.batch, "rolling back patch");

            let path = self.store.path_for(identifier);
            if !path.is_file() {
                return Err(PatchError::MissingFile { path });
            }

            let patch = self
                .patches
                .instantiate(identifier)
                .ok_or_else(|| PatchError::Unregistered {
                    identifier: identifier.clone(),
                })?;

            if !patch.has_down() {
                return Err(PatchError::MissingDown {
                    identifier: identifier.clone(),
                });
            }

            patch
                .down(&self.conn)
                .map_err(|source| PatchError::Revert {
                    identifier: identifier.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
