//! The [`Patcher`] engine: forward application of pending patches and
//! the untracked single-patch escape hatch.
//!
//! Forward application wraps each unit's `up` and its ledger insert in
//! one transaction, so a failing unit leaves no ledger row, but units
//! committed earlier in the same run stay committed; there is no
//! cross-unit atomicity. The rollback half of the engine lives in
//! [`crate::rollback`].

use std::path::PathBuf;

use rusqlite::{Connection, Transaction};

use crate::error::PatchError;
use crate::hooks::Hooks;
use crate::ledger;
use crate::patch::{Patch, PatchSet};
use crate::scaffold;
use crate::schema;
use crate::units::UnitStore;

/// Orchestrates patch application and rollback against one database and
/// one patch root.
pub struct Patcher {
    pub(crate) conn: Connection,
    pub(crate) store: UnitStore,
    pub(crate) patches: PatchSet,
    pub(crate) hooks: Hooks,
}

impl Patcher {
    /// Opens (or creates) the database at `db_path`, applying schema
    /// migrations, and builds an engine over it.
    pub fn open(
        db_path: &str,
        patch_root: impl Into<PathBuf>,
        patches: PatchSet,
    ) -> Result<Self, PatchError> {
        Ok(Self::new(schema::open_database(db_path)?, patch_root, patches))
    }

    /// Builds an engine over an already-open connection. The ledger
    /// table must exist (see [`crate::schema`]).
    pub fn new(conn: Connection, patch_root: impl Into<PathBuf>, patches: PatchSet) -> Self {
        Patcher {
            conn,
            store: UnitStore::new(patch_root),
            patches,
            hooks: Hooks::new(),
        }
    }

    /// Installs global hooks fired around full run/rollback cycles.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn unit_store(&self) -> &UnitStore {
        &self.store
    }

    /// Applies all pending patches in unit-path order and returns how
    /// many were applied (0 pending is success, not an error).
    ///
    /// Each pending unit runs inside its own transaction together with
    /// its ledger insert. The first failure rolls that transaction back
    /// and aborts the whole run with [`PatchError::Apply`] naming the
    /// identifier; earlier units of the run remain committed.
    pub fn run_patches(
        &mut self,
        log: &mut dyn FnMut(&str),
        before: Option<&dyn Fn()>,
        after: Option<&dyn Fn()>,
    ) -> Result<usize, PatchError> {
        self.hooks.fire_up_before(log);

        let batch = ledger::max_batch(&self.conn)?.unwrap_or(0) + 1;

        if let Some(before) = before {
            before();
        }

        let units = self.store.list_units()?;
        let applied = ledger::applied_identifiers(&self.conn)?;

        let mut count = 0;
        for path in units {
            let identifier = self.store.identifier_for(&path);
            if applied.contains(&identifier) {
                tracing::debug!(patch = %identifier, "already applied, skipping");
                continue;
            }

            log(&format!(" - Applying patch: {identifier}"));
            tracing::info!(patch = %identifier, batch, "applying patch");

            let patch = self.patches.instantiate(&identifier).ok_or_else(|| {
                PatchError::Apply {
                    identifier: identifier.clone(),
                    source: Box::new(PatchError::Unregistered {
                        identifier: identifier.clone(),
                    }),
                }
            })?;

            let tx = self.conn.transaction()?;
            match apply_in_scope(&tx, patch.as_ref(), &identifier, batch) {
                Ok(()) => {
                    tx.commit().map_err(|e| PatchError::Apply {
                        identifier: identifier.clone(),
                        source: Box::new(e),
                    })?;
                    count += 1;
                }
                // Dropping the transaction rolls it back; no ledger row
                // exists for the failing unit.
                Err(source) => return Err(PatchError::Apply { identifier, source }),
            }
        }

        if let Some(after) = after {
            after();
        }

        self.hooks.fire_up_after(log);

        Ok(count)
    }

    /// Force-runs a single patch by identifier, bypassing the ledger.
    ///
    /// Returns `false` instead of propagating when the unit file is
    /// missing, the identifier is unregistered, or `up` fails; every
    /// failure mode is logged. No ledger row is written and no
    /// transaction is opened; this is an explicitly untracked escape
    /// hatch for manual re-execution.
    pub fn run_single_patch(&self, identifier: &str, log: &mut dyn FnMut(&str)) -> bool {
        let path = self.store.path_for(identifier);
        if !path.is_file() {
            log(&format!(
                "   - ERROR: Patch file not found at '{}'",
                path.display()
            ));
            tracing::warn!(patch = %identifier, "patch file not found");
            return false;
        }

        log(&format!(" - Force running patch: {identifier}"));
        tracing::info!(patch = %identifier, "force running patch");

        let Some(patch) = self.patches.instantiate(identifier) else {
            log(&format!(
                "   - ERROR: No patch registered for identifier '{identifier}'"
            ));
            tracing::warn!(patch = %identifier, "no patch registered");
            return false;
        };

        match patch.up(&self.conn) {
            Ok(()) => {
                log("   - Patch executed successfully.");
                true
            }
            Err(e) => {
                log(&format!("   - ERROR: Failed to run patch {identifier}: {e}"));
                tracing::warn!(patch = %identifier, error = %e, "forced patch failed");
                false
            }
        }
    }

    /// Scaffolds a new patch unit file in the patch root. See
    /// [`crate::scaffold::create_patch`].
    pub fn create_patch(&self, name: &str) -> Result<PathBuf, PatchError> {
        scaffold::create_patch(self.store.root(), name)
    }
}

/// Runs `up` and records the ledger row inside the open transaction.
fn apply_in_scope(
    tx: &Transaction<'_>,
    patch: &dyn Patch,
    identifier: &str,
    batch: i64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    patch.up(tx)?;
    ledger::record_applied(tx, identifier, batch)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::patch::PatchResult;
    use std::fs;
    use tempfile::TempDir;

    /// Inserts its name into the `samples` table; `down` removes it.
    pub(crate) struct InsertSample(pub &'static str);

    impl Patch for InsertSample {
        fn up(&self, conn: &Connection) -> PatchResult {
            conn.execute("INSERT INTO samples (name) VALUES (?1)", [self.0])?;
            Ok(())
        }

        fn down(&self, conn: &Connection) -> PatchResult {
            conn.execute("DELETE FROM samples WHERE name = ?1", [self.0])?;
            Ok(())
        }
    }

    pub(crate) struct FailingUp;

    impl Patch for FailingUp {
        fn up(&self, conn: &Connection) -> PatchResult {
            // Writes before failing, to prove the transaction rolls the
            // side effect back.
            conn.execute("INSERT INTO samples (name) VALUES ('partial')", [])?;
            Err("boom".into())
        }
    }

    /// Builds an engine over an in-memory ledger, a temp patch root
    /// holding `units`, and a `samples` scratch table.
    pub(crate) fn patcher_with(units: &[&str], patches: PatchSet) -> (TempDir, Patcher) {
        let dir = TempDir::new().unwrap();
        for unit in units {
            let path = dir.path().join(format!("{unit}.rs"));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, "// test unit\n").unwrap();
        }
        let conn = schema::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE samples (name TEXT NOT NULL)")
            .unwrap();
        let patcher = Patcher::new(conn, dir.path(), patches);
        (dir, patcher)
    }

    pub(crate) fn sample_names(patcher: &Patcher) -> Vec<String> {
        let mut stmt = patcher
            .connection()
            .prepare("SELECT name FROM samples ORDER BY name")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.collect::<rusqlite::Result<Vec<String>>>().unwrap()
    }

    pub(crate) fn quiet() -> impl FnMut(&str) {
        |_: &str| {}
    }

    #[test]
    fn test_run_applies_all_pending_in_order_then_noops() {
        let mut set = PatchSet::new();
        set.register("2025_01_01_000001_alpha", || Box::new(InsertSample("alpha")));
        set.register("2025_01_02_000001_beta", || Box::new(InsertSample("beta")));
        let (_dir, mut patcher) = patcher_with(
            &["2025_01_01_000001_alpha", "2025_01_02_000001_beta"],
            set,
        );

        let applied = patcher.run_patches(&mut quiet(), None, None).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(sample_names(&patcher), vec!["alpha", "beta"]);

        let entries = ledger::all_entries_descending(patcher.connection()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.batch == 1));
        // id order follows application order.
        assert_eq!(entries[0].patch, "2025_01_02_000001_beta");

        // A second immediate run applies nothing.
        let applied = patcher.run_patches(&mut quiet(), None, None).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_second_run_uses_next_batch_number() {
        let mut set = PatchSet::new();
        set.register("a_first", || Box::new(InsertSample("first")));
        set.register("b_second", || Box::new(InsertSample("second")));
        let (dir, mut patcher) = patcher_with(&["a_first"], set);

        assert_eq!(patcher.run_patches(&mut quiet(), None, None).unwrap(), 1);

        // A new unit shows up later; the next run gets batch 2.
        fs::write(dir.path().join("b_second.rs"), "// test unit\n").unwrap();
        assert_eq!(patcher.run_patches(&mut quiet(), None, None).unwrap(), 1);

        let entries = ledger::all_entries_descending(patcher.connection()).unwrap();
        assert_eq!(entries[0].patch, "b_second");
        assert_eq!(entries[0].batch, 2);
        assert_eq!(entries[1].batch, 1);
    }

    #[test]
    fn test_failing_up_keeps_earlier_units_and_writes_no_row() {
        let mut set = PatchSet::new();
        set.register("a_ok", || Box::new(InsertSample("ok")));
        set.register("b_bad", || Box::new(FailingUp));
        let (_dir, mut patcher) = patcher_with(&["a_ok", "b_bad"], set);

        let err = patcher.run_patches(&mut quiet(), None, None).unwrap_err();
        match err {
            PatchError::Apply { identifier, .. } => assert_eq!(identifier, "b_bad"),
            other => panic!("expected Apply error, got: {other:?}"),
        }

        // The failing unit's write rolled back; the earlier unit stayed.
        assert_eq!(sample_names(&patcher), vec!["ok"]);
        let applied = ledger::applied_identifiers(patcher.connection()).unwrap();
        assert!(applied.contains("a_ok"));
        assert!(!applied.contains("b_bad"));
    }

    #[test]
    fn test_unregistered_unit_aborts_with_identifier() {
        let (_dir, mut patcher) = patcher_with(&["a_mystery"], PatchSet::new());

        let err = patcher.run_patches(&mut quiet(), None, None).unwrap_err();
        assert!(err.to_string().contains("a_mystery"));
    }

    #[test]
    fn test_logs_and_skips_already_applied() {
        let mut set = PatchSet::new();
        set.register("a_one", || Box::new(InsertSample("one")));
        let (_dir, mut patcher) = patcher_with(&["a_one"], set);

        ledger::record_applied(patcher.connection(), "a_one", 1).unwrap();

        let mut lines = Vec::new();
        let applied = patcher
            .run_patches(&mut |line: &str| lines.push(line.to_string()), None, None)
            .unwrap();
        assert_eq!(applied, 0);
        assert!(lines.is_empty());
        assert!(sample_names(&patcher).is_empty());
    }

    #[test]
    fn test_hooks_and_callbacks_bracket_the_run() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let order: Rc<RefCell<Vec<&'static str>>> = Rc::default();
        let (global_before, global_after) = (Rc::clone(&order), Rc::clone(&order));
        let hooks = Hooks::new()
            .on_up_before(move || global_before.borrow_mut().push("hook-before"))
            .on_up_after(move || global_after.borrow_mut().push("hook-after"));

        let mut set = PatchSet::new();
        set.register("a_one", || Box::new(InsertSample("one")));
        let (_dir, patcher) = patcher_with(&["a_one"], set);
        let mut patcher = patcher.with_hooks(hooks);

        let (call_before, call_after) = (Rc::clone(&order), Rc::clone(&order));
        let before = move || call_before.borrow_mut().push("before");
        let after = move || call_after.borrow_mut().push("after");
        patcher
            .run_patches(&mut quiet(), Some(&before), Some(&after))
            .unwrap();

        assert_eq!(
            *order.borrow(),
            vec!["hook-before", "before", "after", "hook-after"]
        );
    }

    #[test]
    fn test_run_single_missing_file_returns_false() {
        let (_dir, patcher) = patcher_with(&[], PatchSet::new());

        let mut lines = Vec::new();
        let ok = patcher.run_single_patch("a_ghost", &mut |line: &str| {
            lines.push(line.to_string())
        });
        assert!(!ok);
        assert!(lines[0].contains("not found"));
        assert!(ledger::applied_identifiers(patcher.connection())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_run_single_executes_untracked() {
        let mut set = PatchSet::new();
        set.register("a_one", || Box::new(InsertSample("one")));
        let (_dir, patcher) = patcher_with(&["a_one"], set);

        assert!(patcher.run_single_patch("a_one", &mut quiet()));
        assert_eq!(sample_names(&patcher), vec!["one"]);
        // Explicitly untracked: no ledger row.
        assert!(ledger::applied_identifiers(patcher.connection())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_run_single_failure_is_logged_not_propagated() {
        let mut set = PatchSet::new();
        set.register("a_bad", || Box::new(FailingUp));
        let (_dir, patcher) = patcher_with(&["a_bad"], set);

        let mut lines = Vec::new();
        let ok = patcher.run_single_patch("a_bad", &mut |line: &str| {
            lines.push(line.to_string())
        });
        assert!(!ok);
        assert!(lines.iter().any(|l| l.contains("Failed to run patch a_bad")));
    }
}
