//! The [`Patch`] trait defining a data patch unit, and [`PatchSet`], the
//! identifier → factory registry the engine resolves units from.
//!
//! The registry replaces load-by-name: the host application registers a
//! factory for every compiled patch type at startup, keyed by the unit's
//! identifier (its file path relative to the patch root, extension
//! stripped). A unit file with no registered factory is an error on the
//! tracked run/rollback paths.

use std::collections::BTreeMap;

use rusqlite::Connection;

/// Result type for patch bodies.
///
/// Boxed so patch authors can bubble any error source (`rusqlite`,
/// I/O, domain errors) with `?`.
pub type PatchResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// One discrete, independently identified data-transformation routine.
///
/// Both behaviors default to no-ops, so a patch may implement only the
/// direction it needs. During a tracked run, `up` receives the
/// connection inside an open transaction that also records the ledger
/// row; the transaction commits only if both succeed. During rollback,
/// `down` receives the bare connection; no transaction wrapping is
/// applied on the reverse path, so `down` bodies must be idempotent
/// enough to survive a retry.
pub trait Patch {
    /// Apply the data patch.
    fn up(&self, _conn: &Connection) -> PatchResult {
        Ok(())
    }

    /// Revert the data patch.
    fn down(&self, _conn: &Connection) -> PatchResult {
        Ok(())
    }

    /// Whether this patch supports being rolled back.
    ///
    /// Overriding to `false` declares the patch irreversible; the
    /// rollback engine fails with a missing-down error when it targets
    /// such a patch.
    fn has_down(&self) -> bool {
        true
    }

    /// Advisory flag, currently unused: the runner wraps every `up` in a
    /// transaction unconditionally regardless of this value.
    fn transactional(&self) -> bool {
        false
    }
}

type PatchFactory = Box<dyn Fn() -> Box<dyn Patch>>;

/// Registry mapping patch identifiers to factories.
///
/// Populated once at startup by the host application; iteration order is
/// irrelevant since execution order comes from the unit store's path
/// sort.
#[derive(Default)]
pub struct PatchSet {
    factories: BTreeMap<String, PatchFactory>,
}

impl PatchSet {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for the given identifier, replacing any
    /// previous registration.
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Patch> + 'static,
    {
        self.factories.insert(identifier.into(), Box::new(factory));
    }

    /// Instantiates the patch registered under `identifier`, if any.
    pub fn instantiate(&self, identifier: &str) -> Option<Box<dyn Patch>> {
        self.factories.get(identifier).map(|factory| factory())
    }

    /// Whether a factory is registered under `identifier`.
    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    /// Number of registered patches.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
