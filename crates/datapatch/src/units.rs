//! The [`UnitStore`]: discovery of patch unit files under the patch
//! root, and conversion between file paths and patch identifiers.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PatchError;

/// File extension of patch unit sources.
pub const UNIT_EXTENSION: &str = "rs";

/// Locates patch unit files under a root directory.
///
/// Discovery is recursive and the result is sorted by raw full-path
/// bytes; that ordering doubles as execution order, so directory nesting
/// participates in the comparison. No side effects.
pub struct UnitStore {
    root: PathBuf,
}

impl UnitStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        UnitStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recursively enumerates all unit files under the root, sorted
    /// lexicographically by full path. A missing root yields an empty
    /// list, not an error.
    pub fn list_units(&self) -> Result<Vec<PathBuf>, PatchError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        collect_units(&self.root, &mut files)?;
        files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        Ok(files)
    }

    /// Derives the patch identifier for a unit path: the path relative
    /// to the root with the extension stripped.
    pub fn identifier_for(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.with_extension("").to_string_lossy().into_owned()
    }

    /// Resolves the unit file path a patch identifier refers to.
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.root.join(format!("{identifier}.{UNIT_EXTENSION}"))
    }
}

fn collect_units(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PatchError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_units(&path, out)?;
        } else if path.extension().and_then(|ext| ext.to_str()) == Some(UNIT_EXTENSION) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, "// unit\n").unwrap();
    }

    #[test]
    fn test_missing_root_is_empty_not_error() {
        let store = UnitStore::new("/nonexistent/patch/root");
        assert!(store.list_units().unwrap().is_empty());
    }

    #[test]
    fn test_lists_recursively_and_ignores_other_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "2025_01_01_000001_first.rs");
        touch(dir.path(), "nested/2025_01_02_000001_second.rs");
        touch(dir.path(), "notes.txt");

        let store = UnitStore::new(dir.path());
        let units = store.list_units().unwrap();
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|p| p.extension().unwrap() == "rs"));
    }

    #[test]
    fn test_sorted_by_raw_full_path() {
        let dir = TempDir::new().unwrap();
        // '/' sorts before '_', so the nested file comes first under raw
        // byte comparison of the full paths.
        touch(dir.path(), "a/b.rs");
        touch(dir.path(), "a_c.rs");
        touch(dir.path(), "a_a.rs");

        let store = UnitStore::new(dir.path());
        let ids: Vec<String> = store
            .list_units()
            .unwrap()
            .iter()
            .map(|p| store.identifier_for(p))
            .collect();
        assert_eq!(ids, vec!["a/b", "a_a", "a_c"]);
    }

    #[test]
    fn test_identifier_round_trips_through_path_for() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "nested/2025_01_02_000001_second.rs");

        let store = UnitStore::new(dir.path());
        let units = store.list_units().unwrap();
        let id = store.identifier_for(&units[0]);
        assert_eq!(id, "nested/2025_01_02_000001_second");
        assert_eq!(store.path_for(&id), units[0]);
    }
}
