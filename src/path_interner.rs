//! Bijective interning of OpenXR path strings, owned by the `Instance`.
//!
//! Mirrors the `string_to_path` map `fakexr`'s fake instance keeps, but
//! adds the well-formedness validation and the reverse (handle → string)
//! direction that a real runtime needs for `xrPathToString`.

use openxr_sys as xr;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::RtError;

/// `xrPathToString`/`xrStringToPath` reserve this as "no path".
pub const NULL_PATH: xr::Path = xr::Path::NULL;

fn is_well_formed(path: &str) -> bool {
    if !path.starts_with('/') {
        return false;
    }
    let mut saw_token = false;
    for token in path.split('/').skip(1) {
        if token.is_empty() {
            return false;
        }
        if token.chars().all(|c| c == '.') {
            return false;
        }
        if !token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
        {
            return false;
        }
        saw_token = true;
    }
    saw_token
}

#[derive(Default)]
struct Tables {
    strings: Vec<String>,
    by_string: HashMap<String, xr::Path>,
}

/// Readers-writer lock around a dense, append-only intern table: strings
/// never move once assigned a handle, so a read lock is enough for lookups
/// and only interning a brand-new path needs the write lock.
pub struct PathInterner {
    tables: RwLock<Tables>,
}

impl Default for PathInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl PathInterner {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn path_for_index(index: usize) -> xr::Path {
        // index 0 is reserved for NULL_PATH so every real handle is non-null.
        xr::Path::from_raw((index + 1) as u64)
    }

    fn index_for_path(path: xr::Path) -> Option<usize> {
        let raw = path.into_raw();
        if raw == 0 {
            None
        } else {
            Some(raw as usize - 1)
        }
    }

    /// Interns `path`, validating well-formedness first. Returns the same
    /// handle if `path` was already interned.
    pub fn string_to_path(&self, path: &str) -> Result<xr::Path, RtError> {
        if !is_well_formed(path) {
            return Err(RtError::PathFormatInvalid);
        }
        self.string_to_path_unchecked(path)
    }

    /// Interns `path` without validation, for internally generated paths
    /// (e.g. remap-table outputs) already known to be well-formed.
    pub fn string_to_path_unchecked(&self, path: &str) -> Result<xr::Path, RtError> {
        if let Some(existing) = self.tables.read().unwrap().by_string.get(path) {
            return Ok(*existing);
        }
        let mut tables = self.tables.write().unwrap();
        if let Some(existing) = tables.by_string.get(path) {
            return Ok(*existing);
        }
        let index = tables.strings.len();
        tables.strings.push(path.to_string());
        let handle = Self::path_for_index(index);
        tables.by_string.insert(path.to_string(), handle);
        Ok(handle)
    }

    pub fn path_to_string(&self, path: xr::Path) -> Result<String, RtError> {
        let index = Self::index_for_path(path).ok_or(RtError::PathInvalid)?;
        let tables = self.tables.read().unwrap();
        tables
            .strings
            .get(index)
            .cloned()
            .ok_or(RtError::PathInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_well_formed_paths() {
        let interner = PathInterner::new();
        let handle = interner.string_to_path("/user/hand/right").unwrap();
        assert_eq!(interner.path_to_string(handle).unwrap(), "/user/hand/right");
    }

    #[test]
    fn interning_the_same_path_twice_returns_the_same_handle() {
        let interner = PathInterner::new();
        let a = interner.string_to_path("/user/hand/left").unwrap();
        let b = interner.string_to_path("/user/hand/left").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_malformed_paths() {
        let interner = PathInterner::new();
        assert!(matches!(
            interner.string_to_path("no/leading/slash"),
            Err(RtError::PathFormatInvalid)
        ));
        assert!(matches!(
            interner.string_to_path("/user//hand"),
            Err(RtError::PathFormatInvalid)
        ));
        assert!(matches!(
            interner.string_to_path("/user/.."),
            Err(RtError::PathFormatInvalid)
        ));
    }

    #[test]
    fn unknown_handle_is_path_invalid() {
        let interner = PathInterner::new();
        assert!(matches!(
            interner.path_to_string(xr::Path::from_raw(9999)),
            Err(RtError::PathInvalid)
        ));
    }
}
