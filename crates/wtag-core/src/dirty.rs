//! Modification tracking for monitoring configs
//!
//! A set of dotted paths plus one sentinel meaning "everything changed",
//! kept apart from the values themselves.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    paths: BTreeSet<String>,
    all: bool,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one path. Ancestors and siblings are left alone.
    pub fn mark(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    /// Set the whole-object sentinel
    pub fn mark_all(&mut self) {
        self.all = true;
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.all = false;
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    /// True if anything at all is marked
    pub fn any(&self) -> bool {
        self.all || !self.paths.is_empty()
    }

    /// True if `path`, one of its ancestors, or the sentinel is marked
    pub fn contains(&self, path: &str) -> bool {
        if self.all || self.paths.contains(path) {
            return true;
        }
        path.char_indices()
            .filter(|&(_, c)| c == '.')
            .any(|(idx, _)| self.paths.contains(&path[..idx]))
    }

    /// Explicitly marked paths, in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}
