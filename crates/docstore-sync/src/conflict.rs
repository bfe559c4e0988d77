//! Name-collision detection for move and migrate batches.

use std::collections::HashSet;

/// How to proceed when a batch collides with the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Drop the colliding names from the batch.
    SkipConflicts,
    /// Run the full batch, replacing the destination copies.
    OverwriteAll,
    /// Do nothing.
    Cancel,
}

/// Names present both in a batch and in its destination.
///
/// Computed right before a batch commits and consumed by exactly one
/// [`Resolution`]; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictRecord {
    names: Vec<String>,
}

impl ConflictRecord {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Exact, case-sensitive intersection of `selection` with `destination`,
/// in selection order.
pub fn detect_conflicts<'a, S, D>(selection: S, destination: D) -> ConflictRecord
where
    S: IntoIterator<Item = &'a String>,
    D: IntoIterator<Item = &'a String>,
{
    let existing: HashSet<&str> = destination.into_iter().map(String::as_str).collect();
    let names = selection
        .into_iter()
        .filter(|name| existing.contains(name.as_str()))
        .cloned()
        .collect();
    ConflictRecord { names }
}
