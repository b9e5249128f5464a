//! Change classification against the hash cache

use crate::domain::Cnpj;
use std::collections::HashMap;

/// How a scanned entity relates to its last publication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Unchanged,
    New,
    Modified,
}

/// Compares a freshly computed hash with the committed one
pub fn classify(committed: Option<&str>, hash: &str) -> ChangeKind {
    match committed {
        None => ChangeKind::New,
        Some(previous) if previous == hash => ChangeKind::Unchanged,
        Some(_) => ChangeKind::Modified,
    }
}

/// Committed hashes of one partition, drained as the scan visits identifiers
///
/// Whatever is left after the scan was not seen and has been removed.
#[derive(Debug, Default)]
pub struct KnownHashes {
    hashes: HashMap<Cnpj, String>,
}

impl KnownHashes {
    pub fn new(hashes: HashMap<Cnpj, String>) -> Self {
        Self { hashes }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Classifies `cnpj` and marks it seen
    pub fn observe(&mut self, cnpj: &Cnpj, hash: &str) -> ChangeKind {
        let previous = self.hashes.remove(cnpj);
        classify(previous.as_deref(), hash)
    }

    /// Identifiers never observed, in identifier order
    pub fn into_removed(self) -> Vec<Cnpj> {
        let mut removed: Vec<Cnpj> = self.hashes.into_keys().collect();
        removed.sort();
        removed
    }
}
