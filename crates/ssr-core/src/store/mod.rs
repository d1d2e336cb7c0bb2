//! Persistence collaborators for the encoding registry.
//!
//! An [`EncodingStore`] is a table-like store keyed by encoded string, with one
//! independent table per namespace. It offers only single-row operations; the
//! registry builds batch semantics on top.

pub mod db;
pub mod memory;

pub use db::{OpenRetry, RedbStore};
pub use memory::MemoryStore;

use crate::error::Result;
use std::collections::BTreeSet;

/// Result of a single insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The key was already present; carries the stored decoded value, which
    /// is left untouched.
    AlreadyPresent { existing: String },
}

pub trait EncodingStore {
    fn get(&self, namespace: &str, encoded: &str) -> Result<Option<String>>;

    /// All encoded strings stored in `namespace`. Unknown namespaces are empty.
    fn keys(&self, namespace: &str) -> Result<BTreeSet<String>>;

    /// All (encoded, decoded) rows in `namespace`, ordered by encoded string.
    fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>>;

    /// Store `decoded` under `encoded` unless the key already exists.
    ///
    /// Check and write happen atomically so concurrent writers can never
    /// leave two values for one key.
    fn insert_if_absent(&self, namespace: &str, encoded: &str, decoded: &str)
        -> Result<InsertOutcome>;

    fn namespaces(&self) -> Result<Vec<String>>;
}
