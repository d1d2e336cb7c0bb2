//! The encoding registry: known (encoded → decoded) pairs for one namespace.
//!
//! Append-only. Insertion is insert-if-absent per pair, so replaying a batch
//! or losing a race against another run is a no-op rather than a conflict.

use crate::error::Result;
use crate::paths;
use crate::store::{EncodingStore, InsertOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// EncodingPair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncodingPair {
    pub encoded: String,
    pub decoded: String,
}

impl EncodingPair {
    pub fn new(encoded: impl Into<String>, decoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
            decoded: decoded.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// InsertReport
// ---------------------------------------------------------------------------

/// Per-pair outcome of [`EncodingRegistry::insert_many`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub inserted: Vec<EncodingPair>,
    /// Pairs whose key was already stored, by an earlier run or a concurrent one.
    pub already_present: Vec<EncodingPair>,
    /// Pairs the store failed to write, with the store's error message.
    pub failed: Vec<(EncodingPair, String)>,
}

impl InsertReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// EncodingRegistry
// ---------------------------------------------------------------------------

pub struct EncodingRegistry<'a, S: EncodingStore + ?Sized> {
    store: &'a S,
    namespace: String,
}

impl<'a, S: EncodingStore + ?Sized> EncodingRegistry<'a, S> {
    pub fn new(store: &'a S, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        paths::validate_namespace(&namespace)?;
        Ok(Self { store, namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn contains(&self, encoded: &str) -> Result<bool> {
        Ok(self.store.get(&self.namespace, encoded)?.is_some())
    }

    pub fn get(&self, encoded: &str) -> Result<Option<String>> {
        self.store.get(&self.namespace, encoded)
    }

    pub fn get_known(&self) -> Result<BTreeSet<String>> {
        self.store.keys(&self.namespace)
    }

    pub fn list(&self) -> Result<Vec<EncodingPair>> {
        Ok(self
            .store
            .entries(&self.namespace)?
            .into_iter()
            .map(|(encoded, decoded)| EncodingPair { encoded, decoded })
            .collect())
    }

    /// Insert each pair whose encoded string is not yet stored.
    ///
    /// One store write per pair. A failing write is recorded against its pair
    /// and the remaining pairs are still attempted; nothing is rolled back.
    pub fn insert_many<I>(&self, pairs: I) -> InsertReport
    where
        I: IntoIterator<Item = EncodingPair>,
    {
        let mut report = InsertReport::default();
        for pair in pairs {
            match self
                .store
                .insert_if_absent(&self.namespace, &pair.encoded, &pair.decoded)
            {
                Ok(InsertOutcome::Inserted) => {
                    debug!(namespace = %self.namespace, encoded = %pair.encoded, "inserted encoding");
                    report.inserted.push(pair);
                }
                Ok(InsertOutcome::AlreadyPresent { existing }) => {
                    if existing != pair.decoded {
                        warn!(
                            namespace = %self.namespace,
                            encoded = %pair.encoded,
                            stored = %existing,
                            attempted = %pair.decoded,
                            "stored decoding differs; keeping stored value"
                        );
                    }
                    report.already_present.push(pair);
                }
                Err(e) => {
                    warn!(namespace = %self.namespace, encoded = %pair.encoded, error = %e, "insert failed");
                    report.failed.push((pair, e.to_string()));
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SsrError;
    use crate::store::MemoryStore;

    /// Fails every write whose encoded string is listed.
    struct FlakyStore {
        inner: MemoryStore,
        reject: Vec<&'static str>,
    }

    impl EncodingStore for FlakyStore {
        fn get(&self, ns: &str, encoded: &str) -> Result<Option<String>> {
            self.inner.get(ns, encoded)
        }
        fn keys(&self, ns: &str) -> Result<BTreeSet<String>> {
            self.inner.keys(ns)
        }
        fn entries(&self, ns: &str) -> Result<Vec<(String, String)>> {
            self.inner.entries(ns)
        }
        fn insert_if_absent(&self, ns: &str, encoded: &str, decoded: &str) -> Result<InsertOutcome> {
            if self.reject.iter().any(|r| *r == encoded) {
                return Err(SsrError::Registry(format!("write rejected: {encoded}")));
            }
            self.inner.insert_if_absent(ns, encoded, decoded)
        }
        fn namespaces(&self) -> Result<Vec<String>> {
            self.inner.namespaces()
        }
    }

    #[test]
    fn rejects_invalid_namespace() {
        let store = MemoryStore::new();
        assert!(matches!(
            EncodingRegistry::new(&store, "Bad Name"),
            Err(SsrError::InvalidNamespace(_))
        ));
    }

    #[test]
    fn insert_many_is_idempotent() {
        let store = MemoryStore::new();
        let registry = EncodingRegistry::new(&store, "mlb_sit_views").unwrap();
        let pairs = vec![
            EncodingPair::new("A", "StalePricing"),
            EncodingPair::new("B", "Settled"),
        ];

        let first = registry.insert_many(pairs.clone());
        assert_eq!(first.inserted.len(), 2);

        let second = registry.insert_many(pairs);
        assert!(second.inserted.is_empty());
        assert_eq!(second.already_present.len(), 2);
        assert!(second.is_complete());
        assert!(registry.contains("A").unwrap());
        assert_eq!(registry.get_known().unwrap().len(), 2);
    }

    #[test]
    fn partial_failure_reported_per_pair() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            reject: vec!["B"],
        };
        let registry = EncodingRegistry::new(&store, "mlb_sit_views").unwrap();
        let report = registry.insert_many([
            EncodingPair::new("A", "StalePricing"),
            EncodingPair::new("B", "Settled"),
            EncodingPair::new("C", "OutsideLineRange"),
        ]);

        assert_eq!(report.inserted.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.encoded, "B");
        assert!(report.failed[0].1.contains("write rejected"));
        // earlier and later successes stay written
        assert!(registry.contains("A").unwrap());
        assert!(registry.contains("C").unwrap());
        assert!(!registry.contains("B").unwrap());
    }

    #[test]
    fn conflicting_value_keeps_stored() {
        let store = MemoryStore::new();
        let registry = EncodingRegistry::new(&store, "mlb_sit_views").unwrap();
        registry.insert_many([EncodingPair::new("A", "StalePricing")]);
        let report = registry.insert_many([EncodingPair::new("A", "Stale Pricing")]);
        assert_eq!(report.already_present.len(), 1);
        assert_eq!(registry.get("A").unwrap().as_deref(), Some("StalePricing"));
    }

    #[test]
    fn list_returns_pairs() {
        let store = MemoryStore::new();
        let registry = EncodingRegistry::new(&store, "mlb_sit_views").unwrap();
        registry.insert_many([EncodingPair::new("AB", "StalePricing;Settled")]);
        assert_eq!(
            registry.list().unwrap(),
            vec![EncodingPair::new("AB", "StalePricing;Settled")]
        );
    }
}
