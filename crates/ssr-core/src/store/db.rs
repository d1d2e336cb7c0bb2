//! Durable encoding store on redb.
//!
//! # Table design
//!
//! One redb table per namespace, named `encodings/<namespace>`:
//! ```text
//! key:   encoded string   (&str)
//! value: decoded string   (&str)
//! ```
//!
//! redb holds an exclusive lock on the file for as long as a `Database` is
//! open. Overlapping runs must be able to share one registry file, so the
//! store opens the database per operation and retries with backoff while
//! another process (or handle) has it open. Within an operation the
//! get-then-insert of `insert_if_absent` runs in one write transaction.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use redb::{Database, DatabaseError, ReadableTable, TableDefinition, TableError, TableHandle};
use tracing::debug;

use crate::error::{Result, SsrError};
use crate::io;

use super::{EncodingStore, InsertOutcome};

// ---------------------------------------------------------------------------
// Table naming
// ---------------------------------------------------------------------------

const TABLE_PREFIX: &str = "encodings/";

fn table_name(namespace: &str) -> String {
    format!("{TABLE_PREFIX}{namespace}")
}

fn definition(name: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(name)
}

fn db_err(e: impl std::fmt::Display) -> SsrError {
    SsrError::Registry(e.to_string())
}

// ---------------------------------------------------------------------------
// OpenRetry
// ---------------------------------------------------------------------------

/// How long to wait for a registry file that another handle has open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRetry {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for OpenRetry {
    fn default() -> Self {
        Self {
            attempts: 60,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(250),
        }
    }
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

pub struct RedbStore {
    path: PathBuf,
    retry: OpenRetry,
}

impl RedbStore {
    /// Create the database at `path` if needed (and its parent directories),
    /// then release it. Every later operation reopens the file.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_retry(path, OpenRetry::default())
    }

    pub fn open_with_retry(path: &Path, retry: OpenRetry) -> Result<Self> {
        if let Some(parent) = path.parent() {
            io::ensure_dir(parent)?;
        }
        let store = Self {
            path: path.to_path_buf(),
            retry,
        };
        store.connect()?;
        Ok(store)
    }

    /// Open the database, waiting out other holders of the file lock.
    fn connect(&self) -> Result<Database> {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 1;
        loop {
            match Database::create(&self.path) {
                Ok(db) => return Ok(db),
                Err(DatabaseError::DatabaseAlreadyOpen) if attempt < self.retry.attempts => {
                    debug!(path = %self.path.display(), attempt, "registry busy; retrying");
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(self.retry.max_delay);
                    attempt += 1;
                }
                Err(e) => return Err(db_err(e)),
            }
        }
    }

    /// Read every row of `namespace`, or nothing if the table was never created.
    fn scan(&self, namespace: &str) -> Result<Vec<(String, String)>> {
        let name = table_name(namespace);
        let db = self.connect()?;
        let rt = db.begin_read().map_err(db_err)?;
        let table = match rt.open_table(definition(&name)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(db_err(e)),
        };

        let mut rows = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (k, v) = entry.map_err(db_err)?;
            rows.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(rows)
    }
}

impl EncodingStore for RedbStore {
    fn get(&self, namespace: &str, encoded: &str) -> Result<Option<String>> {
        let name = table_name(namespace);
        let db = self.connect()?;
        let rt = db.begin_read().map_err(db_err)?;
        let table = match rt.open_table(definition(&name)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(db_err(e)),
        };
        let value = table.get(encoded).map_err(db_err)?;
        Ok(value.map(|v| v.value().to_string()))
    }

    fn keys(&self, namespace: &str) -> Result<BTreeSet<String>> {
        Ok(self.scan(namespace)?.into_iter().map(|(k, _)| k).collect())
    }

    fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>> {
        self.scan(namespace)
    }

    fn insert_if_absent(
        &self,
        namespace: &str,
        encoded: &str,
        decoded: &str,
    ) -> Result<InsertOutcome> {
        let name = table_name(namespace);
        let db = self.connect()?;
        let wt = db.begin_write().map_err(db_err)?;
        let outcome = {
            let mut table = wt.open_table(definition(&name)).map_err(db_err)?;
            let existing = table
                .get(encoded)
                .map_err(db_err)?
                .map(|v| v.value().to_string());
            match existing {
                Some(existing) => InsertOutcome::AlreadyPresent { existing },
                None => {
                    table.insert(encoded, decoded).map_err(db_err)?;
                    InsertOutcome::Inserted
                }
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(outcome)
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        let db = self.connect()?;
        let rt = db.begin_read().map_err(db_err)?;
        let mut names = Vec::new();
        for handle in rt.list_tables().map_err(db_err)? {
            if let Some(ns) = handle.name().strip_prefix(TABLE_PREFIX) {
                names.push(ns.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RedbStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("registry.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_namespace_reads_empty() {
        let (_dir, store) = open_tmp();
        assert!(store.keys("mlb_sit_views").unwrap().is_empty());
        assert!(store.entries("mlb_sit_views").unwrap().is_empty());
        assert_eq!(store.get("mlb_sit_views", "A").unwrap(), None);
        assert!(store.namespaces().unwrap().is_empty());
    }

    #[test]
    fn insert_then_get() {
        let (_dir, store) = open_tmp();
        let outcome = store
            .insert_if_absent("mlb_sit_views", "AB", "StalePricing;Settled")
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(
            store.get("mlb_sit_views", "AB").unwrap().as_deref(),
            Some("StalePricing;Settled")
        );
    }

    #[test]
    fn second_insert_is_already_present_and_keeps_value() {
        let (_dir, store) = open_tmp();
        store.insert_if_absent("mlb_sit_views", "A", "StalePricing").unwrap();
        let outcome = store.insert_if_absent("mlb_sit_views", "A", "Different").unwrap();
        assert_eq!(
            outcome,
            InsertOutcome::AlreadyPresent {
                existing: "StalePricing".into()
            }
        );
        assert_eq!(store.entries("mlb_sit_views").unwrap().len(), 1);
    }

    #[test]
    fn entries_are_ordered_and_namespaced() {
        let (_dir, store) = open_tmp();
        store.insert_if_absent("mlb_sit_views", "B", "Settled").unwrap();
        store.insert_if_absent("mlb_sit_views", "A", "StalePricing").unwrap();
        store.insert_if_absent("ncaab_sit_views", "C", "OutsideLineRange").unwrap();

        let rows = store.entries("mlb_sit_views").unwrap();
        assert_eq!(
            rows,
            vec![
                ("A".to_string(), "StalePricing".to_string()),
                ("B".to_string(), "Settled".to_string()),
            ]
        );
        assert_eq!(
            store.namespaces().unwrap(),
            vec!["mlb_sit_views".to_string(), "ncaab_sit_views".to_string()]
        );
    }

    #[test]
    fn reopen_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/registry.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.insert_if_absent("mlb_sit_views", "K", "SettlementCorrection").unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert!(store.keys("mlb_sit_views").unwrap().contains("K"));
    }

    #[test]
    fn two_handles_share_one_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.redb");
        let first = RedbStore::open(&path).unwrap();
        first.insert_if_absent("mlb_sit_views", "A", "StalePricing").unwrap();

        let second = RedbStore::open(&path).unwrap();
        assert_eq!(
            second.insert_if_absent("mlb_sit_views", "A", "StalePricing").unwrap(),
            InsertOutcome::AlreadyPresent {
                existing: "StalePricing".into()
            }
        );
        second.insert_if_absent("mlb_sit_views", "C", "OutsideLineRange").unwrap();
        assert_eq!(first.keys("mlb_sit_views").unwrap().len(), 2);
    }

    #[test]
    fn waits_for_a_held_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.redb");
        let store = RedbStore::open(&path).unwrap();

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder_path = path.clone();
        let holder = std::thread::spawn(move || {
            let db = Database::create(&holder_path).unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(150));
            drop(db);
        });
        locked_rx.recv().unwrap();

        let outcome = store.insert_if_absent("mlb_sit_views", "B", "Settled").unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        holder.join().unwrap();
    }

    #[test]
    fn gives_up_after_bounded_retries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.redb");
        let _held = Database::create(&path).unwrap();

        let retry = OpenRetry {
            attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        match RedbStore::open_with_retry(&path, retry) {
            Err(SsrError::Registry(msg)) => assert!(msg.contains("already open"), "{msg}"),
            Err(other) => panic!("expected Registry error, got {other:?}"),
            Ok(_) => panic!("expected the held lock to block the open"),
        }
    }

    #[test]
    fn racing_writers_store_one_value() {
        let (_dir, store) = open_tmp();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .insert_if_absent("mlb_sit_views", "AB", &format!("writer-{i}"))
                        .unwrap()
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == InsertOutcome::Inserted)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(store.entries("mlb_sit_views").unwrap().len(), 1);
    }
}
