use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, SsrError};

use super::{EncodingStore, InsertOutcome};

type Tables = BTreeMap<String, BTreeMap<String, String>>;

/// In-process store. Nothing survives the process; used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| SsrError::Registry("memory store lock poisoned".into()))
    }
}

impl EncodingStore for MemoryStore {
    fn get(&self, namespace: &str, encoded: &str) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .get(namespace)
            .and_then(|t| t.get(encoded))
            .cloned())
    }

    fn keys(&self, namespace: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .lock()?
            .get(namespace)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .lock()?
            .get(namespace)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn insert_if_absent(
        &self,
        namespace: &str,
        encoded: &str,
        decoded: &str,
    ) -> Result<InsertOutcome> {
        let mut tables = self.lock()?;
        let table = tables.entry(namespace.to_string()).or_default();
        if let Some(existing) = table.get(encoded) {
            return Ok(InsertOutcome::AlreadyPresent {
                existing: existing.clone(),
            });
        }
        table.insert(encoded.to_string(), decoded.to_string());
        Ok(InsertOutcome::Inserted)
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
