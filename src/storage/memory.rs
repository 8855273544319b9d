//! In-memory `KvStore` over a `BTreeMap`.
//!
//! Commits validate and apply under one write lock, which makes them
//! serializable. Used by tests and by nodes that do not need durability.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{stale_reads, BatchOp, KvStore, Transaction};
use crate::error::{Result, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits that carried at least one write.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> Result<usize> {
        let map = self.map.read().map_err(|_| poisoned())?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy of the full key space, for state comparisons.
    pub fn snapshot(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let map = self.map.read().map_err(|_| poisoned())?;
        Ok(map.clone())
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("memory store lock poisoned".into())
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let map = self.map.read().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read().map_err(|_| poisoned())?;
        Ok(map
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&self, txn: Transaction) -> Result<()> {
        let (ops, reads) = txn.into_parts();
        let mut map = self.map.write().map_err(|_| poisoned())?;

        let stale = stale_reads(&reads, |k| Ok(map.get(k).cloned()))?;
        if stale > 0 {
            return Err(StoreError::Conflict(stale));
        }

        if ops.is_empty() {
            return Ok(());
        }

        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
