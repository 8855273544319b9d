//! Ordered key-value backend contract.
//!
//! The stores never talk to a database directly; they go through `KvStore`,
//! a sorted byte-key map with point reads, prefix scans and atomic batch
//! commit. Keys and values are raw bytes ordered unsigned-lexicographically.
//!
//! A `Transaction` stages puts/deletes and remembers every value it read.
//! `commit` re-checks those reads and applies the staged writes as one unit,
//! so two merges racing on the same key cannot both succeed against stale
//! state: the loser gets `StoreError::Conflict` and may retry.

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::Result;

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

/// Shared backend handle passed to every store.
pub type DbHandle = Arc<dyn KvStore>;

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// Sorted byte-key store with atomic batch commit.
pub trait KvStore: Send + Sync {
    /// Point read. `Ok(None)` when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All `(key, value)` pairs whose key starts with `prefix`, ascending.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Validate the transaction's recorded reads and apply its writes
    /// atomically. Either every write becomes visible or none does.
    fn commit(&self, txn: Transaction) -> Result<()>;

    /// Batch point read, results in input order.
    fn get_many(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    /// Start an empty transaction.
    fn transaction(&self) -> Transaction {
        Transaction::new()
    }

    /// Single-key put, committed on its own.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.commit(Transaction::new().put(key.to_vec(), value.to_vec()))
    }

    /// Single-key delete, committed on its own.
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.commit(Transaction::new().delete(key.to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A staged write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Staged writes plus the reads they were derived from.
///
/// Staging methods take and return the transaction by value so each step of
/// a merge threads the batch through explicitly. Dropping it discards
/// everything.
#[derive(Clone, Debug, Default)]
#[must_use = "a transaction does nothing until committed"]
pub struct Transaction {
    ops: Vec<BatchOp>,
    reads: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read through the backend, recording the observed value so `commit`
    /// can detect a concurrent change.
    pub fn read(&mut self, db: &dyn KvStore, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = db.get(key)?;
        self.reads.push((key.to_vec(), value.clone()));
        Ok(value)
    }

    /// Stage a put.
    pub fn put(mut self, key: Vec<u8>, value: Vec<u8>) -> Self {
        self.ops.push(BatchOp::Put { key, value });
        self
    }

    /// Stage a delete.
    pub fn delete(mut self, key: Vec<u8>) -> Self {
        self.ops.push(BatchOp::Delete { key });
        self
    }

    /// Staged writes, in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Recorded reads.
    pub fn reads(&self) -> &[(Vec<u8>, Option<Vec<u8>>)] {
        &self.reads
    }

    /// No writes staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Split into writes and reads for a backend's commit.
    pub fn into_parts(self) -> (Vec<BatchOp>, Vec<(Vec<u8>, Option<Vec<u8>>)>) {
        (self.ops, self.reads)
    }
}

/// Count reads whose observed value differs from what `current` returns now.
pub(crate) fn stale_reads<F>(reads: &[(Vec<u8>, Option<Vec<u8>>)], mut current: F) -> Result<usize>
where
    F: FnMut(&[u8]) -> Result<Option<Vec<u8>>>,
{
    let mut stale = 0;
    for (key, observed) in reads {
        if current(key)? != *observed {
            stale += 1;
        }
    }
    Ok(stale)
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

/// Open the backend selected by `config`: in-memory when no path is set,
/// RocksDB otherwise.
pub fn open(config: &StoreConfig) -> Result<DbHandle> {
    match &config.db_path {
        None => {
            log::debug!("opening in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb")]
        Some(path) => {
            log::debug!("opening rocksdb store at {}", path.display());
            Ok(Arc::new(RocksStore::open(path, config.create_if_missing)?))
        }
        #[cfg(not(feature = "rocksdb"))]
        Some(path) => Err(crate::error::StoreError::Storage(format!(
            "cannot open {}: built without the `rocksdb` feature",
            path.display()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_staging_order() {
        let txn = Transaction::new()
            .put(b"a".to_vec(), b"1".to_vec())
            .delete(b"b".to_vec())
            .put(b"c".to_vec(), b"3".to_vec());
        assert_eq!(txn.ops().len(), 3);
        assert_eq!(txn.ops()[1], BatchOp::Delete { key: b"b".to_vec() });
        assert!(!txn.is_empty());
        assert!(Transaction::new().is_empty());
    }

    #[test]
    fn test_transaction_records_reads() {
        let db = MemoryStore::new();
        db.put(b"k", b"v").unwrap();

        let mut txn = db.transaction();
        assert_eq!(txn.read(&db, b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(txn.read(&db, b"missing").unwrap(), None);
        assert_eq!(txn.reads().len(), 2);
        assert_eq!(txn.reads()[1], (b"missing".to_vec(), None));
    }

    #[test]
    fn test_stale_reads_counts_changes() {
        let reads = vec![
            (b"a".to_vec(), Some(b"1".to_vec())),
            (b"b".to_vec(), None),
        ];
        let unchanged = stale_reads(&reads, |k| {
            Ok(if k == b"a" { Some(b"1".to_vec()) } else { None })
        })
        .unwrap();
        assert_eq!(unchanged, 0);

        let changed = stale_reads(&reads, |_| Ok(Some(b"x".to_vec()))).unwrap();
        assert_eq!(changed, 2);
    }

    #[test]
    fn test_open_default_is_memory() {
        let db = open(&StoreConfig::default()).unwrap();
        db.put(b"x", b"y").unwrap();
        assert_eq!(db.get(b"x").unwrap(), Some(b"y".to_vec()));
    }

    #[cfg(not(feature = "rocksdb"))]
    #[test]
    fn test_open_path_without_rocksdb_fails() {
        use crate::error::StoreError;

        let config = StoreConfig {
            db_path: Some("/tmp/hubstore-test".into()),
            ..StoreConfig::default()
        };
        let err = open(&config).err().unwrap();
        assert!(matches!(err, StoreError::Storage(_)));
    }
}
