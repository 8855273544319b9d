//! RocksDB-backed `KvStore`.
//!
//! Staged writes go into one `WriteBatch`, which RocksDB applies atomically.
//! Read validation and the batch write happen under a commit lock so that
//! check-then-write is serializable across threads sharing the handle.

use std::path::Path;
use std::sync::Mutex;

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};

use super::{stale_reads, BatchOp, KvStore, Transaction};
use crate::error::{Result, StoreError};

pub struct RocksStore {
    db: DB,
    commit_lock: Mutex<()>,
}

fn storage_err(err: rocksdb::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

impl RocksStore {
    pub fn open(path: &Path, create_if_missing: bool) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(create_if_missing);
        let db = DB::open(&options, path).map_err(storage_err)?;
        Ok(Self {
            db,
            commit_lock: Mutex::new(()),
        })
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(key).map_err(storage_err)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(storage_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }

    fn get_many(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        self.db
            .multi_get(keys)
            .into_iter()
            .map(|r| r.map_err(storage_err))
            .collect()
    }

    fn commit(&self, txn: Transaction) -> Result<()> {
        let (ops, reads) = txn.into_parts();
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| StoreError::Storage("rocksdb commit lock poisoned".into()))?;

        let stale = stale_reads(&reads, |k| self.get(k))?;
        if stale > 0 {
            return Err(StoreError::Conflict(stale));
        }

        if ops.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => batch.put(key, value),
                BatchOp::Delete { key } => batch.delete(key),
            }
        }
        self.db.write(batch).map_err(storage_err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
