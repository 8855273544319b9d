/// Ownership (IdRegistry) events — which custody address controls an fid.
///
/// Only the causally latest event per fid is kept, ordered by
/// `(block_number, log_index)`. Two events that agree on position but
/// disagree on block or transaction hash mean upstream handed us data from
/// a forked or malformed chain. That is surfaced as a consistency violation
/// and never resolved by picking a side.
///
/// Events are stored independently of messages: a transfer changes the
/// default scope for reads, it never moves or deletes stored sets.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{Result, StoreError};
use crate::ids::Fid;
use crate::keys::id_registry_event_key;
use crate::limits::ADDRESS_LEN;
use crate::message::MessageError;
use crate::storage::DbHandle;

// ---------------------------------------------------------------------------
// IdRegistryEvent
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IdRegistryEventType {
    Register = 1,
    Transfer = 2,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IdRegistryEvent {
    pub fid: Fid,
    pub event_type: IdRegistryEventType,
    pub block_number: u64,
    pub log_index: u32,
    pub block_hash: [u8; 32],
    pub transaction_hash: [u8; 32],
    /// New custody address.
    pub to: [u8; ADDRESS_LEN],
}

impl IdRegistryEvent {
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, MessageError> {
        bincode::serialize(self).map_err(|e| MessageError::BincodeError(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, MessageError> {
        bincode::deserialize(bytes).map_err(|e| MessageError::BincodeError(e.to_string()))
    }
}

/// Causal order of two events for the same fid.
///
/// Fails with `Consistency` if the events share a block number but not a
/// block hash, or share a log position but not a transaction hash.
pub fn event_compare(a: &IdRegistryEvent, b: &IdRegistryEvent) -> Result<Ordering> {
    match a.block_number.cmp(&b.block_number) {
        Ordering::Equal => {}
        other => return Ok(other),
    }

    // Cannot happen unless uncle blocks leak through upstream
    if a.block_hash != b.block_hash {
        return Err(StoreError::Consistency(format!(
            "block hash mismatch at block {} for fid {}",
            a.block_number, a.fid
        )));
    }

    match a.log_index.cmp(&b.log_index) {
        Ordering::Equal => {}
        other => return Ok(other),
    }

    // Cannot happen unless upstream passes malformed data
    if a.transaction_hash != b.transaction_hash {
        return Err(StoreError::Consistency(format!(
            "tx hash mismatch at block {} log {} for fid {}",
            a.block_number, a.log_index, a.fid
        )));
    }

    Ok(Ordering::Equal)
}

// ---------------------------------------------------------------------------
// IdRegistry
// ---------------------------------------------------------------------------

/// Current-ownership tracker over the shared backend.
#[derive(Clone)]
pub struct IdRegistry {
    db: DbHandle,
}

impl IdRegistry {
    pub fn new(db: DbHandle) -> Self {
        IdRegistry { db }
    }

    /// The most recent event that affected `fid`, if any.
    pub fn get_id_registry_event(&self, fid: Fid) -> Result<Option<IdRegistryEvent>> {
        match self.db.get(&id_registry_event_key(fid))? {
            Some(bytes) => Ok(Some(IdRegistryEvent::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The custody address that currently owns `fid`. `None` means the fid
    /// has no established scope yet.
    pub fn get_custody_address(&self, fid: Fid) -> Result<Option<[u8; ADDRESS_LEN]>> {
        Ok(self.get_id_registry_event(fid)?.map(|e| e.to))
    }

    /// Store `event` if it is causally later than the stored one.
    ///
    /// Returns `Ok(true)` if written, `Ok(false)` if the stored event is
    /// already at or past it.
    pub fn merge_id_registry_event(&self, event: &IdRegistryEvent) -> Result<bool> {
        let key = id_registry_event_key(event.fid);
        let mut txn = self.db.transaction();

        if let Some(bytes) = txn.read(self.db.as_ref(), &key)? {
            let existing = IdRegistryEvent::from_bytes(&bytes)?;
            let order = event_compare(&existing, event).map_err(|e| {
                log::error!("fid {}: refusing id registry event: {}", event.fid, e);
                e
            })?;
            if order != Ordering::Less {
                log::debug!(
                    "fid {}: id registry event at block {} superseded",
                    event.fid,
                    event.block_number
                );
                return Ok(false);
            }
        }

        let txn = txn.put(key, event.to_bytes()?);
        self.db.commit(txn)?;

        log::info!(
            "fid {}: custody now {} ({:?} at block {} log {})",
            event.fid,
            hex::encode(event.to),
            event.event_type,
            event.block_number,
            event.log_index
        );
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    pub(crate) fn make_event(fid: Fid, block_number: u64, log_index: u32, to: u8) -> IdRegistryEvent {
        IdRegistryEvent {
            fid,
            event_type: IdRegistryEventType::Transfer,
            block_number,
            log_index,
            block_hash: [block_number as u8; 32],
            transaction_hash: [(block_number as u8) ^ (log_index as u8); 32],
            to: [to; ADDRESS_LEN],
        }
    }

    fn registry() -> (Arc<MemoryStore>, IdRegistry) {
        let db = Arc::new(MemoryStore::new());
        let registry = IdRegistry::new(db.clone());
        (db, registry)
    }

    #[test]
    fn test_compare_by_block_then_log() {
        let a = make_event(1, 10, 0, 0xA);
        let b = make_event(1, 11, 0, 0xB);
        assert_eq!(event_compare(&a, &b).unwrap(), Ordering::Less);
        assert_eq!(event_compare(&b, &a).unwrap(), Ordering::Greater);

        let c = make_event(1, 10, 3, 0xC);
        assert_eq!(event_compare(&a, &c).unwrap(), Ordering::Less);
        assert_eq!(event_compare(&a, &a).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_compare_block_hash_mismatch_is_fatal() {
        let a = make_event(1, 10, 0, 0xA);
        let mut b = make_event(1, 10, 1, 0xB);
        b.block_hash = [0xFF; 32];
        let err = event_compare(&a, &b).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_compare_tx_hash_mismatch_is_fatal() {
        let a = make_event(1, 10, 2, 0xA);
        let mut b = a.clone();
        b.transaction_hash = [0xEE; 32];
        assert!(matches!(event_compare(&a, &b), Err(StoreError::Consistency(_))));
    }

    #[test]
    fn test_no_event_means_no_scope() {
        let (_db, registry) = registry();
        assert!(registry.get_id_registry_event(5).unwrap().is_none());
        assert!(registry.get_custody_address(5).unwrap().is_none());
    }

    #[test]
    fn test_later_event_overwrites() {
        let (_db, registry) = registry();
        assert!(registry.merge_id_registry_event(&make_event(1, 10, 0, 0xA)).unwrap());
        assert_eq!(registry.get_custody_address(1).unwrap(), Some([0xA; 20]));

        assert!(registry.merge_id_registry_event(&make_event(1, 12, 0, 0xB)).unwrap());
        assert_eq!(registry.get_custody_address(1).unwrap(), Some([0xB; 20]));
    }

    #[test]
    fn test_earlier_or_equal_event_is_noop() {
        let (db, registry) = registry();
        let latest = make_event(1, 20, 4, 0xA);
        registry.merge_id_registry_event(&latest).unwrap();
        let commits = db.commit_count();

        assert!(!registry.merge_id_registry_event(&make_event(1, 19, 9, 0xB)).unwrap());
        assert!(!registry.merge_id_registry_event(&latest).unwrap());
        assert_eq!(db.commit_count(), commits);
        assert_eq!(registry.get_id_registry_event(1).unwrap(), Some(latest));
    }

    #[test]
    fn test_conflicting_event_raises_and_keeps_stored() {
        let (_db, registry) = registry();
        let stored = make_event(1, 30, 0, 0xA);
        registry.merge_id_registry_event(&stored).unwrap();

        let mut forked = make_event(1, 30, 1, 0xB);
        forked.block_hash = [0x99; 32];
        let err = registry.merge_id_registry_event(&forked).unwrap_err();
        assert!(matches!(err, StoreError::Consistency(_)));
        assert_eq!(registry.get_id_registry_event(1).unwrap(), Some(stored));
    }

    #[test]
    fn test_fids_are_independent() {
        let (_db, registry) = registry();
        registry.merge_id_registry_event(&make_event(1, 50, 0, 0xA)).unwrap();
        registry.merge_id_registry_event(&make_event(2, 10, 0, 0xB)).unwrap();
        assert_eq!(registry.get_custody_address(1).unwrap(), Some([0xA; 20]));
        assert_eq!(registry.get_custody_address(2).unwrap(), Some([0xB; 20]));
    }
}
