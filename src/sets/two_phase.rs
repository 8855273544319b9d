/// Generic two-phase set engine, parameterised by a `SetSpec`.
///
/// `merge` is the single entry point for writes. It classifies the message,
/// resolves it against the stored Remove and Add entries for the same
/// `(fid, scope, target)`, and commits the eviction of any losers together
/// with the insertion of the winner as one transaction. A message that does
/// not beat the stored entries is a no-op and writes nothing, so re-merging
/// is always safe.
use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::error::{Result, StoreError};
use crate::events::{MergeOutcome, StoreEvent, StoreOperation};
use crate::ids::{Fid, TsHash};
use crate::keys::{message_key, set_index_key, user_postfix_prefix};
use crate::limits::{check_body_len, MAX_BODY_BYTES, MAX_TARGET_LEN};
use crate::message::Message;
use crate::registry::IdRegistry;
use crate::sets::{message_compare, ScopeKind, SetSpec, Side};
use crate::storage::{DbHandle, Transaction};

pub struct TwoPhaseSet<S: SetSpec> {
    db: DbHandle,
    registry: IdRegistry,
    max_body_bytes: usize,
    _spec: PhantomData<S>,
}

impl<S: SetSpec> Clone for TwoPhaseSet<S> {
    fn clone(&self) -> Self {
        TwoPhaseSet {
            db: self.db.clone(),
            registry: self.registry.clone(),
            max_body_bytes: self.max_body_bytes,
            _spec: PhantomData,
        }
    }
}

/// Validated coordinates of an inbound message.
struct Placement {
    side: Side,
    scope: Vec<u8>,
    target: Vec<u8>,
}

impl<S: SetSpec> TwoPhaseSet<S> {
    pub fn new(db: DbHandle, registry: IdRegistry) -> Self {
        TwoPhaseSet {
            db,
            registry,
            max_body_bytes: MAX_BODY_BYTES,
            _spec: PhantomData,
        }
    }

    /// Override the max accepted body size.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// The ownership tracker used to resolve default scopes.
    pub fn registry(&self) -> &IdRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Merge an Add or Remove message into the set.
    pub fn merge(&self, message: &Message) -> Result<MergeOutcome> {
        let placement = self.validate(message)?;

        let txn = self.db.transaction();
        let Some((txn, evicted)) = self.resolve_merge_conflicts(txn, message, &placement)? else {
            log::debug!(
                "{}: fid {} {} {} superseded, no-op",
                S::NAME,
                message.fid,
                message.message_type.as_str(),
                message.ts_hash()
            );
            return Ok(MergeOutcome::noop());
        };

        let txn = self.put_transaction(txn, message, &placement)?;
        self.db.commit(txn)?;

        log::debug!(
            "{}: fid {} merged {} {} (evicted {})",
            S::NAME,
            message.fid,
            message.message_type.as_str(),
            message.ts_hash(),
            evicted.len()
        );

        let mut events: Vec<StoreEvent> = evicted
            .iter()
            .map(|m| StoreEvent::new(StoreOperation::Delete, m))
            .collect();
        events.push(StoreEvent::new(StoreOperation::Merge, message));
        Ok(MergeOutcome { events })
    }

    /// Reject malformed input before touching the backend.
    fn validate(&self, message: &Message) -> Result<Placement> {
        let side = S::side_of(message.message_type).ok_or_else(|| {
            StoreError::BadRequest(format!(
                "{} is not a {} message",
                message.message_type.as_str(),
                S::NAME
            ))
        })?;

        if !check_body_len(message.body.len(), self.max_body_bytes) {
            return Err(StoreError::BadRequest(format!(
                "body of {} bytes exceeds {}",
                message.body.len(),
                self.max_body_bytes
            )));
        }

        let scope = match S::SCOPE {
            ScopeKind::Custody => {
                if message.signer.len() != S::SCOPE.len() {
                    return Err(StoreError::BadRequest(format!(
                        "custody address must be {} bytes, got {}",
                        S::SCOPE.len(),
                        message.signer.len()
                    )));
                }
                message.signer.clone()
            }
            ScopeKind::User => Vec::new(),
        };

        let target = S::target(message)?;
        check_target(&target)?;

        Ok(Placement {
            side,
            scope,
            target,
        })
    }

    /// Compare `message` with the stored Remove and Add entries for its
    /// target and stage the eviction of whichever it beats.
    ///
    /// Returns `None` if a stored entry is at or above `message` in the
    /// conflict order; nothing should be written.
    fn resolve_merge_conflicts(
        &self,
        mut txn: Transaction,
        message: &Message,
        placement: &Placement,
    ) -> Result<Option<(Transaction, Vec<Message>)>> {
        let incoming = message.ts_hash();
        let mut evicted = Vec::new();

        for stored_side in [Side::Remove, Side::Add] {
            let index_key = set_index_key(
                message.fid,
                S::index_postfix(stored_side),
                &placement.scope,
                Some(&placement.target),
            );
            let Some(bytes) = txn.read(self.db.as_ref(), &index_key)? else {
                continue;
            };
            let stored = parse_ts_hash(&bytes, &index_key)?;

            if message_compare(stored_side, &stored, placement.side, &incoming) != Ordering::Less {
                return Ok(None);
            }

            let Some(existing) = self.read_message(&mut txn, message.fid, &stored)? else {
                let reason = format!(
                    "{}: index {} points at missing message {}",
                    S::NAME,
                    hex::encode(&index_key),
                    stored
                );
                log::error!("fid {}: {}", message.fid, reason);
                return Err(StoreError::Consistency(reason));
            };
            txn = self.delete_transaction(txn, &existing, stored_side, placement);
            evicted.push(existing);
        }

        Ok(Some((txn, evicted)))
    }

    /// Stage the message record and its index entry.
    fn put_transaction(
        &self,
        txn: Transaction,
        message: &Message,
        placement: &Placement,
    ) -> Result<Transaction> {
        let ts_hash = message.ts_hash();
        let txn = txn.put(
            message_key(message.fid, S::MESSAGE_POSTFIX, &ts_hash),
            message.to_bytes()?,
        );
        Ok(txn.put(
            set_index_key(
                message.fid,
                S::index_postfix(placement.side),
                &placement.scope,
                Some(&placement.target),
            ),
            ts_hash.as_bytes().to_vec(),
        ))
    }

    /// Stage removal of a stored message and its index entry.
    fn delete_transaction(
        &self,
        txn: Transaction,
        existing: &Message,
        side: Side,
        placement: &Placement,
    ) -> Transaction {
        txn.delete(set_index_key(
            existing.fid,
            S::index_postfix(side),
            &placement.scope,
            Some(&placement.target),
        ))
        .delete(message_key(existing.fid, S::MESSAGE_POSTFIX, &existing.ts_hash()))
    }

    fn read_message(&self, txn: &mut Transaction, fid: Fid, ts_hash: &TsHash) -> Result<Option<Message>> {
        match txn.read(self.db.as_ref(), &message_key(fid, S::MESSAGE_POSTFIX, ts_hash))? {
            Some(bytes) => Ok(Some(Message::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Load a stored message of this set by tsHash.
    pub fn get_message(&self, fid: Fid, ts_hash: &TsHash) -> Result<Option<Message>> {
        match self.db.get(&message_key(fid, S::MESSAGE_POSTFIX, ts_hash))? {
            Some(bytes) => Ok(Some(Message::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stored Add for `target`, in `scope` or the default scope.
    pub fn get_add(&self, fid: Fid, target: &[u8], scope: Option<&[u8]>) -> Result<Option<Message>> {
        self.get_by_side(Side::Add, fid, target, scope)
    }

    /// Stored Remove for `target`, in `scope` or the default scope.
    pub fn get_remove(&self, fid: Fid, target: &[u8], scope: Option<&[u8]>) -> Result<Option<Message>> {
        self.get_by_side(Side::Remove, fid, target, scope)
    }

    /// Every stored Add in a scope, ordered by target bytes.
    pub fn get_adds_by_user(&self, fid: Fid, scope: Option<&[u8]>) -> Result<Vec<Message>> {
        self.list_by_side(Side::Add, fid, scope)
    }

    /// Every stored Remove in a scope, ordered by target bytes.
    pub fn get_removes_by_user(&self, fid: Fid, scope: Option<&[u8]>) -> Result<Vec<Message>> {
        self.list_by_side(Side::Remove, fid, scope)
    }

    /// Every message record of this set for `fid`, across all scopes, in
    /// tsHash (chronological) order.
    pub fn get_all_messages(&self, fid: Fid) -> Result<Vec<Message>> {
        self.db
            .scan_prefix(&user_postfix_prefix(fid, S::MESSAGE_POSTFIX))?
            .into_iter()
            .map(|(_, bytes)| Message::from_bytes(&bytes).map_err(StoreError::from))
            .collect()
    }

    fn get_by_side(
        &self,
        side: Side,
        fid: Fid,
        target: &[u8],
        scope: Option<&[u8]>,
    ) -> Result<Option<Message>> {
        check_target(target)?;
        let Some(scope) = self.resolve_scope(fid, scope)? else {
            return Ok(None);
        };

        let index_key = set_index_key(fid, S::index_postfix(side), &scope, Some(target));
        let Some(bytes) = self.db.get(&index_key)? else {
            return Ok(None);
        };
        let ts_hash = parse_ts_hash(&bytes, &index_key)?;
        self.get_message(fid, &ts_hash)
    }

    fn list_by_side(&self, side: Side, fid: Fid, scope: Option<&[u8]>) -> Result<Vec<Message>> {
        let Some(scope) = self.resolve_scope(fid, scope)? else {
            return Ok(Vec::new());
        };

        let prefix = set_index_key(fid, S::index_postfix(side), &scope, None);
        let mut keys = Vec::new();
        for (index_key, value) in self.db.scan_prefix(&prefix)? {
            let ts_hash = parse_ts_hash(&value, &index_key)?;
            keys.push(message_key(fid, S::MESSAGE_POSTFIX, &ts_hash));
        }

        let mut messages = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(self.db.get_many(&keys)?) {
            match value {
                Some(bytes) => messages.push(Message::from_bytes(&bytes)?),
                None => log::warn!("{}: skipping dangling index entry {}", S::NAME, hex::encode(key)),
            }
        }
        Ok(messages)
    }

    /// Explicit scope, or the default one for this set. `None` means the fid
    /// has no custody address yet, so nothing can be stored under it.
    fn resolve_scope(&self, fid: Fid, scope: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        match (scope, S::SCOPE) {
            (Some(scope), kind) => {
                if scope.len() != kind.len() {
                    return Err(StoreError::BadRequest(format!(
                        "{} scope must be {} bytes, got {}",
                        S::NAME,
                        kind.len(),
                        scope.len()
                    )));
                }
                Ok(Some(scope.to_vec()))
            }
            (None, ScopeKind::Custody) => Ok(self.registry.get_custody_address(fid)?.map(|a| a.to_vec())),
            (None, ScopeKind::User) => Ok(Some(Vec::new())),
        }
    }
}

fn check_target(target: &[u8]) -> Result<()> {
    if target.is_empty() || target.len() > MAX_TARGET_LEN {
        return Err(StoreError::BadRequest(format!(
            "target must be 1..={} bytes, got {}",
            MAX_TARGET_LEN,
            target.len()
        )));
    }
    Ok(())
}

fn parse_ts_hash(bytes: &[u8], index_key: &[u8]) -> Result<TsHash> {
    TsHash::from_slice(bytes).ok_or_else(|| {
        let reason = format!(
            "index {} holds {} bytes, expected a tsHash",
            hex::encode(index_key),
            bytes.len()
        );
        log::error!("{}", reason);
        StoreError::Consistency(reason)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::UserPostfix;
    use crate::message::{CastAddBody, CastRemoveBody, MessageType, SignerBody};
    use crate::registry::tests::make_event;
    use crate::sets::{CastSet, SignerSet};
    use crate::storage::{KvStore, MemoryStore};
    use std::sync::Arc;

    const FID: Fid = 42;
    const CUSTODY: [u8; 20] = [0xC1; 20];
    const OTHER_CUSTODY: [u8; 20] = [0xC2; 20];
    const KEY: [u8; 32] = [0x5A; 32];

    fn setup() -> (Arc<MemoryStore>, TwoPhaseSet<SignerSet>) {
        let db = Arc::new(MemoryStore::new());
        let handle: DbHandle = db.clone();
        let set = TwoPhaseSet::new(handle.clone(), IdRegistry::new(handle));
        (db, set)
    }

    /// Signer message with a chosen timestamp and hash prefix.
    fn signer_msg(message_type: MessageType, timestamp: u32, hash_byte: u8, custody: [u8; 20]) -> Message {
        let body = SignerBody { signer: KEY.to_vec() };
        let mut msg = Message::create(FID, message_type, timestamp, custody.to_vec(), &body).unwrap();
        msg.hash = [hash_byte; 32];
        msg
    }

    fn add(timestamp: u32, hash_byte: u8) -> Message {
        signer_msg(MessageType::SignerAdd, timestamp, hash_byte, CUSTODY)
    }

    fn remove(timestamp: u32, hash_byte: u8) -> Message {
        signer_msg(MessageType::SignerRemove, timestamp, hash_byte, CUSTODY)
    }

    fn stored(set: &TwoPhaseSet<SignerSet>) -> (Option<Message>, Option<Message>) {
        (
            set.get_add(FID, &KEY, Some(&CUSTODY)).unwrap(),
            set.get_remove(FID, &KEY, Some(&CUSTODY)).unwrap(),
        )
    }

    // -------------------------------------------------------------------
    // Merge basics
    // -------------------------------------------------------------------

    #[test]
    fn test_merge_add_then_read() {
        let (_db, set) = setup();
        let msg = add(100, 0xAA);
        let outcome = set.merge(&msg).unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.merged().unwrap().ts_hash, msg.ts_hash());

        assert_eq!(stored(&set), (Some(msg.clone()), None));
        assert_eq!(set.get_message(FID, &msg.ts_hash()).unwrap(), Some(msg));
    }

    #[test]
    fn test_remerge_is_idempotent_and_writes_nothing() {
        let (db, set) = setup();
        let msg = add(100, 0xAA);
        set.merge(&msg).unwrap();
        let before = db.snapshot().unwrap();
        let commits = db.commit_count();

        let outcome = set.merge(&msg).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(db.commit_count(), commits);
        assert_eq!(db.snapshot().unwrap(), before);
    }

    #[test]
    fn test_remove_wins_tie_and_evicts_add() {
        let (db, set) = setup();
        let a = add(100, 0xAA);
        let r = remove(100, 0xBB);
        set.merge(&a).unwrap();
        let outcome = set.merge(&r).unwrap();

        let deleted: Vec<_> = outcome.deleted().collect();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].message_type, MessageType::SignerAdd);
        assert_eq!(stored(&set), (None, Some(r.clone())));
        assert_eq!(set.get_message(FID, &a.ts_hash()).unwrap(), None);

        // Original add still loses on replay
        let commits = db.commit_count();
        assert!(set.merge(&a).unwrap().is_noop());
        assert_eq!(db.commit_count(), commits);
        assert_eq!(stored(&set), (None, Some(r)));
    }

    #[test]
    fn test_remove_wins_tie_even_with_lower_hash() {
        let (_db, set) = setup();
        let a = add(100, 0xFF);
        let r = remove(100, 0x00);
        set.merge(&r).unwrap();
        assert!(set.merge(&a).unwrap().is_noop());
        assert_eq!(stored(&set), (None, Some(r)));
    }

    #[test]
    fn test_later_add_replaces_earlier_add() {
        let (db, set) = setup();
        let first = add(100, 0xAA);
        let second = add(200, 0x01);
        set.merge(&first).unwrap();
        set.merge(&second).unwrap();

        assert_eq!(stored(&set), (Some(second.clone()), None));
        assert_eq!(set.get_message(FID, &first.ts_hash()).unwrap(), None);
        // one message record + one index entry
        assert_eq!(db.len().unwrap(), 2);
    }

    #[test]
    fn test_later_add_beats_earlier_remove() {
        let (_db, set) = setup();
        let r = remove(100, 0xAA);
        let a = add(101, 0x00);
        set.merge(&r).unwrap();
        set.merge(&a).unwrap();
        assert_eq!(stored(&set), (Some(a), None));
    }

    #[test]
    fn test_higher_hash_wins_same_side_tie() {
        let (_db, set) = setup();
        let low = add(100, 0x10);
        let high = add(100, 0x20);
        set.merge(&high).unwrap();
        assert!(set.merge(&low).unwrap().is_noop());
        assert_eq!(stored(&set).0, Some(high));
    }

    // -------------------------------------------------------------------
    // Convergence
    // -------------------------------------------------------------------

    fn permutations(items: &[Message]) -> Vec<Vec<Message>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_any_merge_order_converges() {
        let messages = vec![
            add(100, 0xAA),
            remove(100, 0x01),
            add(150, 0x02),
            remove(120, 0xFF),
        ];

        let mut states = Vec::new();
        for order in permutations(&messages) {
            let (db, set) = setup();
            for msg in &order {
                set.merge(msg).unwrap();
            }
            // Replaying everything again changes nothing
            for msg in order.iter().rev() {
                assert!(set.merge(msg).unwrap().is_noop());
            }
            states.push(db.snapshot().unwrap());
        }

        assert_eq!(states.len(), 24);
        assert!(states.windows(2).all(|w| w[0] == w[1]));

        let (_db, set) = setup();
        for msg in &messages {
            set.merge(msg).unwrap();
        }
        assert_eq!(stored(&set), (Some(add(150, 0x02)), None));
    }

    #[test]
    fn test_at_most_one_message_per_target() {
        let (db, set) = setup();
        for (i, msg) in [add(5, 1), remove(3, 2), add(9, 3), remove(9, 0), add(9, 0xFF)]
            .iter()
            .enumerate()
        {
            set.merge(msg).unwrap();
            let (a, r) = stored(&set);
            assert!(a.is_none() || r.is_none(), "both sides stored after merge {}", i);
            assert_eq!(set.get_all_messages(FID).unwrap().len(), 1);
            assert_eq!(db.len().unwrap(), 2);
        }
        assert_eq!(stored(&set), (None, Some(remove(9, 0))));
    }

    // -------------------------------------------------------------------
    // Scopes
    // -------------------------------------------------------------------

    #[test]
    fn test_default_scope_follows_custody() {
        let (_db, set) = setup();
        let msg = add(100, 0xAA);
        set.merge(&msg).unwrap();

        // No ownership event yet → nothing visible by default
        assert_eq!(set.get_add(FID, &KEY, None).unwrap(), None);
        assert!(set.get_adds_by_user(FID, None).unwrap().is_empty());

        set.registry().merge_id_registry_event(&make_event(FID, 1, 0, 0xC1)).unwrap();
        assert_eq!(set.get_add(FID, &KEY, None).unwrap(), Some(msg.clone()));
        assert_eq!(set.get_adds_by_user(FID, None).unwrap(), vec![msg]);
    }

    #[test]
    fn test_transfer_keeps_previous_scope() {
        let (_db, set) = setup();
        let old = add(100, 0xAA);
        let new = signer_msg(MessageType::SignerAdd, 200, 0xBB, OTHER_CUSTODY);
        set.registry().merge_id_registry_event(&make_event(FID, 1, 0, 0xC1)).unwrap();
        set.merge(&old).unwrap();

        set.registry().merge_id_registry_event(&make_event(FID, 2, 0, 0xC2)).unwrap();
        set.merge(&new).unwrap();

        assert_eq!(set.get_adds_by_user(FID, None).unwrap(), vec![new.clone()]);
        assert_eq!(set.get_adds_by_user(FID, Some(&CUSTODY)).unwrap(), vec![old.clone()]);
        assert_eq!(set.get_add(FID, &KEY, Some(&CUSTODY)).unwrap(), Some(old));
        assert_eq!(set.get_add(FID, &KEY, Some(&OTHER_CUSTODY)).unwrap(), Some(new));
    }

    #[test]
    fn test_scopes_do_not_conflict() {
        let (_db, set) = setup();
        let a = add(100, 0xAA);
        let r_other = signer_msg(MessageType::SignerRemove, 500, 0xBB, OTHER_CUSTODY);
        set.merge(&a).unwrap();
        set.merge(&r_other).unwrap();
        assert_eq!(stored(&set), (Some(a), None));
        assert_eq!(set.get_remove(FID, &KEY, Some(&OTHER_CUSTODY)).unwrap(), Some(r_other));
    }

    #[test]
    fn test_listing_orders_by_target() {
        let (_db, set) = setup();
        let mut msgs = Vec::new();
        for (ts, k) in [(300u32, 0x30u8), (100, 0x10), (200, 0x20)] {
            let body = SignerBody { signer: vec![k; 32] };
            let msg = Message::create(FID, MessageType::SignerAdd, ts, CUSTODY.to_vec(), &body).unwrap();
            set.merge(&msg).unwrap();
            msgs.push(msg);
        }
        let listed = set.get_adds_by_user(FID, Some(&CUSTODY)).unwrap();
        let targets: Vec<u8> = listed
            .iter()
            .map(|m| m.decode_body::<SignerBody>().unwrap().signer[0])
            .collect();
        assert_eq!(targets, vec![0x10, 0x20, 0x30]);
        assert!(set.get_removes_by_user(FID, Some(&CUSTODY)).unwrap().is_empty());
    }

    // -------------------------------------------------------------------
    // Input errors
    // -------------------------------------------------------------------

    #[test]
    fn test_wrong_type_rejected_without_backend_call() {
        let (db, set) = setup();
        let body = CastRemoveBody { target_hash: vec![1; 32] };
        let msg = Message::create(FID, MessageType::CastRemove, 1, vec![0; 32], &body).unwrap();
        let err = set.merge(&msg).unwrap_err();
        assert!(matches!(err, StoreError::BadRequest(_)));
        assert_eq!(db.commit_count(), 0);
    }

    #[test]
    fn test_missing_target_rejected() {
        let (db, set) = setup();
        let body = SignerBody { signer: vec![] };
        let msg = Message::create(FID, MessageType::SignerAdd, 1, CUSTODY.to_vec(), &body).unwrap();
        assert!(matches!(set.merge(&msg), Err(StoreError::BadRequest(_))));
        assert!(db.is_empty().unwrap());
    }

    #[test]
    fn test_bad_custody_length_rejected() {
        let (_db, set) = setup();
        let body = SignerBody { signer: KEY.to_vec() };
        let msg = Message::create(FID, MessageType::SignerAdd, 1, vec![0xC1; 32], &body).unwrap();
        assert!(matches!(set.merge(&msg), Err(StoreError::BadRequest(_))));
    }

    #[test]
    fn test_body_limit_enforced() {
        let (_db, set) = setup();
        let set = set.with_max_body_bytes(8);
        assert!(matches!(set.merge(&add(1, 1)), Err(StoreError::BadRequest(_))));
    }

    #[test]
    fn test_explicit_scope_length_checked() {
        let (_db, set) = setup();
        let err = set.get_adds_by_user(FID, Some(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, StoreError::BadRequest(_)));
    }

    // -------------------------------------------------------------------
    // Corruption and races
    // -------------------------------------------------------------------

    #[test]
    fn test_dangling_index_is_consistency_error_on_merge() {
        let (db, set) = setup();
        let a = add(100, 0xAA);
        set.merge(&a).unwrap();
        db.delete(&message_key(FID, UserPostfix::SignerMessage, &a.ts_hash()))
            .unwrap();

        let err = set.merge(&add(200, 0xBB)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_dangling_index_is_skipped_on_read() {
        let (db, set) = setup();
        let a = add(100, 0xAA);
        set.merge(&a).unwrap();
        db.delete(&message_key(FID, UserPostfix::SignerMessage, &a.ts_hash()))
            .unwrap();

        assert_eq!(set.get_add(FID, &KEY, Some(&CUSTODY)).unwrap(), None);
        assert!(set.get_adds_by_user(FID, Some(&CUSTODY)).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_write_surfaces_conflict() {
        let (db, set) = setup();
        let a = add(100, 0xAA);
        set.merge(&a).unwrap();

        // Build a merge transaction, then let another writer commit first
        let b = add(200, 0xBB);
        let placement = set.validate(&b).unwrap();
        let (txn, _) = set
            .resolve_merge_conflicts(db.transaction(), &b, &placement)
            .unwrap()
            .unwrap();
        let txn = set.put_transaction(txn, &b, &placement).unwrap();

        set.merge(&remove(300, 0x01)).unwrap();

        let err = db.commit(txn).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(stored(&set), (None, Some(remove(300, 0x01))));
    }

    #[test]
    fn test_concurrent_writes_on_distinct_targets_both_commit() {
        let (db, set) = setup();

        let stage = |key: [u8; 32], timestamp: u32| {
            let body = SignerBody { signer: key.to_vec() };
            let msg = Message::create(FID, MessageType::SignerAdd, timestamp, CUSTODY.to_vec(), &body)
                .unwrap();
            let placement = set.validate(&msg).unwrap();
            let (txn, evicted) = set
                .resolve_merge_conflicts(db.transaction(), &msg, &placement)
                .unwrap()
                .unwrap();
            assert!(evicted.is_empty());
            set.put_transaction(txn, &msg, &placement).unwrap()
        };

        // Both staged against the same empty state before either commits
        let first = stage([1; 32], 10);
        let second = stage([2; 32], 10);

        db.commit(first).unwrap();
        db.commit(second).unwrap();

        assert_eq!(db.commit_count(), 2);
        assert_eq!(set.get_adds_by_user(FID, Some(&CUSTODY)).unwrap().len(), 2);
        assert!(set.get_add(FID, &[1; 32], Some(&CUSTODY)).unwrap().is_some());
        assert!(set.get_add(FID, &[2; 32], Some(&CUSTODY)).unwrap().is_some());
    }

    // -------------------------------------------------------------------
    // User-scoped sets
    // -------------------------------------------------------------------

    #[test]
    fn test_user_scoped_set_ignores_custody() {
        let db: DbHandle = Arc::new(MemoryStore::new());
        let casts: TwoPhaseSet<CastSet> = TwoPhaseSet::new(db.clone(), IdRegistry::new(db));

        let body = CastAddBody {
            text: "gm".into(),
            embeds: vec![],
            mentions: vec![],
            parent_cast_id: None,
            parent_url: None,
        };
        let cast = Message::create(FID, MessageType::CastAdd, 10, vec![0x01; 32], &body).unwrap();
        casts.merge(&cast).unwrap();

        // Readable without any ownership event
        assert_eq!(casts.get_add(FID, &cast.hash, None).unwrap(), Some(cast.clone()));
        assert_eq!(casts.get_adds_by_user(FID, None).unwrap(), vec![cast]);
    }
}
