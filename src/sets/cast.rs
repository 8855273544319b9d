/// Cast store — a user's published posts.
///
/// A CastAdd targets its own content hash; a CastRemove names the hash of
/// the cast it retracts. Once the remove wins, the cast body is gone from
/// the store.
use crate::error::{Result, StoreError};
use crate::ids::Fid;
use crate::keys::UserPostfix;
use crate::limits::{HASH_LEN, MAX_CAST_TEXT_BYTES};
use crate::message::{CastAddBody, CastRemoveBody, Message, MessageType};
use crate::sets::{decode_body, ScopeKind, SetSpec, TwoPhaseSet};

pub struct CastSet;

impl SetSpec for CastSet {
    const NAME: &'static str = "cast";
    const ADD_TYPE: MessageType = MessageType::CastAdd;
    const REMOVE_TYPE: MessageType = MessageType::CastRemove;
    const MESSAGE_POSTFIX: UserPostfix = UserPostfix::CastMessage;
    const ADDS_POSTFIX: UserPostfix = UserPostfix::CastAdds;
    const REMOVES_POSTFIX: UserPostfix = UserPostfix::CastRemoves;
    const SCOPE: ScopeKind = ScopeKind::User;

    fn target(message: &Message) -> Result<Vec<u8>> {
        match message.message_type {
            MessageType::CastAdd => {
                let body: CastAddBody = decode_body(message)?;
                if body.text.len() > MAX_CAST_TEXT_BYTES {
                    return Err(StoreError::BadRequest(format!(
                        "cast text of {} bytes exceeds {}",
                        body.text.len(),
                        MAX_CAST_TEXT_BYTES
                    )));
                }
                Ok(message.hash.to_vec())
            }
            _ => {
                let body: CastRemoveBody = decode_body(message)?;
                if body.target_hash.len() != HASH_LEN {
                    return Err(StoreError::BadRequest(format!(
                        "cast target hash must be {} bytes, got {}",
                        HASH_LEN,
                        body.target_hash.len()
                    )));
                }
                Ok(body.target_hash)
            }
        }
    }
}

pub type CastStore = TwoPhaseSet<CastSet>;

impl TwoPhaseSet<CastSet> {
    /// The live cast with content hash `hash`.
    pub fn get_cast_add(&self, fid: Fid, hash: &[u8]) -> Result<Option<Message>> {
        self.get_add(fid, hash, None)
    }

    /// The CastRemove retracting `hash`, if it won.
    pub fn get_cast_remove(&self, fid: Fid, hash: &[u8]) -> Result<Option<Message>> {
        self.get_remove(fid, hash, None)
    }

    pub fn get_cast_adds_by_user(&self, fid: Fid) -> Result<Vec<Message>> {
        self.get_adds_by_user(fid, None)
    }

    pub fn get_cast_removes_by_user(&self, fid: Fid) -> Result<Vec<Message>> {
        self.get_removes_by_user(fid, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CastId;
    use crate::registry::IdRegistry;
    use crate::storage::{DbHandle, MemoryStore};
    use std::sync::Arc;

    const FID: Fid = 77;
    const SIGNER: [u8; 32] = [0x0E; 32];

    fn store() -> CastStore {
        let db: DbHandle = Arc::new(MemoryStore::new());
        CastStore::new(db.clone(), IdRegistry::new(db))
    }

    fn cast(text: &str, timestamp: u32) -> Message {
        let body = CastAddBody {
            text: text.to_string(),
            embeds: vec![],
            mentions: vec![],
            parent_cast_id: None,
            parent_url: None,
        };
        Message::create(FID, MessageType::CastAdd, timestamp, SIGNER.to_vec(), &body).unwrap()
    }

    fn remove(target: &Message, timestamp: u32) -> Message {
        let body = CastRemoveBody {
            target_hash: target.hash.to_vec(),
        };
        Message::create(FID, MessageType::CastRemove, timestamp, SIGNER.to_vec(), &body).unwrap()
    }

    #[test]
    fn test_casts_are_independent_targets() {
        let store = store();
        let a = cast("hello", 10);
        let b = cast("world", 11);
        store.merge(&a).unwrap();
        store.merge(&b).unwrap();

        assert_eq!(store.get_cast_add(FID, &a.hash).unwrap(), Some(a.clone()));
        assert_eq!(store.get_cast_adds_by_user(FID).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_retracts_cast() {
        let store = store();
        let a = cast("oops", 10);
        let r = remove(&a, 12);
        store.merge(&a).unwrap();
        let outcome = store.merge(&r).unwrap();

        assert_eq!(outcome.deleted().next().unwrap().hash, a.hash);
        assert_eq!(store.get_cast_add(FID, &a.hash).unwrap(), None);
        assert_eq!(store.get_cast_remove(FID, &a.hash).unwrap(), Some(r.clone()));
        assert_eq!(store.get_cast_removes_by_user(FID).unwrap(), vec![r]);
    }

    #[test]
    fn test_remove_before_add_blocks_add() {
        let store = store();
        let a = cast("late", 10);
        store.merge(&remove(&a, 10)).unwrap();
        assert!(store.merge(&a).unwrap().is_noop());
        assert!(store.get_cast_adds_by_user(FID).unwrap().is_empty());
    }

    #[test]
    fn test_reply_body_roundtrip() {
        let store = store();
        let body = CastAddBody {
            text: "reply".into(),
            embeds: vec!["https://example.com".into()],
            mentions: vec![1, 2],
            parent_cast_id: Some(CastId {
                fid: 5,
                hash: vec![9; 32],
            }),
            parent_url: None,
        };
        let msg = Message::create(FID, MessageType::CastAdd, 3, SIGNER.to_vec(), &body).unwrap();
        store.merge(&msg).unwrap();

        let stored = store.get_cast_add(FID, &msg.hash).unwrap().unwrap();
        assert_eq!(stored.decode_body::<CastAddBody>().unwrap(), body);
    }

    #[test]
    fn test_oversized_text_rejected() {
        let store = store();
        let msg = cast(&"a".repeat(MAX_CAST_TEXT_BYTES + 1), 1);
        assert!(matches!(store.merge(&msg), Err(StoreError::BadRequest(_))));
    }

    #[test]
    fn test_remove_with_short_hash_rejected() {
        let store = store();
        let body = CastRemoveBody {
            target_hash: vec![1, 2, 3],
        };
        let msg = Message::create(FID, MessageType::CastRemove, 1, SIGNER.to_vec(), &body).unwrap();
        assert!(matches!(store.merge(&msg), Err(StoreError::BadRequest(_))));
    }
}
