/// Hub engine — every entity store over one shared backend.
///
/// Inbound messages are routed by type to the store that owns them. All
/// stores share the same `DbHandle` and `IdRegistry`, so a custody transfer
/// merged here is immediately visible to signer reads.
use crate::config::StoreConfig;
use crate::error::Result;
use crate::events::MergeOutcome;
use crate::ids::Fid;
use crate::keys::{user_postfix_prefix, UserPostfix};
use crate::message::{Message, MessageType};
use crate::registry::{IdRegistry, IdRegistryEvent};
use crate::sets::{CastStore, LinkStore, ReactionStore, SignerStore, VerificationStore};
use crate::storage::{self, DbHandle};

#[derive(Clone)]
pub struct HubEngine {
    db: DbHandle,
    registry: IdRegistry,
    signers: SignerStore,
    casts: CastStore,
    reactions: ReactionStore,
    links: LinkStore,
    verifications: VerificationStore,
}

impl HubEngine {
    /// Open the backend named by `config` and build every store on it.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db = storage::open(config)?;
        Ok(Self::with_max_body_bytes(db, config.max_body_bytes))
    }

    /// Engine over an already-open backend, default limits.
    pub fn new(db: DbHandle) -> Self {
        Self::with_max_body_bytes(db, crate::limits::MAX_BODY_BYTES)
    }

    fn with_max_body_bytes(db: DbHandle, max_body_bytes: usize) -> Self {
        let registry = IdRegistry::new(db.clone());
        HubEngine {
            signers: SignerStore::new(db.clone(), registry.clone()).with_max_body_bytes(max_body_bytes),
            casts: CastStore::new(db.clone(), registry.clone()).with_max_body_bytes(max_body_bytes),
            reactions: ReactionStore::new(db.clone(), registry.clone())
                .with_max_body_bytes(max_body_bytes),
            links: LinkStore::new(db.clone(), registry.clone()).with_max_body_bytes(max_body_bytes),
            verifications: VerificationStore::new(db.clone(), registry.clone())
                .with_max_body_bytes(max_body_bytes),
            registry,
            db,
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Merge one message into the store that owns its type.
    pub fn merge_message(&self, message: &Message) -> Result<MergeOutcome> {
        match message.message_type {
            MessageType::SignerAdd | MessageType::SignerRemove => self.signers.merge(message),
            MessageType::CastAdd | MessageType::CastRemove => self.casts.merge(message),
            MessageType::ReactionAdd | MessageType::ReactionRemove => self.reactions.merge(message),
            MessageType::LinkAdd | MessageType::LinkRemove => self.links.merge(message),
            MessageType::VerificationAddEthAddress | MessageType::VerificationRemove => {
                self.verifications.merge(message)
            }
        }
    }

    /// Merge a batch, one independent result per message, in input order.
    /// A failure does not stop the rest of the batch.
    pub fn merge_messages(&self, messages: &[Message]) -> Vec<Result<MergeOutcome>> {
        messages.iter().map(|m| self.merge_message(m)).collect()
    }

    pub fn merge_id_registry_event(&self, event: &IdRegistryEvent) -> Result<bool> {
        self.registry.merge_id_registry_event(event)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every stored message of `fid` across all entity stores, grouped by
    /// store (in postfix order) and in tsHash order within each.
    pub fn get_all_messages_by_fid(&self, fid: Fid) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for postfix in UserPostfix::MESSAGE_POSTFIXES {
            for (_, bytes) in self.db.scan_prefix(&user_postfix_prefix(fid, postfix))? {
                messages.push(Message::from_bytes(&bytes)?);
            }
        }
        Ok(messages)
    }

    pub fn get_custody_address(&self, fid: Fid) -> Result<Option<[u8; crate::limits::ADDRESS_LEN]>> {
        self.registry.get_custody_address(fid)
    }

    pub fn get_id_registry_event(&self, fid: Fid) -> Result<Option<IdRegistryEvent>> {
        self.registry.get_id_registry_event(fid)
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    pub fn registry(&self) -> &IdRegistry {
        &self.registry
    }

    pub fn signers(&self) -> &SignerStore {
        &self.signers
    }

    pub fn casts(&self) -> &CastStore {
        &self.casts
    }

    pub fn reactions(&self) -> &ReactionStore {
        &self.reactions
    }

    pub fn links(&self) -> &LinkStore {
        &self.links
    }

    pub fn verifications(&self) -> &VerificationStore {
        &self.verifications
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
