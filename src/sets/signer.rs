/// Signer store — which Ed25519 keys a custody address has authorised.
///
/// Custody-scoped: SignerAdd / SignerRemove are signed by the fid's custody
/// address, and the set lives under that address. After an ownership
/// transfer the old address's set stays in place and is still readable with
/// an explicit scope; default reads follow the new custody address.
use crate::error::{Result, StoreError};
use crate::ids::Fid;
use crate::keys::UserPostfix;
use crate::limits::{ADDRESS_LEN, SIGNER_KEY_LEN};
use crate::message::{Message, MessageType, SignerBody};
use crate::registry::IdRegistryEvent;
use crate::sets::{decode_body, ScopeKind, SetSpec, TwoPhaseSet};

pub struct SignerSet;

impl SetSpec for SignerSet {
    const NAME: &'static str = "signer";
    const ADD_TYPE: MessageType = MessageType::SignerAdd;
    const REMOVE_TYPE: MessageType = MessageType::SignerRemove;
    const MESSAGE_POSTFIX: UserPostfix = UserPostfix::SignerMessage;
    const ADDS_POSTFIX: UserPostfix = UserPostfix::SignerAdds;
    const REMOVES_POSTFIX: UserPostfix = UserPostfix::SignerRemoves;
    const SCOPE: ScopeKind = ScopeKind::Custody;

    fn target(message: &Message) -> Result<Vec<u8>> {
        let body: SignerBody = decode_body(message)?;
        if body.signer.len() != SIGNER_KEY_LEN {
            return Err(StoreError::BadRequest(format!(
                "signer key must be {} bytes, got {}",
                SIGNER_KEY_LEN,
                body.signer.len()
            )));
        }
        Ok(body.signer)
    }
}

pub type SignerStore = TwoPhaseSet<SignerSet>;

impl TwoPhaseSet<SignerSet> {
    pub fn get_signer_add(
        &self,
        fid: Fid,
        signer: &[u8],
        custody_address: Option<&[u8]>,
    ) -> Result<Option<Message>> {
        self.get_add(fid, signer, custody_address)
    }

    pub fn get_signer_remove(
        &self,
        fid: Fid,
        signer: &[u8],
        custody_address: Option<&[u8]>,
    ) -> Result<Option<Message>> {
        self.get_remove(fid, signer, custody_address)
    }

    pub fn get_signer_adds_by_user(&self, fid: Fid, custody_address: Option<&[u8]>) -> Result<Vec<Message>> {
        self.get_adds_by_user(fid, custody_address)
    }

    pub fn get_signer_removes_by_user(
        &self,
        fid: Fid,
        custody_address: Option<&[u8]>,
    ) -> Result<Vec<Message>> {
        self.get_removes_by_user(fid, custody_address)
    }

    /// Whether `signer` is currently authorised for `fid`, i.e. has a
    /// stored SignerAdd under the current custody address.
    pub fn is_active_signer(&self, fid: Fid, signer: &[u8]) -> Result<bool> {
        Ok(self.get_signer_add(fid, signer, None)?.is_some())
    }

    /// Public keys of every signer authorised by the current custody
    /// address, in key byte order.
    pub fn get_active_signers(&self, fid: Fid) -> Result<Vec<Vec<u8>>> {
        let mut signers = Vec::new();
        for message in self.get_signer_adds_by_user(fid, None)? {
            let body: SignerBody = message.decode_body()?;
            signers.push(body.signer);
        }
        Ok(signers)
    }

    pub fn get_custody_address(&self, fid: Fid) -> Result<Option<[u8; ADDRESS_LEN]>> {
        self.registry().get_custody_address(fid)
    }

    pub fn get_id_registry_event(&self, fid: Fid) -> Result<Option<IdRegistryEvent>> {
        self.registry().get_id_registry_event(fid)
    }

    pub fn merge_id_registry_event(&self, event: &IdRegistryEvent) -> Result<bool> {
        self.registry().merge_id_registry_event(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
