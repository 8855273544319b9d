/// Verification store — Ethereum addresses a user has proven control of.
///
/// Target is the 20-byte verified address. Claim signatures are checked
/// upstream; only the address takes part in conflict resolution.
use crate::error::{Result, StoreError};
use crate::ids::Fid;
use crate::keys::UserPostfix;
use crate::limits::ADDRESS_LEN;
use crate::message::{Message, MessageType, VerificationAddBody, VerificationRemoveBody};
use crate::sets::{decode_body, ScopeKind, SetSpec, TwoPhaseSet};

pub struct VerificationSet;

impl SetSpec for VerificationSet {
    const NAME: &'static str = "verification";
    const ADD_TYPE: MessageType = MessageType::VerificationAddEthAddress;
    const REMOVE_TYPE: MessageType = MessageType::VerificationRemove;
    const MESSAGE_POSTFIX: UserPostfix = UserPostfix::VerificationMessage;
    const ADDS_POSTFIX: UserPostfix = UserPostfix::VerificationAdds;
    const REMOVES_POSTFIX: UserPostfix = UserPostfix::VerificationRemoves;
    const SCOPE: ScopeKind = ScopeKind::User;

    fn target(message: &Message) -> Result<Vec<u8>> {
        let address = match message.message_type {
            MessageType::VerificationAddEthAddress => {
                decode_body::<VerificationAddBody>(message)?.address
            }
            _ => decode_body::<VerificationRemoveBody>(message)?.address,
        };
        if address.len() != ADDRESS_LEN {
            return Err(StoreError::BadRequest(format!(
                "verified address must be {} bytes, got {}",
                ADDRESS_LEN,
                address.len()
            )));
        }
        Ok(address)
    }
}

pub type VerificationStore = TwoPhaseSet<VerificationSet>;

impl TwoPhaseSet<VerificationSet> {
    pub fn get_verification_add(&self, fid: Fid, address: &[u8]) -> Result<Option<Message>> {
        self.get_add(fid, address, None)
    }

    pub fn get_verification_remove(&self, fid: Fid, address: &[u8]) -> Result<Option<Message>> {
        self.get_remove(fid, address, None)
    }

    pub fn get_verification_adds_by_user(&self, fid: Fid) -> Result<Vec<Message>> {
        self.get_adds_by_user(fid, None)
    }

    pub fn get_verification_removes_by_user(&self, fid: Fid) -> Result<Vec<Message>> {
        self.get_removes_by_user(fid, None)
    }
}
