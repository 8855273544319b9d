/// Link store — typed relations between users (follows and the like).
///
/// Target layout: `link_type ∥ target fid (u64 BE)`. The link type is a
/// short ASCII tag of 1..=8 bytes.
use crate::error::{Result, StoreError};
use crate::ids::Fid;
use crate::keys::UserPostfix;
use crate::limits::MAX_LINK_TYPE_LEN;
use crate::message::{LinkBody, Message, MessageType};
use crate::sets::{decode_body, ScopeKind, SetSpec, TwoPhaseSet};

pub struct LinkSet;

/// Index target for a `link_type` link to `target_fid`.
pub fn link_target(link_type: &str, target_fid: Fid) -> Result<Vec<u8>> {
    if link_type.is_empty() || link_type.len() > MAX_LINK_TYPE_LEN {
        return Err(StoreError::BadRequest(format!(
            "link type must be 1..={} bytes, got {}",
            MAX_LINK_TYPE_LEN,
            link_type.len()
        )));
    }
    let mut target = Vec::with_capacity(link_type.len() + 8);
    target.extend_from_slice(link_type.as_bytes());
    target.extend_from_slice(&target_fid.to_be_bytes());
    Ok(target)
}

impl SetSpec for LinkSet {
    const NAME: &'static str = "link";
    const ADD_TYPE: MessageType = MessageType::LinkAdd;
    const REMOVE_TYPE: MessageType = MessageType::LinkRemove;
    const MESSAGE_POSTFIX: UserPostfix = UserPostfix::LinkMessage;
    const ADDS_POSTFIX: UserPostfix = UserPostfix::LinkAdds;
    const REMOVES_POSTFIX: UserPostfix = UserPostfix::LinkRemoves;
    const SCOPE: ScopeKind = ScopeKind::User;

    fn target(message: &Message) -> Result<Vec<u8>> {
        let body: LinkBody = decode_body(message)?;
        link_target(&body.link_type, body.target_fid)
    }
}

pub type LinkStore = TwoPhaseSet<LinkSet>;

impl TwoPhaseSet<LinkSet> {
    pub fn get_link_add(&self, fid: Fid, link_type: &str, target_fid: Fid) -> Result<Option<Message>> {
        self.get_add(fid, &link_target(link_type, target_fid)?, None)
    }

    pub fn get_link_remove(&self, fid: Fid, link_type: &str, target_fid: Fid) -> Result<Option<Message>> {
        self.get_remove(fid, &link_target(link_type, target_fid)?, None)
    }

    /// Live links by `fid`, optionally only of one type. Results are grouped
    /// by link type, then ordered by target fid.
    pub fn get_link_adds_by_user(&self, fid: Fid, link_type: Option<&str>) -> Result<Vec<Message>> {
        let adds = self.get_adds_by_user(fid, None)?;
        let Some(wanted) = link_type else {
            return Ok(adds);
        };
        let mut filtered = Vec::with_capacity(adds.len());
        for message in adds {
            let body: LinkBody = message.decode_body()?;
            if body.link_type == wanted {
                filtered.push(message);
            }
        }
        Ok(filtered)
    }

    pub fn get_link_removes_by_user(&self, fid: Fid) -> Result<Vec<Message>> {
        self.get_removes_by_user(fid, None)
    }
}
