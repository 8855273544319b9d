/// Reaction store — likes and recasts on other casts.
///
/// Target layout: `reaction_type ∥ target fid (u64 BE) ∥ target cast hash`,
/// so one user holds at most one Like and one Recast per cast.
use crate::error::{Result, StoreError};
use crate::ids::Fid;
use crate::keys::UserPostfix;
use crate::limits::HASH_LEN;
use crate::message::{CastId, Message, MessageType, ReactionBody, ReactionType};
use crate::sets::{decode_body, ScopeKind, SetSpec, TwoPhaseSet};

pub struct ReactionSet;

/// Index target for a reaction of `reaction_type` on `cast`.
pub fn reaction_target(reaction_type: ReactionType, cast: &CastId) -> Result<Vec<u8>> {
    if cast.hash.len() != HASH_LEN {
        return Err(StoreError::BadRequest(format!(
            "reaction target hash must be {} bytes, got {}",
            HASH_LEN,
            cast.hash.len()
        )));
    }
    let mut target = Vec::with_capacity(1 + 8 + HASH_LEN);
    target.push(reaction_type as u8);
    target.extend_from_slice(&cast.fid.to_be_bytes());
    target.extend_from_slice(&cast.hash);
    Ok(target)
}

impl SetSpec for ReactionSet {
    const NAME: &'static str = "reaction";
    const ADD_TYPE: MessageType = MessageType::ReactionAdd;
    const REMOVE_TYPE: MessageType = MessageType::ReactionRemove;
    const MESSAGE_POSTFIX: UserPostfix = UserPostfix::ReactionMessage;
    const ADDS_POSTFIX: UserPostfix = UserPostfix::ReactionAdds;
    const REMOVES_POSTFIX: UserPostfix = UserPostfix::ReactionRemoves;
    const SCOPE: ScopeKind = ScopeKind::User;

    fn target(message: &Message) -> Result<Vec<u8>> {
        let body: ReactionBody = decode_body(message)?;
        reaction_target(body.reaction_type, &body.target_cast_id)
    }
}

pub type ReactionStore = TwoPhaseSet<ReactionSet>;

impl TwoPhaseSet<ReactionSet> {
    pub fn get_reaction_add(
        &self,
        fid: Fid,
        reaction_type: ReactionType,
        cast: &CastId,
    ) -> Result<Option<Message>> {
        self.get_add(fid, &reaction_target(reaction_type, cast)?, None)
    }

    pub fn get_reaction_remove(
        &self,
        fid: Fid,
        reaction_type: ReactionType,
        cast: &CastId,
    ) -> Result<Option<Message>> {
        self.get_remove(fid, &reaction_target(reaction_type, cast)?, None)
    }

    /// Live reactions by `fid`, optionally only of one type.
    pub fn get_reaction_adds_by_user(
        &self,
        fid: Fid,
        reaction_type: Option<ReactionType>,
    ) -> Result<Vec<Message>> {
        let adds = self.get_adds_by_user(fid, None)?;
        let Some(wanted) = reaction_type else {
            return Ok(adds);
        };
        let mut filtered = Vec::with_capacity(adds.len());
        for message in adds {
            let body: ReactionBody = message.decode_body()?;
            if body.reaction_type == wanted {
                filtered.push(message);
            }
        }
        Ok(filtered)
    }

    pub fn get_reaction_removes_by_user(&self, fid: Fid) -> Result<Vec<Message>> {
        self.get_removes_by_user(fid, None)
    }
}
