/// Two-phase CRDT sets — per-user Add/Remove sets persisted in a KV store.
///
/// Every entity (signers, casts, reactions, links, verifications) is a pair
/// of opposing message types targeting the same logical resource. For each
/// `(fid, scope, target)` at most one message is stored: the winner under a
/// Last-Write-Wins + Remove-Wins order.
///
/// 1. Highest timestamp wins
/// 2. Remove wins over Add
/// 3. Highest lexicographic hash wins
///
/// The key-value entries created by a set are:
///
/// 1. fid:messagePostfix:tsHash -> message record
/// 2. fid:addsPostfix:scope:target -> tsHash (Add index)
/// 3. fid:removesPostfix:scope:target -> tsHash (Remove index)
///
/// # Module structure
/// - `two_phase`: `TwoPhaseSet<S>`, the generic merge / resolve / read engine
/// - `signer`: custody-scoped signer key sets
/// - `cast`, `reaction`, `link`, `verification`: user-scoped sets
use std::cmp::Ordering;

use serde::de::DeserializeOwned;

use crate::error::{Result, StoreError};
use crate::ids::TsHash;
use crate::keys::UserPostfix;
use crate::limits::ADDRESS_LEN;
use crate::message::{Message, MessageType};

pub mod cast;
pub mod link;
pub mod reaction;
pub mod signer;
pub mod two_phase;
pub mod verification;

pub use cast::{CastSet, CastStore};
pub use link::{LinkSet, LinkStore};
pub use reaction::{ReactionSet, ReactionStore};
pub use signer::{SignerSet, SignerStore};
pub use two_phase::TwoPhaseSet;
pub use verification::{VerificationSet, VerificationStore};

// ---------------------------------------------------------------------------
// Side / ScopeKind
// ---------------------------------------------------------------------------

/// Which half of a two-phase set a message belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Add,
    Remove,
}

/// How a set partitions a user's entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// One set per custody address that signed the message. Reads default
    /// to the fid's current custody address.
    Custody,
    /// A single set per fid (empty scope).
    User,
}

impl ScopeKind {
    /// Fixed byte length of the scope component.
    pub fn len(&self) -> usize {
        match self {
            ScopeKind::Custody => ADDRESS_LEN,
            ScopeKind::User => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// SetSpec
// ---------------------------------------------------------------------------

/// Configuration of one entity's two-phase set.
pub trait SetSpec: Send + Sync + 'static {
    /// Name for logs.
    const NAME: &'static str;
    const ADD_TYPE: MessageType;
    const REMOVE_TYPE: MessageType;
    const MESSAGE_POSTFIX: UserPostfix;
    const ADDS_POSTFIX: UserPostfix;
    const REMOVES_POSTFIX: UserPostfix;
    const SCOPE: ScopeKind;

    /// Identifying bytes of the resource `message` adds or removes.
    /// A missing or malformed target is a `BadRequest`.
    fn target(message: &Message) -> Result<Vec<u8>>;

    /// Classify a message type, `None` if it does not belong to this set.
    fn side_of(message_type: MessageType) -> Option<Side> {
        if message_type == Self::ADD_TYPE {
            Some(Side::Add)
        } else if message_type == Self::REMOVE_TYPE {
            Some(Side::Remove)
        } else {
            None
        }
    }

    /// Index postfix for a side.
    fn index_postfix(side: Side) -> UserPostfix {
        match side {
            Side::Add => Self::ADDS_POSTFIX,
            Side::Remove => Self::REMOVES_POSTFIX,
        }
    }

    /// Message type stored on a side.
    fn message_type(side: Side) -> MessageType {
        match side {
            Side::Add => Self::ADD_TYPE,
            Side::Remove => Self::REMOVE_TYPE,
        }
    }
}

/// Decode an inbound body for target extraction. A body that does not match
/// the entity's payload shape is malformed input.
pub(crate) fn decode_body<P: DeserializeOwned>(message: &Message) -> Result<P> {
    message.decode_body().map_err(|e| {
        StoreError::BadRequest(format!("{} body: {}", message.message_type.as_str(), e))
    })
}

// ---------------------------------------------------------------------------
// Conflict order
// ---------------------------------------------------------------------------

/// Total order over set messages targeting the same resource.
///
/// `Greater` means `a` wins. Only the side and the tsHash take part, so the
/// stored side of a set can be compared without loading its message.
pub fn message_compare(a_side: Side, a_ts: &TsHash, b_side: Side, b_ts: &TsHash) -> Ordering {
    // Last-Write-Wins on the timestamp prefix
    let by_time = a_ts.timestamp().cmp(&b_ts.timestamp());
    if by_time != Ordering::Equal {
        return by_time;
    }

    // Remove-Wins
    match (a_side, b_side) {
        (Side::Remove, Side::Add) => return Ordering::Greater,
        (Side::Add, Side::Remove) => return Ordering::Less,
        _ => {}
    }

    // Arbitrary but deterministic tie-break on the hash suffix
    a_ts.hash_suffix().cmp(b_ts.hash_suffix())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
