/// ByteKey codec — fixed-layout composite keys.
///
/// Every key lives under a fid-scoped root:
///
/// ```text
/// <RootPrefix::User><fid: u64 BE><UserPostfix>...
/// ```
///
/// - message key:  root ∥ postfix(message) ∥ tsHash
/// - index key:    root ∥ postfix(adds|removes) ∥ scope ∥ target
/// - index prefix: root ∥ postfix(adds|removes) ∥ scope
/// - event key:    root ∥ postfix(IdRegistryEvent)
///
/// Pure functions, no I/O. Oversized components are a caller bug and panic.
use crate::ids::{Fid, TsHash};
use crate::limits::{MAX_SCOPE_LEN, MAX_TARGET_LEN};

/// First byte of every key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RootPrefix {
    User = 1,
}

/// Byte following the fid root, separating key families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum UserPostfix {
    CastMessage = 1,
    CastAdds = 2,
    CastRemoves = 3,
    ReactionMessage = 4,
    ReactionAdds = 5,
    ReactionRemoves = 6,
    LinkMessage = 7,
    LinkAdds = 8,
    LinkRemoves = 9,
    VerificationMessage = 10,
    VerificationAdds = 11,
    VerificationRemoves = 12,
    SignerMessage = 13,
    SignerAdds = 14,
    SignerRemoves = 15,
    IdRegistryEvent = 16,
}

impl UserPostfix {
    /// Postfixes under which full message records are stored.
    pub const MESSAGE_POSTFIXES: [UserPostfix; 5] = [
        UserPostfix::CastMessage,
        UserPostfix::ReactionMessage,
        UserPostfix::LinkMessage,
        UserPostfix::VerificationMessage,
        UserPostfix::SignerMessage,
    ];
}

/// Length of `user_key`.
pub const USER_KEY_LEN: usize = 1 + 8;

/// `<RootPrefix::User><fid>`
pub fn user_key(fid: Fid) -> Vec<u8> {
    let mut key = Vec::with_capacity(USER_KEY_LEN + 1 + MAX_SCOPE_LEN + MAX_TARGET_LEN);
    key.push(RootPrefix::User as u8);
    key.extend_from_slice(&fid.to_be_bytes());
    key
}

/// `<root><postfix>`: prefix covering one key family of a user.
pub fn user_postfix_prefix(fid: Fid, postfix: UserPostfix) -> Vec<u8> {
    let mut key = user_key(fid);
    key.push(postfix as u8);
    key
}

/// `<root><postfix><tsHash>`: a stored message record.
pub fn message_key(fid: Fid, postfix: UserPostfix, ts_hash: &TsHash) -> Vec<u8> {
    let mut key = user_postfix_prefix(fid, postfix);
    key.extend_from_slice(ts_hash.as_bytes());
    key
}

/// `<root><postfix><scope><target?>`: a set index entry, or with `target`
/// omitted, the prefix of every entry in that scope.
pub fn set_index_key(fid: Fid, postfix: UserPostfix, scope: &[u8], target: Option<&[u8]>) -> Vec<u8> {
    assert!(
        scope.len() <= MAX_SCOPE_LEN,
        "scope of {} bytes exceeds {}",
        scope.len(),
        MAX_SCOPE_LEN
    );
    let mut key = user_postfix_prefix(fid, postfix);
    key.extend_from_slice(scope);
    if let Some(target) = target {
        assert!(
            !target.is_empty() && target.len() <= MAX_TARGET_LEN,
            "target of {} bytes outside 1..={}",
            target.len(),
            MAX_TARGET_LEN
        );
        key.extend_from_slice(target);
    }
    key
}

/// `<root><IdRegistryEvent>`: the current ownership event of a user.
pub fn id_registry_event_key(fid: Fid) -> Vec<u8> {
    user_postfix_prefix(fid, UserPostfix::IdRegistryEvent)
}

/// Extract the fid from any user key.
pub fn fid_from_key(key: &[u8]) -> Option<Fid> {
    if key.len() < USER_KEY_LEN || key[0] != RootPrefix::User as u8 {
        return None;
    }
    let mut fid = [0u8; 8];
    fid.copy_from_slice(&key[1..USER_KEY_LEN]);
    Some(Fid::from_be_bytes(fid))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
