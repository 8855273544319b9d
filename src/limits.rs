/// Store guardrails — fixed sizes of key components and payload bounds.
///
/// Scopes must be fixed-length per set so that a scope prefix never matches a
/// longer, unrelated scope during range scans.

/// Length of a custody (Ethereum) address.
pub const ADDRESS_LEN: usize = 20;

/// Length of an Ed25519 signer public key.
pub const SIGNER_KEY_LEN: usize = 32;

/// Length of a message content hash (BLAKE3).
pub const HASH_LEN: usize = 32;

/// Length of a tsHash: 4-byte timestamp + 4-byte hash prefix.
pub const TS_HASH_LEN: usize = 8;

/// Number of hash bytes carried in a tsHash.
pub const TS_HASH_SUFFIX_LEN: usize = TS_HASH_LEN - 4;

/// Max length of any scope component in an index key.
pub const MAX_SCOPE_LEN: usize = ADDRESS_LEN;

/// Max length of any target component in an index key.
pub const MAX_TARGET_LEN: usize = 64;

/// Max length of a link type string (e.g. "follow").
pub const MAX_LINK_TYPE_LEN: usize = 8;

/// Default max CBOR body size per message.
pub const MAX_BODY_BYTES: usize = 4 * 1024; // 4 KB

/// Max cast text length in bytes.
pub const MAX_CAST_TEXT_BYTES: usize = 320;

/// Check whether a body payload fits within `max` bytes.
pub fn check_body_len(len: usize, max: usize) -> bool {
    len <= max
}
