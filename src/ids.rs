/// Core identity types for the message store.
///
/// - `Fid`: numeric user identifier
/// - `TsHash`: 8-byte sortable message key (timestamp + truncated hash)
/// - protocol time helpers (seconds since the 2021-01-01 epoch)
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::limits::{TS_HASH_LEN, TS_HASH_SUFFIX_LEN};

/// Numeric user identifier.
pub type Fid = u64;

/// Protocol epoch: 2021-01-01T00:00:00Z in milliseconds since the Unix epoch.
pub const FARCASTER_EPOCH_MS: u64 = 1_609_459_200_000;

// ---------------------------------------------------------------------------
// TsHash
// ---------------------------------------------------------------------------

/// Sortable message key: big-endian timestamp (4 bytes) followed by the
/// first 4 bytes of the message content hash.
///
/// **Ordering**: plain byte order, i.e. timestamp first, then hash prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TsHash(pub [u8; TS_HASH_LEN]);

impl TsHash {
    /// Build from a protocol timestamp and a content hash.
    pub fn new(timestamp: u32, hash: &[u8]) -> Self {
        let mut bytes = [0u8; TS_HASH_LEN];
        bytes[..4].copy_from_slice(&timestamp.to_be_bytes());
        let n = hash.len().min(TS_HASH_SUFFIX_LEN);
        bytes[4..4 + n].copy_from_slice(&hash[..n]);
        TsHash(bytes)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; TS_HASH_LEN]) -> Self {
        TsHash(bytes)
    }

    /// Parse a stored index value. Returns `None` unless exactly 8 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; TS_HASH_LEN] = bytes.try_into().ok()?;
        Some(TsHash(arr))
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; TS_HASH_LEN] {
        &self.0
    }

    /// Timestamp prefix in protocol seconds.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// The truncated hash bytes.
    pub fn hash_suffix(&self) -> &[u8] {
        &self.0[4..]
    }

    /// Hex-encode for display/logging.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TsHash(t={}, h={})", self.timestamp(), hex::encode(self.hash_suffix()))
    }
}

impl fmt::Display for TsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Protocol time
// ---------------------------------------------------------------------------

/// Convert Unix milliseconds to protocol seconds. `None` if before the epoch
/// or past the 32-bit range.
pub fn to_farcaster_time(unix_ms: u64) -> Option<u32> {
    let since_epoch = unix_ms.checked_sub(FARCASTER_EPOCH_MS)?;
    u32::try_from(since_epoch / 1000).ok()
}

/// Convert protocol seconds back to Unix milliseconds.
pub fn from_farcaster_time(timestamp: u32) -> u64 {
    FARCASTER_EPOCH_MS + u64::from(timestamp) * 1000
}

/// Protocol seconds as a UTC datetime.
pub fn farcaster_time_to_datetime(timestamp: u32) -> DateTime<Utc> {
    let ms = from_farcaster_time(timestamp) as i64;
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
