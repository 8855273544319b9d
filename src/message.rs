/// Message record and entity body payloads.
///
/// A message is an immutable record owned by one fid. It is the unit that the
/// entity stores merge and the unit handed to downstream consumers.
///
/// - Record: bincode-serialized (deterministic, compact)
/// - Body: CBOR-serialized via ciborium (serde-native, entity-specific)
/// - Content hash: BLAKE3 over the canonical bincode of every other field
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{Fid, TsHash};
use crate::limits::{check_body_len, HASH_LEN, MAX_BODY_BYTES};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Body exceeds max size ({size} > {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("CBOR encoding failed: {0}")]
    CborEncode(String),

    #[error("CBOR decoding failed: {0}")]
    CborDecode(String),

    #[error("Bincode serialization failed: {0}")]
    BincodeError(String),
}

// ---------------------------------------------------------------------------
// MessageType enum
// ---------------------------------------------------------------------------

/// Closed set of message types. Every entity contributes one Add and one
/// Remove variant targeting the same logical resource.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MessageType {
    CastAdd = 1,
    CastRemove = 2,
    ReactionAdd = 3,
    ReactionRemove = 4,
    LinkAdd = 5,
    LinkRemove = 6,
    VerificationAddEthAddress = 7,
    VerificationRemove = 8,
    SignerAdd = 9,
    SignerRemove = 10,
}

impl MessageType {
    /// String name for logs and downstream consumers.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::CastAdd => "CastAdd",
            MessageType::CastRemove => "CastRemove",
            MessageType::ReactionAdd => "ReactionAdd",
            MessageType::ReactionRemove => "ReactionRemove",
            MessageType::LinkAdd => "LinkAdd",
            MessageType::LinkRemove => "LinkRemove",
            MessageType::VerificationAddEthAddress => "VerificationAddEthAddress",
            MessageType::VerificationRemove => "VerificationRemove",
            MessageType::SignerAdd => "SignerAdd",
            MessageType::SignerRemove => "SignerRemove",
        }
    }

    /// Wire tag.
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

// ---------------------------------------------------------------------------
// Body payloads (CBOR-encoded inside Message.body)
// ---------------------------------------------------------------------------

/// Body of SignerAdd / SignerRemove.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignerBody {
    /// Ed25519 public key of the signer.
    pub signer: Vec<u8>,
}

/// Reference to a cast by its author and content hash.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CastId {
    pub fid: Fid,
    pub hash: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CastAddBody {
    pub text: String,
    pub embeds: Vec<String>,
    pub mentions: Vec<Fid>,
    pub parent_cast_id: Option<CastId>,
    pub parent_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CastRemoveBody {
    /// Content hash of the cast being removed.
    pub target_hash: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReactionType {
    Like = 1,
    Recast = 2,
}

/// Body of ReactionAdd / ReactionRemove.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReactionBody {
    pub reaction_type: ReactionType,
    pub target_cast_id: CastId,
}

/// Body of LinkAdd / LinkRemove.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LinkBody {
    /// Short relation name, e.g. "follow".
    pub link_type: String,
    pub target_fid: Fid,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VerificationAddBody {
    /// Verified Ethereum address.
    pub address: Vec<u8>,
    pub eth_signature: Vec<u8>,
    pub block_hash: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VerificationRemoveBody {
    pub address: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Immutable message record.
///
/// Arrives already decoded and signature-checked; the store only relies on
/// `message_type`, `fid`, `signer`, the tsHash and the body's target fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub fid: Fid,
    pub message_type: MessageType,
    /// Protocol seconds since the 2021-01-01 epoch.
    pub timestamp: u32,
    /// BLAKE3 content hash.
    pub hash: [u8; HASH_LEN],
    /// Key that signed the message: custody address for signer messages,
    /// Ed25519 signer key for everything else.
    pub signer: Vec<u8>,
    /// CBOR-encoded body bytes.
    pub body: Vec<u8>,
}

impl Message {
    /// Build a message and derive its content hash.
    ///
    /// # Arguments
    /// * `fid`: owning user
    /// * `message_type`: closed variant tag
    /// * `timestamp`: protocol seconds
    /// * `signer`: custody address or signer key that authored the message
    /// * `body`: will be CBOR-encoded
    pub fn create<P: Serialize>(
        fid: Fid,
        message_type: MessageType,
        timestamp: u32,
        signer: Vec<u8>,
        body: &P,
    ) -> Result<Self, MessageError> {
        let body_bytes = cbor_encode(body)?;

        if !check_body_len(body_bytes.len(), MAX_BODY_BYTES) {
            return Err(MessageError::BodyTooLarge {
                size: body_bytes.len(),
                max: MAX_BODY_BYTES,
            });
        }

        let mut message = Message {
            fid,
            message_type,
            timestamp,
            hash: [0u8; HASH_LEN],
            signer,
            body: body_bytes,
        };
        message.hash = message.compute_hash()?;
        Ok(message)
    }

    /// The 8-byte sort/uniqueness key.
    pub fn ts_hash(&self) -> TsHash {
        TsHash::new(self.timestamp, &self.hash)
    }

    /// Recompute the content hash over every field except `hash`.
    pub fn compute_hash(&self) -> Result<[u8; HASH_LEN], MessageError> {
        let hashable = (
            self.fid,
            &self.message_type,
            self.timestamp,
            &self.signer,
            &self.body,
        );
        let bytes =
            bincode::serialize(&hashable).map_err(|e| MessageError::BincodeError(e.to_string()))?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }

    /// Whether `hash` matches the record contents.
    pub fn has_valid_hash(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }

    /// Serialize the full record (for storage).
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        bincode::serialize(self).map_err(|e| MessageError::BincodeError(e.to_string()))
    }

    /// Deserialize a stored record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        bincode::deserialize(bytes).map_err(|e| MessageError::BincodeError(e.to_string()))
    }

    /// Decode the CBOR body into a typed struct.
    pub fn decode_body<P: serde::de::DeserializeOwned>(&self) -> Result<P, MessageError> {
        cbor_decode(&self.body)
    }
}

// ---------------------------------------------------------------------------
// CBOR helpers
// ---------------------------------------------------------------------------

/// CBOR-encode a value to bytes.
pub fn cbor_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MessageError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| MessageError::CborEncode(e.to_string()))?;
    Ok(buf)
}

/// CBOR-decode a value from bytes.
pub fn cbor_decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, MessageError> {
    ciborium::from_reader(bytes).map_err(|e| MessageError::CborDecode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn signer_add(fid: Fid, timestamp: u32) -> Message {
        let body = SignerBody {
            signer: vec![0x11; 32],
        };
        Message::create(fid, MessageType::SignerAdd, timestamp, vec![0xAA; 20], &body).unwrap()
    }

    #[test]
    fn test_create_derives_hash() {
        let msg = signer_add(7, 100);
        assert!(msg.has_valid_hash());
        assert_eq!(msg.ts_hash().timestamp(), 100);
        assert_eq!(msg.ts_hash().hash_suffix(), &msg.hash[..4]);
    }

    #[test]
    fn test_hash_depends_on_every_field() {
        let a = signer_add(7, 100);
        assert_ne!(a.hash, signer_add(8, 100).hash);
        assert_ne!(a.hash, signer_add(7, 101).hash);

        let mut tampered = a.clone();
        tampered.signer = vec![0xBB; 20];
        assert!(!tampered.has_valid_hash());
    }

    #[test]
    fn test_decode_body() {
        let msg = signer_add(1, 1);
        let body: SignerBody = msg.decode_body().unwrap();
        assert_eq!(body.signer, vec![0x11; 32]);

        // Wrong payload shape fails cleanly
        let err = msg.decode_body::<LinkBody>().unwrap_err();
        assert!(matches!(err, MessageError::CborDecode(_)));
    }

    #[test]
    fn test_record_bytes_roundtrip() {
        let body = ReactionBody {
            reaction_type: ReactionType::Recast,
            target_cast_id: CastId {
                fid: 4242,
                hash: vec![0xCD; 32],
            },
        };
        let msg = Message::create(42, MessageType::ReactionAdd, 9, vec![0x01; 32], &body).unwrap();
        let restored = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, msg);
        assert!(restored.has_valid_hash());
    }

    #[test]
    fn test_body_too_large_rejected() {
        let body = CastAddBody {
            text: "x".repeat(MAX_BODY_BYTES + 1),
            embeds: vec![],
            mentions: vec![],
            parent_cast_id: None,
            parent_url: None,
        };
        let result = Message::create(1, MessageType::CastAdd, 1, vec![0; 32], &body);
        match result.unwrap_err() {
            MessageError::BodyTooLarge { size, max } => {
                assert!(size > max);
                assert_eq!(max, MAX_BODY_BYTES);
            }
            other => panic!("Expected BodyTooLarge, got: {:?}", other),
        }
    }

    #[test]
    fn test_message_type_tags() {
        assert_eq!(MessageType::CastAdd.as_u8(), 1);
        assert_eq!(MessageType::SignerRemove.as_u8(), 10);
        assert_eq!(MessageType::LinkRemove.as_str(), "LinkRemove");
    }

    #[test]
    fn test_from_bytes_garbage() {
        assert!(Message::from_bytes(&[0xFF, 0x00]).is_err());
    }
}
