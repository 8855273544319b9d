/// Store error taxonomy.
///
/// Absent data is not an error: reads return `Option` / empty `Vec`.
use thiserror::Error;

use crate::message::MessageError;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed inbound message or event; rejected before any backend call.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Stored state contradicts an invariant. Never auto-corrected.
    #[error("Consistency violation: {0}")]
    Consistency(String),

    /// A value read while building the transaction changed before commit.
    #[error("Transaction conflict: {0} stale read(s)")]
    Conflict(usize),

    /// Backend I/O failure or unavailability.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

impl StoreError {
    /// Errors the caller may retry as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Storage(_))
    }

    /// Errors signalling corrupted upstream or stored state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Consistency(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
