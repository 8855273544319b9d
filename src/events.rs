/// Facts emitted after a successful commit, for downstream projections.
///
/// A consumer replaying these must be idempotent: the same event may be seen
/// more than once across restarts.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{farcaster_time_to_datetime, Fid, TsHash};
use crate::message::{Message, MessageType};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// The message is now stored.
    Merge,
    /// The message lost a conflict and was removed.
    Delete,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::Merge => "merge",
            StoreOperation::Delete => "delete",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoreEvent {
    pub operation: StoreOperation,
    pub fid: Fid,
    pub message_type: MessageType,
    pub ts_hash: TsHash,
    pub hash: [u8; 32],
    pub timestamp: DateTime<Utc>,
}

impl StoreEvent {
    pub fn new(operation: StoreOperation, message: &Message) -> Self {
        StoreEvent {
            operation,
            fid: message.fid,
            message_type: message.message_type,
            ts_hash: message.ts_hash(),
            hash: message.hash,
            timestamp: farcaster_time_to_datetime(message.timestamp),
        }
    }
}

/// Result of merging one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// `Delete` for each evicted loser, then `Merge` for the winner.
    /// Empty when the merge was a no-op.
    pub events: Vec<StoreEvent>,
}

impl MergeOutcome {
    pub fn noop() -> Self {
        Self::default()
    }

    /// True if nothing was written.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }

    /// The message installed by this merge, if any.
    pub fn merged(&self) -> Option<&StoreEvent> {
        self.events
            .iter()
            .find(|e| e.operation == StoreOperation::Merge)
    }

    /// Messages evicted by this merge.
    pub fn deleted(&self) -> impl Iterator<Item = &StoreEvent> {
        self.events
            .iter()
            .filter(|e| e.operation == StoreOperation::Delete)
    }
}
