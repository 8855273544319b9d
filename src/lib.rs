//! # Hubstore
//!
//! **Per-user Add/Remove CRDT message sets over an ordered key-value store.**
//!
//! Nodes of a decentralised social protocol receive signed messages in any
//! order, including messages that were later revoked. Hubstore merges them
//! so that every node converges on the same state:
//!
//! - **Two-phase sets** per user and scope, one winner per target
//! - **Last-Write-Wins + Remove-Wins** total order over conflicting messages
//! - **Atomic merges**: losers evicted and winner installed in one commit
//! - **Idempotent replay**: re-merging a known message writes nothing
//! - **Custody tracking** from on-chain ownership events
//!
//! ## Quick Start
//!
//! ```rust
//! use hubstore::{HubEngine, Message, MessageType, StoreConfig};
//! use hubstore::message::LinkBody;
//!
//! let engine = HubEngine::open(&StoreConfig::in_memory()).unwrap();
//! let body = LinkBody { link_type: "follow".into(), target_fid: 2 };
//! let msg = Message::create(1, MessageType::LinkAdd, 100, vec![7; 32], &body).unwrap();
//!
//! let outcome = engine.merge_message(&msg).unwrap();
//! assert!(outcome.merged().is_some());
//! assert!(engine.merge_message(&msg).unwrap().is_noop());
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`keys`] | Fixed-layout composite keys (fid root, postfix tags, scope, target) |
//! | [`storage`] | `KvStore` backend contract, transactions, in-memory and RocksDB backends |
//! | [`message`] | Message record, message types, entity body payloads |
//! | [`registry`] | Ownership events and current custody address per fid |
//! | [`sets`] | Generic two-phase set engine and the five entity stores |
//! | [`engine`] | `HubEngine`, routing messages to their store |
//! | [`events`] | Merge/delete facts for downstream consumers |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `rocksdb` | No | Durable backend on RocksDB (`storage::RocksStore`) |

// ── Public modules ──────────────────────────────────────────────────────────

/// Backend-agnostic store configuration.
pub mod config;

/// Error taxonomy for every store operation.
pub mod error;

/// `HubEngine`: all entity stores over one shared backend.
pub mod engine;

/// Downstream merge/delete events.
pub mod events;

/// Fids, tsHash keys, protocol time.
pub mod ids;

/// ByteKey codec.
pub mod keys;

/// Size limits.
pub mod limits;

/// Message record and body payloads.
pub mod message;

/// Ownership (IdRegistry) events.
pub mod registry;

/// Two-phase CRDT sets.
pub mod sets;

/// Ordered key-value backends.
pub mod storage;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use config::StoreConfig;
pub use engine::HubEngine;
pub use error::{Result, StoreError};
pub use events::{MergeOutcome, StoreEvent, StoreOperation};
pub use ids::{Fid, TsHash};
pub use message::{Message, MessageError, MessageType};
pub use registry::{IdRegistry, IdRegistryEvent, IdRegistryEventType};
pub use sets::{CastStore, LinkStore, ReactionStore, SignerStore, TwoPhaseSet, VerificationStore};
pub use storage::{DbHandle, KvStore, MemoryStore, Transaction};

// ── Library metadata ────────────────────────────────────────────────────────

/// Hubstore version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
pub fn version() -> &'static str {
    VERSION
}

// ── Tests ───────────────────────────────────────────────────────────────────
