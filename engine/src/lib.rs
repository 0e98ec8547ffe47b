//! # Tidemark Engine
//!
//! A deterministic synchronization core for offline-first, multi-tenant
//! applications.
//!
//! This crate provides the full change-log replication logic: clients queue
//! mutations while disconnected, push them to a server of record, and pull
//! the per-tenant change log back incrementally. The engine guarantees
//! at-least-once delivery without duplicate side effects, a gapless total
//! order of changes per tenant, and per-device resumption via checkpoints.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or platform;
//!   timestamps are always supplied by the caller
//! - **Deterministic**: same inputs always produce same outputs
//! - **Testable**: pure logic, no mocks needed
//! - **Tenant-isolated**: every keyspace is partitioned by tenant at the
//!   storage-key level, never by a post-hoc filter
//!
//! ## Core Concepts
//!
//! ### Change Log
//!
//! Accepted mutations become immutable [`ChangeEntry`] values with a
//! strictly increasing, gapless per-tenant sequence number. Deletes append
//! tombstone entries; nothing is ever rewritten.
//!
//! ### Outbox
//!
//! Local mutations are recorded as [`OutboxEvent`]s at the moment they
//! happen and drained in FIFO order at sync time. Payloads may be stored as
//! references into local state and are hydrated to full snapshots just
//! before transmission, so edits made after enqueue are not lost.
//!
//! ### Idempotency
//!
//! Two replay guards protect every push: a batch-level marker (the fast
//! path for a lost acknowledgment) and a per-event marker (the safety net
//! for partially failed batches). A replayed push never appends twice.
//!
//! ### Checkpoints
//!
//! Each `(user, device, scope)` key owns an independent cursor into the
//! tenant's change log. Cursors advance only over entries the caller
//! actually received, and only on a successful pull.
//!
//! ### Conflict Resolution
//!
//! Last-write-wins by RFC 3339 timestamp string comparison. No vector
//! clocks and no field-level merge of concurrent edits.
//!
//! ## Quick Start
//!
//! ```rust
//! use tidemark_engine::{PushBatch, SyncEvent, SyncHub};
//! use tidemark_engine::scope::{Principal, Role};
//! use serde_json::json;
//!
//! let mut hub = SyncHub::default();
//! hub.create_tenant("acme");
//!
//! let principal = Principal::new("acme", "user-1", Role::Member);
//! let batch = PushBatch {
//!     device_id: "device-1".into(),
//!     batch_id: "device-1:1".into(),
//!     events: vec![SyncEvent::upsert(
//!         "evt-1",
//!         "notes",
//!         "note-1",
//!         json!({"title": "hello"}),
//!         "2024-03-01T10:00:00Z",
//!     )],
//! };
//!
//! let outcome = hub.push(&principal, batch, "2024-03-01T10:00:05Z").unwrap();
//! assert_eq!(outcome.accepted.len(), 1);
//! assert_eq!(outcome.server_watermark, 1);
//! ```

pub mod changelog;
pub mod checkpoint;
pub mod error;
pub mod event;
pub mod hub;
pub mod ledger;
pub mod message;
pub mod outbox;
pub mod projection;
pub mod scope;
pub mod session;
pub mod snapshot;
pub mod validate;

// Re-export main types at crate root
pub use changelog::{ChangeEntry, ChangeLog};
pub use checkpoint::{CheckpointKey, CheckpointStore};
pub use error::Error;
pub use event::{EventBody, SyncEvent};
pub use hub::SyncHub;
pub use ledger::IdempotencyLedger;
pub use message::{
    PullBundle, PullRequest, PushBatch, PushOutcome, RejectCode, RejectedEvent, ScopeChanges,
    DEFAULT_PULL_LIMIT, MAX_BATCH_EVENTS, MAX_PULL_LIMIT,
};
pub use outbox::{Outbox, OutboxBody, OutboxEvent, OutboxPayload, SyncStatus};
pub use projection::{shallow_merge, Projection, SyncRecord};
pub use scope::{Principal, Role, ScopePolicy, Visibility};
pub use session::{CyclePhase, SyncSession};
pub use snapshot::{ClientSnapshot, SNAPSHOT_FORMAT_VERSION};

/// Type aliases for clarity
pub type TenantId = String;
pub type EntityType = String;
pub type EntityId = String;
pub type EventId = String;
pub type DeviceId = String;
pub type UserId = String;
pub type BatchId = String;
pub type ScopeName = String;
pub type Seq = u64;
/// RFC 3339 UTC timestamp; lexicographic order equals chronological order.
pub type Timestamp = String;
/// Freeform entity data carried by upserts.
pub type Fields = serde_json::Map<String, serde_json::Value>;
