//! Wire types for the push and pull exchanges.

use crate::{
    changelog::ChangeEntry, event::SyncEvent, BatchId, DeviceId, EventId, ScopeName, Seq,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hard cap on events per push batch.
pub const MAX_BATCH_EVENTS: usize = 500;

/// Entries returned per scope when the pull request names no limit.
pub const DEFAULT_PULL_LIMIT: u32 = 100;

/// Upper bound on the per-scope pull limit.
pub const MAX_PULL_LIMIT: u32 = 1000;

/// One device's drained outbox, pushed as a unit.
///
/// The batch id must stay stable across retries of the same logical batch;
/// it is the key of the batch-level replay guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatch {
    pub device_id: DeviceId,
    pub batch_id: BatchId,
    pub events: Vec<SyncEvent>,
}

/// Typed rejection and error codes surfaced at the sync boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    /// Malformed batch or event shape; rejected before any state change
    ValidationFailed,
    /// The event was already applied; not a failure, never retried
    IdempotentReplay,
    /// Unknown tenant
    ProjectNotFound,
    /// Unexpected storage or server failure
    InternalError,
}

impl RejectCode {
    /// Wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::ValidationFailed => "VALIDATION_FAILED",
            RejectCode::IdempotentReplay => "IDEMPOTENT_REPLAY",
            RejectCode::ProjectNotFound => "PROJECT_NOT_FOUND",
            RejectCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-event rejection inside an otherwise processed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEvent {
    pub event_id: EventId,
    pub code: RejectCode,
    pub message: String,
}

/// Result of a push. Partial success is the normal case: accepted and
/// rejected events coexist in one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    /// The whole batch was already processed; nothing was reapplied
    pub replayed: bool,
    /// Events appended to the change log by this call
    pub accepted: Vec<EventId>,
    /// Events rejected with a typed code
    pub rejected: Vec<RejectedEvent>,
    /// Highest sequence number in the tenant's log after the call
    pub server_watermark: Seq,
}

impl PushOutcome {
    /// The replay fast-path outcome: nothing accepted, nothing rejected,
    /// current watermark reported.
    pub fn replayed(server_watermark: Seq) -> Self {
        Self {
            replayed: true,
            accepted: Vec::new(),
            rejected: Vec::new(),
            server_watermark,
        }
    }
}

/// A device's request for new change entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub device_id: DeviceId,
    /// Explicit cursors per scope; when present they override the stored
    /// checkpoint for this call (client-driven resets)
    #[serde(default)]
    pub checkpoints: BTreeMap<ScopeName, Seq>,
    /// Scopes to pull; all known scopes when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<ScopeName>>,
    /// Per-scope entry limit, clamped to [1, MAX_PULL_LIMIT]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl PullRequest {
    /// Pull everything for a device with stored checkpoints.
    pub fn for_device(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            checkpoints: BTreeMap::new(),
            scopes: None,
            limit: None,
        }
    }

    /// The limit to apply per scope.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .map(|l| l.clamp(1, MAX_PULL_LIMIT))
            .unwrap_or(DEFAULT_PULL_LIMIT) as usize
    }
}

/// Changes for one scope, in ascending sequence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeChanges {
    pub scope: ScopeName,
    pub changes: Vec<ChangeEntry>,
}

/// Result of a pull across the requested scopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullBundle {
    pub results: Vec<ScopeChanges>,
    /// Cursor to resume from, per scope; advances only over entries the
    /// caller actually received
    pub next_checkpoints: BTreeMap<ScopeName, Seq>,
}
