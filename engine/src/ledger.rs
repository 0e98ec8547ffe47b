//! Idempotency ledger: which pushes have already been applied.
//!
//! Markers are write-once and never removed. The batch layer is the fast
//! path for a client that synced successfully but never saw the
//! acknowledgment; the event layer protects partially failed batches whose
//! batch marker was never written.

use crate::{BatchId, DeviceId, EventId};
use std::collections::HashSet;

/// Replay markers for one tenant.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyLedger {
    batches: HashSet<(DeviceId, BatchId)>,
    events: HashSet<EventId>,
}

impl IdempotencyLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a batch from this device was already fully processed.
    pub fn batch_seen(&self, device_id: &str, batch_id: &str) -> bool {
        self.batches
            .contains(&(device_id.to_string(), batch_id.to_string()))
    }

    /// Record a batch as processed.
    pub fn mark_batch(&mut self, device_id: &str, batch_id: &str) {
        self.batches
            .insert((device_id.to_string(), batch_id.to_string()));
    }

    /// Whether an event was already applied.
    pub fn event_seen(&self, event_id: &str) -> bool {
        self.events.contains(event_id)
    }

    /// Record an event as applied.
    pub fn mark_event(&mut self, event_id: &str) {
        self.events.insert(event_id.to_string());
    }
}
