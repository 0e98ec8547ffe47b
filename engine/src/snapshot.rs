//! Snapshot types for persisting and restoring client sync state.
//!
//! Snapshots are the bridge between an in-memory [`SyncSession`] and
//! whatever durable storage the host platform provides. Serialization is
//! deterministic (BTreeMaps throughout) so identical states produce
//! identical bytes.

use crate::{
    error::{Error, Result},
    outbox::{Outbox, OutboxEvent},
    projection::{Projection, SyncRecord},
    session::SyncSession,
    DeviceId, EntityId, EntityType, ScopeName, Seq,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of one device's sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Device the state belongs to
    pub device_id: DeviceId,
    /// Completed-batch counter; keeps batch ids unique across restarts
    pub batch_seq: u64,
    /// Generated-event counter; keeps event ids unique across restarts
    pub event_seq: u64,
    /// Scope cursors at snapshot time
    pub checkpoints: BTreeMap<ScopeName, Seq>,
    /// Local projection, organized by entity type then entity id
    pub records: BTreeMap<EntityType, BTreeMap<EntityId, SyncRecord>>,
    /// Outbox events, in enqueue order
    pub outbox: Vec<OutboxEvent>,
}

impl ClientSnapshot {
    /// Capture a session's current state.
    pub fn capture(session: &SyncSession) -> Self {
        let (device_id, outbox, projection, checkpoints, batch_seq, event_seq) =
            session.export_parts();

        let mut records: BTreeMap<EntityType, BTreeMap<EntityId, SyncRecord>> = BTreeMap::new();
        for record in projection.records() {
            records
                .entry(record.entity_type.clone())
                .or_default()
                .insert(record.entity_id.clone(), record.clone());
        }

        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            device_id: device_id.clone(),
            batch_seq,
            event_seq,
            checkpoints: checkpoints.clone(),
            records,
            outbox: outbox.events().to_vec(),
        }
    }

    /// Restore a session from this snapshot.
    ///
    /// The device id must match; a snapshot never moves between devices
    /// (checkpoints and event ids are device-scoped).
    pub fn restore_into(self, session: &mut SyncSession) -> Result<()> {
        if self.device_id != session.device_id() {
            return Err(Error::InvalidSnapshot(format!(
                "device id mismatch: expected '{}', got '{}'",
                session.device_id(),
                self.device_id
            )));
        }

        let mut projection = Projection::new();
        for records in self.records.into_values() {
            for (_, record) in records {
                projection.insert(record);
            }
        }

        session.import_parts(
            Outbox::from_events(self.outbox),
            projection,
            self.checkpoints,
            self.batch_seq,
            self.event_seq,
        );
        Ok(())
    }

    /// Total record count, tombstones included.
    pub fn record_count(&self) -> usize {
        self.records.values().map(|r| r.len()).sum()
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON, rejecting snapshots from a newer format.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}
