//! Outbox queue: durable client-side mutation log.
//!
//! Every local mutation lands here at the moment it happens, without
//! touching the network. At sync time the queue is drained in FIFO order
//! and payloads are hydrated against current local state, so edits made
//! between enqueue and send are captured rather than frozen.

use crate::{
    event::{EventBody, SyncEvent},
    projection::Projection,
    EntityId, EntityType, EventId, Fields, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Delivery state of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Waiting for its first push
    Queued,
    /// Acknowledged by the server
    Synced,
    /// Last push attempt failed; retried in place on the next drain
    Failed,
}

/// How an upsert's payload is stored until send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutboxPayload {
    /// Snapshot captured at enqueue time
    Inline {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Fields>,
    },
    /// Resolved against the local projection just before transmission
    Reference,
}

/// Operation recorded by an outbox event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum OutboxBody {
    Upsert { payload: OutboxPayload },
    Delete,
}

/// A locally produced mutation awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    /// Event identifier; reused verbatim on the wire so server-side replay
    /// guards recognize retries
    pub id: EventId,
    /// Entity type the mutation targets
    pub entity_type: EntityType,
    /// Entity identifier within the type
    pub entity_id: EntityId,
    /// Operation and payload storage mode
    #[serde(flatten)]
    pub body: OutboxBody,
    /// When the mutation happened locally (RFC 3339); drain order key
    pub created_at: Timestamp,
    /// Delivery state
    pub sync_status: SyncStatus,
    /// Failure detail from the last push attempt, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OutboxEvent {
    /// An upsert whose payload is resolved from local state at send time.
    pub fn upsert_reference(
        id: impl Into<EventId>,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        created_at: impl Into<Timestamp>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            body: OutboxBody::Upsert {
                payload: OutboxPayload::Reference,
            },
            created_at: created_at.into(),
            sync_status: SyncStatus::Queued,
            last_error: None,
        }
    }

    /// An upsert carrying its snapshot inline.
    pub fn upsert_inline(
        id: impl Into<EventId>,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        data: serde_json::Value,
        created_at: impl Into<Timestamp>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            body: OutboxBody::Upsert {
                payload: OutboxPayload::Inline {
                    data: data.as_object().cloned(),
                },
            },
            created_at: created_at.into(),
            sync_status: SyncStatus::Queued,
            last_error: None,
        }
    }

    /// A delete (tombstone) mutation.
    pub fn delete(
        id: impl Into<EventId>,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        created_at: impl Into<Timestamp>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            body: OutboxBody::Delete,
            created_at: created_at.into(),
            sync_status: SyncStatus::Queued,
            last_error: None,
        }
    }

    /// Resolve this event into its wire form.
    ///
    /// Reference payloads read the entity's current value from the local
    /// projection. A referent that no longer exists locally still produces
    /// an event, with whatever partial payload is available — the server is
    /// authoritative on missing fields.
    pub fn hydrate(&self, projection: &Projection) -> SyncEvent {
        let body = match &self.body {
            OutboxBody::Delete => EventBody::Delete,
            OutboxBody::Upsert { payload } => EventBody::Upsert {
                data: match payload {
                    OutboxPayload::Inline { data } => data.clone(),
                    OutboxPayload::Reference => projection
                        .get(&self.entity_type, &self.entity_id)
                        .map(|record| record.value.clone()),
                },
            },
        };

        SyncEvent {
            event_id: self.id.clone(),
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            body,
            occurred_at: Some(self.created_at.clone()),
        }
    }
}

/// Ordered queue of not-yet-acknowledged local mutations.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    events: Vec<OutboxEvent>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an outbox from persisted events (snapshot import).
    pub fn from_events(events: Vec<OutboxEvent>) -> Self {
        Self { events }
    }

    /// Append a mutation. Never blocks on network; the event always enters
    /// as `queued` with no error.
    pub fn enqueue(&mut self, mut event: OutboxEvent) {
        event.sync_status = SyncStatus::Queued;
        event.last_error = None;
        self.events.push(event);
    }

    /// All events eligible for the next push — `queued` and `failed` —
    /// in `created_at` FIFO order with the event id as tiebreaker. Failed
    /// events retry in their original position, not at the back.
    pub fn drain(&self) -> Vec<&OutboxEvent> {
        let mut eligible: Vec<&OutboxEvent> = self
            .events
            .iter()
            .filter(|e| matches!(e.sync_status, SyncStatus::Queued | SyncStatus::Failed))
            .collect();
        eligible.sort_by(|a, b| {
            (a.created_at.as_str(), a.id.as_str()).cmp(&(b.created_at.as_str(), b.id.as_str()))
        });
        eligible
    }

    /// Mark events as acknowledged, clearing any stored error.
    pub fn mark_synced(&mut self, ids: &[EventId]) {
        for event in &mut self.events {
            if ids.contains(&event.id) {
                event.sync_status = SyncStatus::Synced;
                event.last_error = None;
            }
        }
    }

    /// Mark events as failed with the given error; they stay eligible for
    /// the next drain.
    pub fn mark_failed(&mut self, ids: &[EventId], error: &str) {
        for event in &mut self.events {
            if ids.contains(&event.id) {
                event.sync_status = SyncStatus::Failed;
                event.last_error = Some(error.to_string());
            }
        }
    }

    /// Look up an event by id.
    pub fn get(&self, id: &str) -> Option<&OutboxEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// All events, in enqueue order.
    pub fn events(&self) -> &[OutboxEvent] {
        &self.events
    }

    /// Number of events still awaiting acknowledgment.
    pub fn pending_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.sync_status, SyncStatus::Queued | SyncStatus::Failed))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enqueue_forces_queued_state() {
        let mut outbox = Outbox::new();
        let mut event =
            OutboxEvent::upsert_reference("evt-1", "notes", "note-1", "2024-03-01T10:00:00Z");
        event.sync_status = SyncStatus::Synced;
        event.last_error = Some("stale".into());

        outbox.enqueue(event);

        let stored = outbox.get("evt-1").unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Queued);
        assert!(stored.last_error.is_none());
    }

    #[test]
    fn drain_is_fifo_with_failed_in_place() {
        let mut outbox = Outbox::new();
        outbox.enqueue(OutboxEvent::upsert_reference(
            "evt-1",
            "notes",
            "note-1",
            "2024-03-01T10:00:00Z",
        ));
        outbox.enqueue(OutboxEvent::upsert_reference(
            "evt-2",
            "notes",
            "note-2",
            "2024-03-01T10:01:00Z",
        ));
        outbox.enqueue(OutboxEvent::upsert_reference(
            "evt-3",
            "notes",
            "note-3",
            "2024-03-01T10:02:00Z",
        ));

        // First attempt fails for the oldest event only
        outbox.mark_synced(&["evt-2".to_string(), "evt-3".to_string()]);
        outbox.mark_failed(&["evt-1".to_string()], "connection reset");

        let order: Vec<_> = outbox.drain().iter().map(|e| e.id.clone()).collect();
        assert_eq!(order, vec!["evt-1"]);

        // A new event queues behind the failed one, not ahead of it
        outbox.enqueue(OutboxEvent::upsert_reference(
            "evt-4",
            "notes",
            "note-4",
            "2024-03-01T10:03:00Z",
        ));
        let order: Vec<_> = outbox.drain().iter().map(|e| e.id.clone()).collect();
        assert_eq!(order, vec!["evt-1", "evt-4"]);
    }

    #[test]
    fn mark_failed_records_error() {
        let mut outbox = Outbox::new();
        outbox.enqueue(OutboxEvent::upsert_reference(
            "evt-1",
            "notes",
            "note-1",
            "2024-03-01T10:00:00Z",
        ));

        outbox.mark_failed(&["evt-1".to_string()], "timeout");
        let event = outbox.get("evt-1").unwrap();
        assert_eq!(event.sync_status, SyncStatus::Failed);
        assert_eq!(event.last_error.as_deref(), Some("timeout"));

        // A later success clears the error
        outbox.mark_synced(&["evt-1".to_string()]);
        let event = outbox.get("evt-1").unwrap();
        assert_eq!(event.sync_status, SyncStatus::Synced);
        assert!(event.last_error.is_none());
        assert_eq!(outbox.pending_count(), 0);
    }

    #[test]
    fn hydrate_reference_reads_current_state() {
        let mut projection = Projection::new();
        projection.apply_upsert(
            "notes",
            "note-1",
            json!({"title": "first"}).as_object(),
            "2024-03-01T10:00:00Z",
        );

        let event =
            OutboxEvent::upsert_reference("evt-1", "notes", "note-1", "2024-03-01T10:00:00Z");

        // Edit after enqueue, before send
        projection.apply_upsert(
            "notes",
            "note-1",
            json!({"title": "edited"}).as_object(),
            "2024-03-01T10:05:00Z",
        );

        let wire = event.hydrate(&projection);
        assert_eq!(
            wire.body.data().and_then(|d| d.get("title")),
            Some(&json!("edited"))
        );
    }

    #[test]
    fn hydrate_missing_referent_still_sends() {
        let projection = Projection::new();
        let event =
            OutboxEvent::upsert_reference("evt-1", "notes", "gone", "2024-03-01T10:00:00Z");

        let wire = event.hydrate(&projection);
        assert_eq!(wire.event_id, "evt-1");
        assert!(wire.body.data().is_none());
    }

    #[test]
    fn hydrate_inline_keeps_enqueue_snapshot() {
        let mut projection = Projection::new();
        projection.apply_upsert(
            "notes",
            "note-1",
            json!({"title": "edited"}).as_object(),
            "2024-03-01T10:05:00Z",
        );

        let event = OutboxEvent::upsert_inline(
            "evt-1",
            "notes",
            "note-1",
            json!({"title": "frozen"}),
            "2024-03-01T10:00:00Z",
        );

        let wire = event.hydrate(&projection);
        assert_eq!(
            wire.body.data().and_then(|d| d.get("title")),
            Some(&json!("frozen"))
        );
    }

    #[test]
    fn serialization_roundtrip() {
        let event = OutboxEvent::upsert_inline(
            "evt-1",
            "notes",
            "note-1",
            json!({"title": "hello"}),
            "2024-03-01T10:00:00Z",
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"op\":\"upsert\""));
        assert!(json.contains("\"kind\":\"inline\""));
        assert!(json.contains("\"syncStatus\":\"queued\""));

        let parsed: OutboxEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
