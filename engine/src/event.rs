//! Event types for expressing mutations.
//!
//! Clients express changes as events, not direct state writes. Events are
//! the unit of transport, idempotency tracking, and change-log append.

use crate::{EntityId, EntityType, EventId, Fields, Timestamp};
use serde::{Deserialize, Serialize};

/// The operation an event performs, tagged with its payload.
///
/// Upsert data is freeform entity state; only its top-level keys are
/// meaningful to the engine (shallow merge). A delete carries no data and
/// produces a tombstone, never a physical removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum EventBody {
    Upsert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Fields>,
    },
    Delete,
}

impl EventBody {
    /// Wire name of the operation.
    pub fn op_name(&self) -> &'static str {
        match self {
            EventBody::Upsert { .. } => "upsert",
            EventBody::Delete => "delete",
        }
    }

    /// Upsert data, if any.
    pub fn data(&self) -> Option<&Fields> {
        match self {
            EventBody::Upsert { data } => data.as_ref(),
            EventBody::Delete => None,
        }
    }

    /// Whether this is a tombstone-producing operation.
    pub fn is_delete(&self) -> bool {
        matches!(self, EventBody::Delete)
    }
}

/// A single mutation produced by a client device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    /// Client-assigned identifier, unique per tenant; the per-event replay
    /// guard keys on it
    pub event_id: EventId,
    /// Entity type the mutation targets
    pub entity_type: EntityType,
    /// Entity identifier within the type
    pub entity_id: EntityId,
    /// Operation and payload
    #[serde(flatten)]
    pub body: EventBody,
    /// When the mutation happened on the device (RFC 3339); stamped by the
    /// server at receipt when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<Timestamp>,
}

impl SyncEvent {
    /// Create an upsert event. Non-object `data` values are treated as an
    /// empty payload; the boundary validator rejects them on the wire.
    pub fn upsert(
        event_id: impl Into<EventId>,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        data: serde_json::Value,
        occurred_at: impl Into<Timestamp>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            body: EventBody::Upsert {
                data: data.as_object().cloned(),
            },
            occurred_at: Some(occurred_at.into()),
        }
    }

    /// Create a delete (tombstone) event.
    pub fn delete(
        event_id: impl Into<EventId>,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        occurred_at: impl Into<Timestamp>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            body: EventBody::Delete,
            occurred_at: Some(occurred_at.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_event() {
        let event = SyncEvent::upsert(
            "evt-1",
            "notes",
            "note-1",
            json!({"title": "hello"}),
            "2024-03-01T10:00:00Z",
        );

        assert_eq!(event.event_id, "evt-1");
        assert_eq!(event.body.op_name(), "upsert");
        assert_eq!(
            event.body.data().and_then(|d| d.get("title")),
            Some(&json!("hello"))
        );
    }

    #[test]
    fn delete_event_has_no_data() {
        let event = SyncEvent::delete("evt-2", "notes", "note-1", "2024-03-01T10:00:00Z");

        assert!(event.body.is_delete());
        assert!(event.body.data().is_none());
    }

    #[test]
    fn serialization_upsert() {
        let event = SyncEvent::upsert(
            "evt-1",
            "notes",
            "note-1",
            json!({"title": "hello"}),
            "2024-03-01T10:00:00Z",
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"op\":\"upsert\""));
        assert!(json.contains("\"eventId\":\"evt-1\""));
        assert!(json.contains("\"occurredAt\":\"2024-03-01T10:00:00Z\""));

        let parsed: SyncEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn serialization_delete() {
        let event = SyncEvent::delete("evt-2", "notes", "note-1", "2024-03-01T10:00:00Z");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"op\":\"delete\""));
        assert!(!json.contains("\"data\""));

        let parsed: SyncEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn deserialize_without_occurred_at() {
        let json = r#"{
            "eventId": "evt-1",
            "entityType": "notes",
            "entityId": "note-1",
            "op": "upsert",
            "data": {"title": "hello"}
        }"#;

        let event: SyncEvent = serde_json::from_str(json).unwrap();
        assert!(event.occurred_at.is_none());
    }

    #[test]
    fn non_object_data_becomes_empty() {
        let event = SyncEvent::upsert("evt-1", "notes", "note-1", json!(42), "2024-03-01T10:00:00Z");
        assert!(event.body.data().is_none());
    }
}
