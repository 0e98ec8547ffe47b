//! The append-only per-tenant change log.
//!
//! The change log is the single source of truth for what happened and in
//! what order. Sequence numbers are assigned by the log itself at append
//! time, so the ordering invariant is enforced by the storage layer rather
//! than by caller discipline.

use crate::{event::EventBody, EntityId, EntityType, Seq, TenantId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// An immutable entry in a tenant's change log.
///
/// Entries are never rewritten or removed; a delete appends a tombstone
/// entry after the entries it shadows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Server-assigned entry identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Position in the tenant's log; strictly increasing and gapless
    pub seq: Seq,
    /// Entity type affected
    pub entity_type: EntityType,
    /// Entity identifier affected
    pub entity_id: EntityId,
    /// Operation and payload
    #[serde(flatten)]
    pub body: EventBody,
    /// When the originating mutation happened (RFC 3339)
    pub occurred_at: Timestamp,
    /// User that pushed the originating event; drives the visibility filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<UserId>,
}

/// Append-only log for a single tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLog {
    tenant_id: TenantId,
    entries: Vec<ChangeEntry>,
}

impl ChangeLog {
    /// Create an empty log for a tenant.
    pub fn new(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entries: Vec::new(),
        }
    }

    /// Append an entry, assigning the next sequence number.
    ///
    /// Assignment is `current length + 1`, so the log is gapless by
    /// construction. Returns the stored entry.
    pub fn append(
        &mut self,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        body: EventBody,
        occurred_at: impl Into<Timestamp>,
        actor_id: Option<UserId>,
    ) -> &ChangeEntry {
        let seq = self.entries.len() as Seq + 1;
        self.entries.push(ChangeEntry {
            id: format!("{}:{}", self.tenant_id, seq),
            tenant_id: self.tenant_id.clone(),
            seq,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            body,
            occurred_at: occurred_at.into(),
            actor_id,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Entries with `seq > since`, ascending, truncated to `limit`.
    pub fn entries_since(&self, since: Seq, limit: usize) -> Vec<ChangeEntry> {
        let start = (since as usize).min(self.entries.len());
        self.entries[start..].iter().take(limit).cloned().collect()
    }

    /// Current watermark: the highest assigned sequence number.
    pub fn last_seq(&self) -> Seq {
        self.entries.len() as Seq
    }

    /// Number of entries in the log.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in sequence order.
    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upsert_body(value: serde_json::Value) -> EventBody {
        EventBody::Upsert {
            data: value.as_object().cloned(),
        }
    }

    #[test]
    fn append_assigns_gapless_seqs() {
        let mut log = ChangeLog::new("acme");

        for i in 0..5 {
            let entry = log.append(
                "notes",
                format!("note-{i}"),
                upsert_body(json!({"n": i})),
                "2024-03-01T10:00:00Z",
                None,
            );
            assert_eq!(entry.seq, i + 1);
        }

        let seqs: Vec<_> = log.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(log.last_seq(), 5);
    }

    #[test]
    fn entry_ids_are_unique() {
        let mut log = ChangeLog::new("acme");
        log.append(
            "notes",
            "note-1",
            upsert_body(json!({})),
            "2024-03-01T10:00:00Z",
            None,
        );
        log.append("notes", "note-1", EventBody::Delete, "2024-03-01T10:01:00Z", None);

        assert_ne!(log.entries()[0].id, log.entries()[1].id);
    }

    #[test]
    fn delete_appends_a_tombstone_entry() {
        let mut log = ChangeLog::new("acme");
        log.append(
            "notes",
            "note-1",
            upsert_body(json!({"x": 1})),
            "2024-03-01T10:00:00Z",
            None,
        );
        log.append("notes", "note-1", EventBody::Delete, "2024-03-01T10:01:00Z", None);

        // Both entries survive; the delete shadows, it does not erase
        assert_eq!(log.len(), 2);
        assert!(log.entries()[1].body.is_delete());
    }

    #[test]
    fn entries_since_respects_cursor_and_limit() {
        let mut log = ChangeLog::new("acme");
        for i in 0..10 {
            log.append(
                "notes",
                format!("note-{i}"),
                upsert_body(json!({})),
                "2024-03-01T10:00:00Z",
                None,
            );
        }

        let window = log.entries_since(3, 4);
        let seqs: Vec<_> = window.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 5, 6, 7]);

        // Cursor at the watermark yields nothing
        assert!(log.entries_since(10, 100).is_empty());

        // Cursor past the watermark is harmless
        assert!(log.entries_since(999, 100).is_empty());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut log = ChangeLog::new("acme");
        log.append(
            "notes",
            "note-1",
            upsert_body(json!({"title": "hello"})),
            "2024-03-01T10:00:00Z",
            Some("user-1".into()),
        );

        let json = serde_json::to_string(&log).unwrap();
        let parsed: ChangeLog = serde_json::from_str(&json).unwrap();
        assert_eq!(log.entries(), parsed.entries());
    }
}
