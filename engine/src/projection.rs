//! Materialized record projection.
//!
//! The projection is a read-through view of a change log: one
//! [`SyncRecord`] per entity, folded from entries in order. The server
//! keeps one per tenant as the current state; clients keep one as their
//! local cache and fold pulled entries into it with last-write-wins.

use crate::{changelog::ChangeEntry, EntityId, EntityType, Fields, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current state of one entity, tombstones included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Entity type
    pub entity_type: EntityType,
    /// Entity identifier
    pub entity_id: EntityId,
    /// Last known field values; preserved across deletion
    pub value: Fields,
    /// Timestamp of the last applied write (RFC 3339)
    pub updated_at: Timestamp,
    /// Set when the entity was deleted; the record stays queryable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl SyncRecord {
    /// Whether this record is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Merge `patch` into `base` one level deep.
///
/// Top-level keys are inserted or replaced wholesale; nested objects are
/// not merged recursively. Keys absent from `patch` are untouched.
pub fn shallow_merge(base: &mut Fields, patch: &Fields) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

/// All records for one tenant (or one client's local cache).
#[derive(Debug, Clone, Default)]
pub struct Projection {
    records: HashMap<(EntityType, EntityId), SyncRecord>,
}

impl Projection {
    /// Create an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an upsert in acceptance order.
    ///
    /// Fields in `data` are shallow-merged over the current value and
    /// `updated_at` takes the event's timestamp. Upserting a tombstone
    /// revives it: the entity was recreated, so `deleted_at` clears.
    pub fn apply_upsert(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        data: Option<&Fields>,
        occurred_at: &str,
    ) {
        let key = (entity_type.to_string(), entity_id.to_string());
        match self.records.get_mut(&key) {
            Some(record) => {
                if let Some(patch) = data {
                    shallow_merge(&mut record.value, patch);
                }
                record.updated_at = occurred_at.to_string();
                record.deleted_at = None;
            }
            None => {
                self.records.insert(
                    key,
                    SyncRecord {
                        entity_type: entity_type.to_string(),
                        entity_id: entity_id.to_string(),
                        value: data.cloned().unwrap_or_default(),
                        updated_at: occurred_at.to_string(),
                        deleted_at: None,
                    },
                );
            }
        }
    }

    /// Apply a delete in acceptance order: the last known value is kept
    /// and `deleted_at` stamped. Deleting an unknown entity produces an
    /// empty tombstone.
    pub fn apply_delete(&mut self, entity_type: &str, entity_id: &str, occurred_at: &str) {
        let key = (entity_type.to_string(), entity_id.to_string());
        match self.records.get_mut(&key) {
            Some(record) => {
                record.deleted_at = Some(occurred_at.to_string());
                record.updated_at = occurred_at.to_string();
            }
            None => {
                self.records.insert(
                    key,
                    SyncRecord {
                        entity_type: entity_type.to_string(),
                        entity_id: entity_id.to_string(),
                        value: Fields::new(),
                        updated_at: occurred_at.to_string(),
                        deleted_at: Some(occurred_at.to_string()),
                    },
                );
            }
        }
    }

    /// Fold a pulled change entry into the projection with last-write-wins.
    ///
    /// The entry is applied only if its timestamp is strictly newer than
    /// the local copy's, or no local copy exists; otherwise it is a no-op.
    /// Returns whether the entry was applied.
    pub fn merge_remote(&mut self, entry: &ChangeEntry) -> bool {
        let key = (entry.entity_type.clone(), entry.entity_id.clone());
        if let Some(record) = self.records.get(&key) {
            if entry.occurred_at.as_str() <= record.updated_at.as_str() {
                return false;
            }
        }

        if entry.body.is_delete() {
            self.apply_delete(&entry.entity_type, &entry.entity_id, &entry.occurred_at);
        } else {
            self.apply_upsert(
                &entry.entity_type,
                &entry.entity_id,
                entry.body.data(),
                &entry.occurred_at,
            );
        }
        true
    }

    /// Get a record by type and id, tombstones included.
    pub fn get(&self, entity_type: &str, entity_id: &str) -> Option<&SyncRecord> {
        self.records
            .get(&(entity_type.to_string(), entity_id.to_string()))
    }

    /// Get a record only if it is not deleted.
    pub fn get_active(&self, entity_type: &str, entity_id: &str) -> Option<&SyncRecord> {
        self.get(entity_type, entity_id).filter(|r| !r.is_deleted())
    }

    /// Insert a record verbatim (snapshot import).
    pub fn insert(&mut self, record: SyncRecord) {
        self.records
            .insert((record.entity_type.clone(), record.entity_id.clone()), record);
    }

    /// All records, tombstones included.
    pub fn records(&self) -> impl Iterator<Item = &SyncRecord> {
        self.records.values()
    }

    /// Total record count, tombstones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the projection holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
