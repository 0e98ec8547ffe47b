//! Checkpoint store: per-device cursors into the change log.
//!
//! Each `(user, device, scope)` key owns an independent cursor; devices of
//! the same user never share one. Cursors are created lazily at zero —
//! "no checkpoint" and "checkpoint at zero" are deliberately equivalent —
//! and move only when a pull for that exact key succeeds.

use crate::{DeviceId, ScopeName, Seq, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of one cursor within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointKey {
    /// Owning user
    pub user_id: UserId,
    /// Owning device
    pub device_id: DeviceId,
    /// Named slice of the change stream
    pub scope: ScopeName,
}

impl CheckpointKey {
    /// Build a key.
    pub fn new(
        user_id: impl Into<UserId>,
        device_id: impl Into<DeviceId>,
        scope: impl Into<ScopeName>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            scope: scope.into(),
        }
    }
}

/// Cursor storage for one tenant.
#[derive(Debug, Clone, Default)]
pub struct CheckpointStore {
    cursors: HashMap<CheckpointKey, Seq>,
}

impl CheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor for a key, defaulting to zero when none was ever written.
    pub fn get(&self, key: &CheckpointKey) -> Seq {
        self.cursors.get(key).copied().unwrap_or(0)
    }

    /// Persist a cursor for a key.
    pub fn set(&mut self, key: CheckpointKey, cursor: Seq) {
        self.cursors.insert(key, cursor);
    }

    /// Number of cursors ever written.
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Whether no cursor was ever written.
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cursor_defaults_to_zero() {
        let store = CheckpointStore::new();
        assert_eq!(store.get(&CheckpointKey::new("u1", "d1", "default")), 0);
    }

    #[test]
    fn cursors_are_independent_per_device() {
        let mut store = CheckpointStore::new();
        let d1 = CheckpointKey::new("u1", "d1", "default");
        let d2 = CheckpointKey::new("u1", "d2", "default");

        store.set(d1.clone(), 7);

        assert_eq!(store.get(&d1), 7);
        assert_eq!(store.get(&d2), 0);
    }

    #[test]
    fn cursors_are_independent_per_scope() {
        let mut store = CheckpointStore::new();
        let shared = CheckpointKey::new("u1", "d1", "shared");
        let personal = CheckpointKey::new("u1", "d1", "personal");

        store.set(shared.clone(), 3);
        store.set(personal.clone(), 9);

        assert_eq!(store.get(&shared), 3);
        assert_eq!(store.get(&personal), 9);
    }
}
