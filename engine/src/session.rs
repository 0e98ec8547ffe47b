//! The client-side sync cycle, as a state machine.
//!
//! A cycle is drain → push → pull → merge → checkpoint advance. Network IO
//! stays outside the engine: the session hands out the batch and the pull
//! request, and the caller reports back what the transport did. State only
//! ever changes at phase boundaries, so a cancelled or failed phase leaves
//! the outbox and checkpoints exactly where the last completed phase put
//! them.
//!
//! Cycles are single-flight per device. A second trigger while one is in
//! flight fails with [`Error::CycleInFlight`] and is remembered; callers
//! coalesce by checking [`SyncSession::take_rerun`] after the active cycle
//! finishes.

use crate::{
    error::{Error, Result},
    message::{PullBundle, PullRequest, PushBatch, PushOutcome, RejectCode},
    outbox::{Outbox, OutboxEvent},
    projection::Projection,
    DeviceId, EventId, Fields, ScopeName, Seq,
};
use std::collections::BTreeMap;

/// Where a session currently stands in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// No network exchange outstanding
    Idle,
    /// A batch was handed out and awaits its push outcome
    AwaitingPush,
    /// A pull request was handed out and awaits its bundle
    AwaitingPull,
}

/// A drained batch frozen until its push settles, so retries ship the
/// identical batch identity and the server's replay guard can recognize
/// them.
#[derive(Debug, Clone)]
struct PendingBatch {
    batch_id: String,
    event_ids: Vec<EventId>,
}

/// One device's sync state: outbox, local projection, and cursors.
#[derive(Debug)]
pub struct SyncSession {
    device_id: DeviceId,
    outbox: Outbox,
    projection: Projection,
    checkpoints: BTreeMap<ScopeName, Seq>,
    phase: CyclePhase,
    pending_batch: Option<PendingBatch>,
    rerun_requested: bool,
    /// Completed batches; the next batch id derives from it
    batch_seq: u64,
    /// Locally generated events; event ids derive from it
    event_seq: u64,
}

impl SyncSession {
    /// Create a fresh session for a device.
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            outbox: Outbox::new(),
            projection: Projection::new(),
            checkpoints: BTreeMap::new(),
            phase: CyclePhase::Idle,
            pending_batch: None,
            rerun_requested: false,
            batch_seq: 0,
            event_seq: 0,
        }
    }

    /// The device this session belongs to.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The local projection cache.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// The outbox queue.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Local cursors per scope.
    pub fn checkpoints(&self) -> &BTreeMap<ScopeName, Seq> {
        &self.checkpoints
    }

    /// Current cycle phase.
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    fn next_event_id(&mut self) -> EventId {
        self.event_seq += 1;
        format!("{}:{}", self.device_id, self.event_seq)
    }

    /// Record a local upsert: the projection is updated immediately and a
    /// reference-payload event enters the outbox, to be hydrated from the
    /// then-current state at send time. Returns the event id.
    pub fn record_upsert(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        data: &Fields,
        now: &str,
    ) -> EventId {
        self.projection
            .apply_upsert(entity_type, entity_id, Some(data), now);
        let event_id = self.next_event_id();
        self.outbox.enqueue(OutboxEvent::upsert_reference(
            event_id.clone(),
            entity_type,
            entity_id,
            now,
        ));
        event_id
    }

    /// Record a local delete: the projection gets a tombstone and a delete
    /// event enters the outbox. Returns the event id.
    pub fn record_delete(&mut self, entity_type: &str, entity_id: &str, now: &str) -> EventId {
        self.projection.apply_delete(entity_type, entity_id, now);
        let event_id = self.next_event_id();
        self.outbox.enqueue(OutboxEvent::delete(
            event_id.clone(),
            entity_type,
            entity_id,
            now,
        ));
        event_id
    }

    /// Start the push phase: drain and hydrate the outbox into a batch.
    ///
    /// Returns `None` when there is nothing to push — proceed straight to
    /// [`begin_pull`](Self::begin_pull). While a previous batch's outcome
    /// is still unknown, only its events are re-drained (under the same
    /// batch id); later mutations wait for the next cycle.
    pub fn begin_push(&mut self) -> Result<Option<PushBatch>> {
        if self.phase != CyclePhase::Idle {
            self.rerun_requested = true;
            return Err(Error::CycleInFlight);
        }

        let eligible = self.outbox.drain();
        let drained: Vec<&OutboxEvent> = match &self.pending_batch {
            Some(pending) => eligible
                .into_iter()
                .filter(|e| pending.event_ids.contains(&e.id))
                .collect(),
            None => eligible,
        };

        if drained.is_empty() {
            self.pending_batch = None;
            return Ok(None);
        }

        let events = drained
            .iter()
            .map(|e| e.hydrate(&self.projection))
            .collect();
        let event_ids: Vec<EventId> = drained.iter().map(|e| e.id.clone()).collect();
        let batch_id = match &self.pending_batch {
            Some(pending) => pending.batch_id.clone(),
            None => format!("{}:{}", self.device_id, self.batch_seq + 1),
        };
        self.pending_batch = Some(PendingBatch {
            batch_id: batch_id.clone(),
            event_ids,
        });
        self.phase = CyclePhase::AwaitingPush;

        Ok(Some(PushBatch {
            device_id: self.device_id.clone(),
            batch_id,
            events,
        }))
    }

    /// Settle the push phase from the server's outcome.
    ///
    /// Accepted events become `synced`; replay rejections also become
    /// `synced` (the server already holds them); any other rejection
    /// becomes `failed` and retries next cycle. A fully replayed batch
    /// syncs everything it carried.
    pub fn complete_push(&mut self, outcome: &PushOutcome) -> Result<()> {
        if self.phase != CyclePhase::AwaitingPush {
            return Err(Error::OutOfPhase { expected: "push" });
        }
        let pending = self.pending_batch.take();

        if outcome.replayed {
            if let Some(pending) = pending {
                self.outbox.mark_synced(&pending.event_ids);
            }
        } else {
            self.outbox.mark_synced(&outcome.accepted);
            for rejection in &outcome.rejected {
                let ids = [rejection.event_id.clone()];
                match rejection.code {
                    RejectCode::IdempotentReplay => self.outbox.mark_synced(&ids),
                    _ => self
                        .outbox
                        .mark_failed(&ids, &format!("{}: {}", rejection.code, rejection.message)),
                }
            }
        }

        self.batch_seq += 1;
        self.phase = CyclePhase::Idle;
        Ok(())
    }

    /// Abandon the push phase after a transport failure.
    ///
    /// All drained events are marked `failed` with the error and stay in
    /// place; the frozen batch identity is kept so the retry is
    /// recognizable as a replay if the server did process it.
    pub fn abort_push(&mut self, error: &str) -> Result<()> {
        if self.phase != CyclePhase::AwaitingPush {
            return Err(Error::OutOfPhase { expected: "push" });
        }
        if let Some(pending) = &self.pending_batch {
            let ids = pending.event_ids.clone();
            self.outbox.mark_failed(&ids, error);
        }
        self.phase = CyclePhase::Idle;
        Ok(())
    }

    /// Start the pull phase. The request carries this device's cursors as
    /// explicit checkpoints, so the server serves exactly what this device
    /// has not yet seen.
    pub fn begin_pull(&mut self) -> Result<PullRequest> {
        if self.phase != CyclePhase::Idle {
            self.rerun_requested = true;
            return Err(Error::CycleInFlight);
        }
        self.phase = CyclePhase::AwaitingPull;

        let mut request = PullRequest::for_device(self.device_id.clone());
        request.checkpoints = self.checkpoints.clone();
        Ok(request)
    }

    /// Settle the pull phase: merge entries into the local projection by
    /// last-write-wins and advance the cursors the server handed back.
    /// Returns how many entries were actually applied.
    pub fn complete_pull(&mut self, bundle: &PullBundle) -> Result<usize> {
        if self.phase != CyclePhase::AwaitingPull {
            return Err(Error::OutOfPhase { expected: "pull" });
        }

        let mut applied = 0;
        for scope in &bundle.results {
            for entry in &scope.changes {
                if self.projection.merge_remote(entry) {
                    applied += 1;
                }
            }
        }
        for (scope, cursor) in &bundle.next_checkpoints {
            self.checkpoints.insert(scope.clone(), *cursor);
        }

        self.phase = CyclePhase::Idle;
        Ok(applied)
    }

    /// Abandon the pull phase. Projection and cursors stay at the last
    /// completed phase boundary.
    pub fn abort_pull(&mut self) -> Result<()> {
        if self.phase != CyclePhase::AwaitingPull {
            return Err(Error::OutOfPhase { expected: "pull" });
        }
        self.phase = CyclePhase::Idle;
        Ok(())
    }

    /// Rewind a scope cursor (e.g. to zero for a full re-pull); takes
    /// effect on the next pull.
    pub fn reset_checkpoint(&mut self, scope: impl Into<ScopeName>, cursor: Seq) {
        self.checkpoints.insert(scope.into(), cursor);
    }

    /// Whether a sync trigger arrived while a cycle was in flight. Reading
    /// clears the flag; callers use it to run one more cycle.
    pub fn take_rerun(&mut self) -> bool {
        std::mem::take(&mut self.rerun_requested)
    }

    pub(crate) fn export_parts(
        &self,
    ) -> (
        &DeviceId,
        &Outbox,
        &Projection,
        &BTreeMap<ScopeName, Seq>,
        u64,
        u64,
    ) {
        (
            &self.device_id,
            &self.outbox,
            &self.projection,
            &self.checkpoints,
            self.batch_seq,
            self.event_seq,
        )
    }

    pub(crate) fn import_parts(
        &mut self,
        outbox: Outbox,
        projection: Projection,
        checkpoints: BTreeMap<ScopeName, Seq>,
        batch_seq: u64,
        event_seq: u64,
    ) {
        self.outbox = outbox;
        self.projection = projection;
        self.checkpoints = checkpoints;
        self.batch_seq = batch_seq;
        self.event_seq = event_seq;
        self.phase = CyclePhase::Idle;
        self.pending_batch = None;
        self.rerun_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RejectedEvent;
    use crate::outbox::SyncStatus;
    use serde_json::json;

    const T0: &str = "2024-03-01T10:00:00Z";

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn session_with_one_note() -> SyncSession {
        let mut session = SyncSession::new("device-1");
        session.record_upsert("notes", "note-1", &fields(json!({"title": "hello"})), T0);
        session
    }

    #[test]
    fn record_upsert_updates_projection_and_outbox() {
        let session = session_with_one_note();

        let record = session.projection().get("notes", "note-1").unwrap();
        assert_eq!(record.value.get("title"), Some(&json!("hello")));
        assert_eq!(session.outbox().pending_count(), 1);
    }

    #[test]
    fn begin_push_hydrates_current_state() {
        let mut session = session_with_one_note();

        // Edit after enqueue; the batch must carry the edit
        session.record_upsert("notes", "note-1", &fields(json!({"title": "edited"})), "2024-03-01T10:05:00Z");

        let batch = session.begin_push().unwrap().unwrap();
        assert_eq!(
            batch.events[0].body.data().and_then(|d| d.get("title")),
            Some(&json!("edited"))
        );
    }

    #[test]
    fn begin_push_with_empty_outbox_skips() {
        let mut session = SyncSession::new("device-1");
        assert!(session.begin_push().unwrap().is_none());
        assert_eq!(session.phase(), CyclePhase::Idle);
    }

    #[test]
    fn single_flight_with_coalescing() {
        let mut session = session_with_one_note();
        let _batch = session.begin_push().unwrap().unwrap();

        assert_eq!(session.begin_push().unwrap_err(), Error::CycleInFlight);
        assert_eq!(session.begin_pull().unwrap_err(), Error::CycleInFlight);

        // The lost trigger surfaces exactly once after the cycle settles
        assert!(session.take_rerun());
        assert!(!session.take_rerun());
    }

    #[test]
    fn complete_push_settles_statuses() {
        let mut session = SyncSession::new("device-1");
        let accepted_id = session.record_upsert("notes", "n1", &fields(json!({})), T0);
        let replayed_id = session.record_upsert("notes", "n2", &fields(json!({})), T0);
        let failed_id = session.record_upsert("notes", "n3", &fields(json!({})), T0);

        session.begin_push().unwrap().unwrap();
        session
            .complete_push(&PushOutcome {
                replayed: false,
                accepted: vec![accepted_id.clone()],
                rejected: vec![
                    RejectedEvent {
                        event_id: replayed_id.clone(),
                        code: RejectCode::IdempotentReplay,
                        message: "event was already applied".into(),
                    },
                    RejectedEvent {
                        event_id: failed_id.clone(),
                        code: RejectCode::InternalError,
                        message: "storage unavailable".into(),
                    },
                ],
                server_watermark: 2,
            })
            .unwrap();

        assert_eq!(session.outbox().get(&accepted_id).unwrap().sync_status, SyncStatus::Synced);
        // A replayed event is already on the server; never retried
        assert_eq!(session.outbox().get(&replayed_id).unwrap().sync_status, SyncStatus::Synced);

        let failed = session.outbox().get(&failed_id).unwrap();
        assert_eq!(failed.sync_status, SyncStatus::Failed);
        assert!(failed.last_error.as_deref().unwrap().contains("INTERNAL_ERROR"));
        assert_eq!(session.outbox().pending_count(), 1);
    }

    #[test]
    fn aborted_push_retries_with_same_batch_id() {
        let mut session = session_with_one_note();

        let first = session.begin_push().unwrap().unwrap();
        session.abort_push("connection reset").unwrap();

        // New mutation arrives between the attempts
        session.record_upsert("notes", "note-2", &fields(json!({})), "2024-03-01T10:06:00Z");

        let retry = session.begin_push().unwrap().unwrap();
        assert_eq!(retry.batch_id, first.batch_id);
        // The frozen batch excludes the newcomer
        assert_eq!(retry.events.len(), first.events.len());

        // Once the retry settles, the newcomer goes out under a fresh id
        session.complete_push(&PushOutcome::replayed(1)).unwrap();
        let next = session.begin_push().unwrap().unwrap();
        assert_ne!(next.batch_id, first.batch_id);
        assert_eq!(next.events.len(), 1);
    }

    #[test]
    fn replayed_outcome_syncs_whole_batch() {
        let mut session = session_with_one_note();
        session.begin_push().unwrap().unwrap();
        session.abort_push("ack lost").unwrap();

        session.begin_push().unwrap().unwrap();
        session.complete_push(&PushOutcome::replayed(1)).unwrap();

        assert_eq!(session.outbox().pending_count(), 0);
    }

    #[test]
    fn pull_carries_cursors_and_advances_them() {
        let mut session = SyncSession::new("device-1");
        session.reset_checkpoint("default", 5);

        let request = session.begin_pull().unwrap();
        assert_eq!(request.checkpoints.get("default"), Some(&5));

        let mut next = BTreeMap::new();
        next.insert("default".to_string(), 9);
        session
            .complete_pull(&PullBundle {
                results: vec![],
                next_checkpoints: next,
            })
            .unwrap();
        assert_eq!(session.checkpoints().get("default"), Some(&9));
    }

    #[test]
    fn aborted_pull_leaves_state_untouched() {
        let mut session = SyncSession::new("device-1");
        session.reset_checkpoint("default", 5);

        session.begin_pull().unwrap();
        session.abort_pull().unwrap();

        assert_eq!(session.checkpoints().get("default"), Some(&5));
        assert_eq!(session.phase(), CyclePhase::Idle);
    }

    #[test]
    fn phase_mismatch_is_rejected() {
        let mut session = SyncSession::new("device-1");

        assert!(matches!(
            session.complete_push(&PushOutcome::replayed(0)),
            Err(Error::OutOfPhase { expected: "push" })
        ));
        assert!(matches!(
            session.abort_pull(),
            Err(Error::OutOfPhase { expected: "pull" })
        ));
    }
}
