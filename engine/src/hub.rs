//! The multi-tenant server of record, in memory.
//!
//! `SyncHub` owns one change log, projection, idempotency ledger,
//! checkpoint store, and blob manifest per tenant, keyed by tenant id at
//! the top level — a lookup under the wrong tenant structurally finds
//! nothing. All semantics of the sync protocol (idempotent apply, gapless
//! sequence assignment, visibility-filtered pulls, cursor persistence)
//! live here as pure logic; the HTTP server mirrors them onto durable
//! storage.

use crate::{
    changelog::{ChangeEntry, ChangeLog},
    checkpoint::{CheckpointKey, CheckpointStore},
    error::{Error, Result},
    event::EventBody,
    ledger::IdempotencyLedger,
    message::{PullBundle, PullRequest, PushBatch, PushOutcome, RejectCode, RejectedEvent, ScopeChanges},
    projection::{Projection, SyncRecord},
    scope::{Principal, ScopePolicy},
    validate, ScopeName, Seq, TenantId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Everything the server holds for one tenant.
#[derive(Debug, Default)]
struct TenantState {
    log: ChangeLog,
    projection: Projection,
    ledger: IdempotencyLedger,
    checkpoints: CheckpointStore,
    blobs: BTreeSet<String>,
}

impl TenantState {
    fn new(tenant_id: &str) -> Self {
        Self {
            log: ChangeLog::new(tenant_id),
            ..Self::default()
        }
    }
}

/// In-memory server of record for any number of tenants.
#[derive(Debug, Default)]
pub struct SyncHub {
    policy: ScopePolicy,
    tenants: HashMap<TenantId, TenantState>,
}

impl SyncHub {
    /// Create a hub with the given scope policy.
    pub fn new(policy: ScopePolicy) -> Self {
        Self {
            policy,
            tenants: HashMap::new(),
        }
    }

    /// The scope policy in force.
    pub fn policy(&self) -> &ScopePolicy {
        &self.policy
    }

    /// Register a tenant. Returns false if it already existed.
    pub fn create_tenant(&mut self, tenant_id: impl Into<TenantId>) -> bool {
        let tenant_id = tenant_id.into();
        if self.tenants.contains_key(&tenant_id) {
            return false;
        }
        let state = TenantState::new(&tenant_id);
        self.tenants.insert(tenant_id, state);
        true
    }

    /// Whether a tenant is registered.
    pub fn tenant_exists(&self, tenant_id: &str) -> bool {
        self.tenants.contains_key(tenant_id)
    }

    fn tenant(&self, tenant_id: &str) -> Result<&TenantState> {
        self.tenants
            .get(tenant_id)
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))
    }

    /// Apply one device's batch idempotently.
    ///
    /// The batch-level guard short-circuits a retry of an already processed
    /// batch; the event-level guard rejects individual replays inside a
    /// fresh batch without blocking its siblings. Events lacking
    /// `occurred_at` are stamped with `received_at`. The batch marker is
    /// written only after every event has been evaluated.
    pub fn push(
        &mut self,
        principal: &Principal,
        batch: PushBatch,
        received_at: &str,
    ) -> Result<PushOutcome> {
        validate::validate_batch(&batch)?;

        let state = self
            .tenants
            .get_mut(&principal.tenant_id)
            .ok_or_else(|| Error::TenantNotFound(principal.tenant_id.clone()))?;

        if state.ledger.batch_seen(&batch.device_id, &batch.batch_id) {
            return Ok(PushOutcome::replayed(state.log.last_seq()));
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for event in &batch.events {
            if state.ledger.event_seen(&event.event_id) {
                rejected.push(RejectedEvent {
                    event_id: event.event_id.clone(),
                    code: RejectCode::IdempotentReplay,
                    message: "event was already applied".into(),
                });
                continue;
            }

            let occurred_at = event
                .occurred_at
                .clone()
                .unwrap_or_else(|| received_at.to_string());

            match &event.body {
                EventBody::Upsert { data } => state.projection.apply_upsert(
                    &event.entity_type,
                    &event.entity_id,
                    data.as_ref(),
                    &occurred_at,
                ),
                EventBody::Delete => {
                    state
                        .projection
                        .apply_delete(&event.entity_type, &event.entity_id, &occurred_at)
                }
            }

            state.log.append(
                event.entity_type.clone(),
                event.entity_id.clone(),
                event.body.clone(),
                occurred_at,
                Some(principal.user_id.clone()),
            );
            state.ledger.mark_event(&event.event_id);
            accepted.push(event.event_id.clone());
        }

        state.ledger.mark_batch(&batch.device_id, &batch.batch_id);

        Ok(PushOutcome {
            replayed: false,
            accepted,
            rejected,
            server_watermark: state.log.last_seq(),
        })
    }

    /// Serve new change entries to a device, scope by scope.
    ///
    /// Explicit cursors in the request override stored checkpoints for
    /// this call. Each scope's next cursor is the highest sequence among
    /// the entries that survived the visibility filter, or the incoming
    /// cursor when none did; it is persisted for the exact
    /// `(user, device, scope)` key before returning.
    pub fn pull(&mut self, principal: &Principal, request: &PullRequest) -> Result<PullBundle> {
        validate::validate_pull(request)?;

        let state = self
            .tenants
            .get_mut(&principal.tenant_id)
            .ok_or_else(|| Error::TenantNotFound(principal.tenant_id.clone()))?;

        let limit = request.effective_limit();
        let scopes: Vec<ScopeName> = match &request.scopes {
            Some(scopes) => scopes.clone(),
            None => self.policy.scope_names().iter().map(|s| s.to_string()).collect(),
        };

        let mut results = Vec::with_capacity(scopes.len());
        let mut next_checkpoints = BTreeMap::new();

        for scope in scopes {
            let key = CheckpointKey::new(
                principal.user_id.clone(),
                request.device_id.clone(),
                scope.clone(),
            );
            let since = request
                .checkpoints
                .get(&scope)
                .copied()
                .unwrap_or_else(|| state.checkpoints.get(&key));

            let changes: Vec<ChangeEntry> = state
                .log
                .entries_since(since, limit)
                .into_iter()
                .filter(|entry| {
                    self.policy.scope_of(&entry.entity_type) == scope
                        && self.policy.is_visible(entry, principal)
                })
                .collect();

            let cursor = changes.last().map(|entry| entry.seq).unwrap_or(since);
            state.checkpoints.set(key, cursor);
            next_checkpoints.insert(scope.clone(), cursor);
            results.push(ScopeChanges { scope, changes });
        }

        Ok(PullBundle {
            results,
            next_checkpoints,
        })
    }

    /// Current watermark for a tenant.
    pub fn last_seq(&self, tenant_id: &str) -> Result<Seq> {
        Ok(self.tenant(tenant_id)?.log.last_seq())
    }

    /// Raw log read: entries with `seq > since`, unfiltered.
    pub fn entries_since(
        &self,
        tenant_id: &str,
        since: Seq,
        limit: usize,
    ) -> Result<Vec<ChangeEntry>> {
        Ok(self.tenant(tenant_id)?.log.entries_since(since, limit))
    }

    /// Current projected state of one entity, tombstones included.
    pub fn record(&self, tenant_id: &str, entity_type: &str, entity_id: &str) -> Option<&SyncRecord> {
        self.tenants
            .get(tenant_id)?
            .projection
            .get(entity_type, entity_id)
    }

    /// The subset of `content_ids` not yet present in the tenant's blob
    /// manifest, input order preserved, duplicates collapsed.
    pub fn need_list(&self, tenant_id: &str, content_ids: &[String]) -> Result<Vec<String>> {
        let state = self.tenant(tenant_id)?;
        let mut seen = BTreeSet::new();
        Ok(content_ids
            .iter()
            .filter(|id| !state.blobs.contains(*id) && seen.insert((*id).clone()))
            .cloned()
            .collect())
    }

    /// Record content ids as present server-side. Returns how many were new.
    pub fn register_blobs(&mut self, tenant_id: &str, content_ids: &[String]) -> Result<usize> {
        let state = self
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;
        let before = state.blobs.len();
        state.blobs.extend(content_ids.iter().cloned());
        Ok(state.blobs.len() - before)
    }
}
