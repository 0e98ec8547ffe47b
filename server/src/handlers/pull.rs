//! Pull handler - serves checkpointed change entries to devices.

use crate::db;
use crate::error::Result;
use crate::AppState;
use std::collections::BTreeMap;
use tidemark_engine::scope::Principal;
use tidemark_engine::{validate, ChangeEntry, PullBundle, PullRequest, ScopeChanges};

/// Process a pull request from a device, scope by scope.
///
/// Explicit cursors in the request override stored checkpoints for this
/// call. Each scope's next cursor is the highest sequence among the
/// entries that survived the visibility filter, or the incoming cursor
/// when none did; it is persisted for the exact `(user, device, scope)`
/// key before the response is returned.
pub async fn handle_pull(
    state: &AppState,
    principal: &Principal,
    request: PullRequest,
) -> Result<PullBundle> {
    validate::validate_pull(&request)?;

    if !db::tenant_exists(&state.pool, &principal.tenant_id).await? {
        return Err(tidemark_engine::Error::TenantNotFound(principal.tenant_id.clone()).into());
    }

    let limit = request.effective_limit() as i64;
    let scopes: Vec<String> = match &request.scopes {
        Some(scopes) => scopes.clone(),
        None => state
            .policy
            .scope_names()
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    let mut results = Vec::with_capacity(scopes.len());
    let mut next_checkpoints = BTreeMap::new();

    for scope in scopes {
        let since = match request.checkpoints.get(&scope) {
            Some(cursor) => *cursor as i64,
            None => {
                db::get_checkpoint(
                    &state.pool,
                    &principal.tenant_id,
                    &principal.user_id,
                    &request.device_id,
                    &scope,
                )
                .await?
            }
        };

        let stored = db::entries_since(&state.pool, &principal.tenant_id, since, limit).await?;

        let mut changes: Vec<ChangeEntry> = Vec::new();
        for row in stored {
            match row.into_entry() {
                Ok(entry) => {
                    if state.policy.scope_of(&entry.entity_type) == scope
                        && state.policy.is_visible(&entry, principal)
                    {
                        changes.push(entry);
                    }
                }
                Err(e) => {
                    tracing::warn!("skipping malformed change entry: {}", e);
                }
            }
        }

        let cursor = changes.last().map(|entry| entry.seq as i64).unwrap_or(since);
        db::set_checkpoint(
            &state.pool,
            &principal.tenant_id,
            &principal.user_id,
            &request.device_id,
            &scope,
            cursor,
        )
        .await?;

        next_checkpoints.insert(scope.clone(), cursor as u64);
        results.push(ScopeChanges { scope, changes });
    }

    Ok(PullBundle {
        results,
        next_checkpoints,
    })
}
