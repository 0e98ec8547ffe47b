//! Scopes, roles, and the pull visibility filter.
//!
//! A scope is a named slice of the change stream; each entity type belongs
//! to exactly one scope and each scope carries a visibility rule. Cursors
//! are tracked per scope, so a device can replicate shared content and its
//! user's private records at independent paces.

use crate::{changelog::ChangeEntry, EntityType, ScopeName, TenantId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Scope used for entity types no rule claims.
pub const DEFAULT_SCOPE: &str = "default";

/// Caller role within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular user; subject to owner-only visibility
    Member,
    /// Privileged user; sees every entry in the tenant
    Admin,
}

/// The authenticated caller of a push or pull.
///
/// Session issuance is an external collaborator; the engine only consumes
/// the extracted identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Tenant the caller operates in
    pub tenant_id: TenantId,
    /// Caller's user id
    pub user_id: UserId,
    /// Caller's role
    pub role: Role,
}

impl Principal {
    /// Build a principal.
    pub fn new(tenant_id: impl Into<TenantId>, user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            role,
        }
    }

    /// Whether the caller bypasses owner-only visibility.
    pub fn is_privileged(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Who may see the entries of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    /// Every caller in the tenant
    Shared,
    /// Only the user that produced the entry, plus privileged callers
    OwnerOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeRule {
    visibility: Visibility,
    entity_types: BTreeSet<EntityType>,
}

/// Assignment of entity types to scopes and scopes to visibility rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopePolicy {
    default_scope: ScopeName,
    scopes: BTreeMap<ScopeName, ScopeRule>,
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SCOPE)
    }
}

impl ScopePolicy {
    /// A policy with a single catch-all scope of shared visibility.
    pub fn new(default_scope: impl Into<ScopeName>) -> Self {
        Self {
            default_scope: default_scope.into(),
            scopes: BTreeMap::new(),
        }
    }

    /// Builder-style method to declare a scope.
    pub fn with_scope<I, S>(mut self, name: impl Into<ScopeName>, visibility: Visibility, entity_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityType>,
    {
        self.scopes.insert(
            name.into(),
            ScopeRule {
                visibility,
                entity_types: entity_types.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// The scope an entity type belongs to.
    pub fn scope_of(&self, entity_type: &str) -> &str {
        self.scopes
            .iter()
            .find(|(_, rule)| rule.entity_types.contains(entity_type))
            .map(|(name, _)| name.as_str())
            .unwrap_or(&self.default_scope)
    }

    /// Visibility rule for a scope; unknown scopes and the catch-all scope
    /// are shared.
    pub fn visibility_of(&self, scope: &str) -> Visibility {
        self.scopes
            .get(scope)
            .map(|rule| rule.visibility)
            .unwrap_or(Visibility::Shared)
    }

    /// All scope names, catch-all first.
    pub fn scope_names(&self) -> Vec<&str> {
        let mut names = vec![self.default_scope.as_str()];
        for name in self.scopes.keys() {
            if name != &self.default_scope {
                names.push(name.as_str());
            }
        }
        names
    }

    /// Whether a change entry is visible to a caller.
    ///
    /// Entries in owner-only scopes are visible only to the user that
    /// pushed them, unless the caller is privileged. Entries never leak
    /// across this filter; a caller's cursor advances past what it cannot
    /// see (each caller has its own checkpoint, so nothing is lost for
    /// anyone else).
    pub fn is_visible(&self, entry: &ChangeEntry, principal: &Principal) -> bool {
        match self.visibility_of(self.scope_of(&entry.entity_type)) {
            Visibility::Shared => true,
            Visibility::OwnerOnly => {
                principal.is_privileged()
                    || entry.actor_id.as_deref() == Some(principal.user_id.as_str())
            }
        }
    }
}
