//! Principal extraction.
//!
//! Session issuance and validation live outside this service; the sync
//! core only consumes an already-established identity. In development the
//! bearer token directly carries the claims as `tenant:user[:role]` —
//! production deployments validate a signed session token here instead and
//! resolve the same three claims from it.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use tidemark_engine::scope::{Principal, Role};

use crate::AppState;

/// The authenticated caller, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct SyncPrincipal(pub Principal);

impl FromRequestParts<AppState> for SyncPrincipal {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let Some(header) = auth_header else {
            return Err((StatusCode::UNAUTHORIZED, "Missing authorization header"));
        };
        let Some(token) = header.strip_prefix("Bearer ") else {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header format",
            ));
        };

        parse_token(token)
            .map(SyncPrincipal)
            .ok_or((StatusCode::UNAUTHORIZED, "Malformed bearer token"))
    }
}

/// Parse a development token of the form `tenant:user[:role]`.
fn parse_token(token: &str) -> Option<Principal> {
    let mut parts = token.splitn(3, ':');
    let tenant = parts.next().filter(|s| !s.is_empty())?;
    let user = parts.next().filter(|s| !s.is_empty())?;
    let role = match parts.next() {
        Some("admin") => Role::Admin,
        Some("member") | None => Role::Member,
        Some(_) => return None,
    };

    Some(Principal::new(tenant, user, role))
}
