//! Caller identity for the HTTP and WebSocket surfaces.
//!
//! Authentication happens upstream: the API gateway verifies the token and
//! forwards the user id as `x-user-id`. This service must not be reachable
//! without that gateway in front of it. Roles come from the user directory,
//! so a forwarded `x-user-role` is not consulted.

use std::sync::LazyLock;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use regex::Regex;

use crate::common::UserId;
use crate::error::ChatError;

pub const USER_ID_HEADER: &str = "x-user-id";

static USER_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid user id pattern"));

/// Verified caller as forwarded by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
}

pub fn is_valid_user_id(id: &str) -> bool {
    USER_ID_PATTERN.is_match(id)
}

fn from_headers(parts: &Parts) -> Result<Option<AuthenticatedUser>, ChatError> {
    let Some(raw_id) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };

    let id = raw_id
        .to_str()
        .ok()
        .filter(|id| is_valid_user_id(id))
        .ok_or_else(|| ChatError::Unauthorized("malformed user id header".to_string()))?;

    log::trace!("Caller {id} extracted from headers");
    Ok(Some(AuthenticatedUser {
        id: UserId::new(id),
    }))
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        from_headers(parts)?
            .ok_or_else(|| ChatError::Unauthorized("authentication required".to_string()))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        from_headers(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_object_ids_and_slugs() {
        assert!(is_valid_user_id("64b7f0c2a1e4d5f6a7b8c9d0"));
        assert!(is_valid_user_id("company_42-x"));
    }

    #[test]
    fn rejects_empty_and_odd_characters() {
        assert!(!is_valid_user_id(""));
        assert!(!is_valid_user_id("alice bob"));
        assert!(!is_valid_user_id("../etc"));
        assert!(!is_valid_user_id(&"a".repeat(65)));
    }
}
