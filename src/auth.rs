use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::HeaderMap, request::Parts},
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::post_view::ViewerContext;
use crate::models::user::User;
use crate::schema::users;

/// Header carrying the authenticated user id, set by the upstream
/// identity gateway after it has verified the caller's credentials.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's session key (anonymous or not)
pub const SESSION_HEADER: &str = "x-session-id";

/// Caller identity as every permission check sees it
#[derive(Debug, Clone, Copy)]
pub enum Viewer {
    Anonymous,
    User { id: Uuid, is_staff: bool },
}

impl Viewer {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User { id, .. } => Some(*id),
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Viewer::User { is_staff: true, .. })
    }
}

/// Extractor for endpoints that require a signed-in caller
pub struct AuthUser(pub User);

/// Extractor for endpoints that serve anonymous callers too
pub struct MaybeUser(pub Option<User>);

impl AuthUser {
    pub fn viewer(&self) -> Viewer {
        Viewer::User {
            id: self.0.id,
            is_staff: self.0.is_staff,
        }
    }
}

impl MaybeUser {
    pub fn viewer(&self) -> Viewer {
        match &self.0 {
            Some(user) => Viewer::User {
                id: user.id,
                is_staff: user.is_staff,
            },
            None => Viewer::Anonymous,
        }
    }
}

async fn resolve_user(parts: &Parts, pool: &DbPool) -> Result<Option<User>, ApiError> {
    let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };

    let id = raw
        .to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| ApiError::validation("Malformed X-User-Id header"))?;

    let mut conn = pool.get().await?;
    let user = users::table
        .find(id)
        .filter(users::is_active.eq(true))
        .first::<User>(&mut conn)
        .await
        .optional()?;

    Ok(user)
}

#[async_trait]
impl FromRequestParts<DbPool> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, pool: &DbPool) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve_user(parts, pool).await?))
    }
}

#[async_trait]
impl FromRequestParts<DbPool> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, pool: &DbPool) -> Result<Self, Self::Rejection> {
        match resolve_user(parts, pool).await? {
            Some(user) => Ok(AuthUser(user)),
            None => Err(ApiError::AuthenticationRequired),
        }
    }
}

/// Assemble the viewer context for view recording from request headers
pub fn viewer_context(headers: &HeaderMap, user_id: Option<Uuid>) -> ViewerContext {
    let session_key = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // First hop of X-Forwarded-For, falling back to nothing; the
    // address is recorded for the ledger only, never used as a key
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    ViewerContext {
        user_id,
        session_key,
        ip_address,
        user_agent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test_log::test]
    fn viewer_context_reads_forwarded_chain_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("sess-1"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );

        let ctx = viewer_context(&headers, None);
        assert_eq!(ctx.session_key, "sess-1");
        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.9"));
        assert!(ctx.user_id.is_none());
    }

    #[test_log::test]
    fn viewer_context_tolerates_missing_headers() {
        let ctx = viewer_context(&HeaderMap::new(), None);
        assert_eq!(ctx.session_key, "");
        assert!(ctx.ip_address.is_none());
        assert_eq!(ctx.user_agent, "");
    }
}
