//! Per-request view of the session cookies.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use super::cookie::{
    ACCESS_COOKIE_NAME, ACTOR_COOKIE_NAME, CSRF_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie,
};
use super::types::AuthMode;

/// Session values carried by the incoming request's cookies.
#[derive(Debug, Clone, Default)]
pub struct SessionCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub csrf_token: Option<String>,
    pub actor_id: Option<String>,
}

impl SessionCredentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name| get_cookie(headers, name).map(str::to_string);
        Self {
            access_token: read(ACCESS_COOKIE_NAME),
            refresh_token: read(REFRESH_COOKIE_NAME),
            csrf_token: read(CSRF_COOKIE_NAME),
            actor_id: read(ACTOR_COOKIE_NAME),
        }
    }

    /// Whether the cookies count as a signed-in session under `mode`.
    pub fn is_authenticated(&self, mode: AuthMode) -> bool {
        let actor = mode.uses_actor() && self.actor_id.is_some();
        let tokens =
            mode.uses_tokens() && (self.access_token.is_some() || self.refresh_token.is_some());
        actor || tokens
    }
}

/// Extractor for the session cookies. Never rejects.
pub struct Credentials(pub SessionCredentials);

impl<S> FromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Credentials(SessionCredentials::from_headers(&parts.headers)))
    }
}
