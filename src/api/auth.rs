//! Auth handshake endpoints.
//!
//! - POST `/login` - Relay credentials, issue session cookies from the backend's answer
//! - POST `/refresh` - Rotate the token pair using the refresh cookie
//! - POST `/logout` - Best-effort backend revocation, always clears cookies
//! - POST `/token` - Bearer-token exchange, requires the proxy key
//! - GET `/me` - Current user, plain gateway forward

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http_body_util::BodyExt;
use serde_json::json;
use tracing::{debug, info, warn};

use super::ProxyState;
use super::error::ApiError;
use super::gateway::{PROXY_KEY_HEADER, UpstreamPath, UpstreamResponse};
use crate::auth::{
    AuthError, CookieJar, Credentials, SessionCredentialPair, SessionPayload, extract_user_id,
};
use crate::csrf::generate_csrf_token;
use crate::rate_limit::{RateLimitConfig, rate_limit_login};

pub fn router(rate_limit: RateLimitConfig) -> Router<ProxyState> {
    Router::new()
        .route(
            "/login",
            post(login).layer(middleware::from_fn_with_state(rate_limit, rate_limit_login)),
        )
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/token", post(token))
        .route("/me", get(me))
}

/// A fully read upstream answer, for handlers that must inspect the body.
struct UpstreamReply {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
}

impl UpstreamReply {
    async fn read(response: UpstreamResponse) -> Result<Self, ApiError> {
        let (parts, body) = response.into_parts();
        let status = parts.status;
        let content_type = parts.headers.get(header::CONTENT_TYPE).cloned();
        let body = body
            .collect()
            .await
            .map_err(|e| ApiError::upstream("Failed to read upstream response", &e))?
            .to_bytes();
        Ok(Self {
            status,
            content_type,
            body,
        })
    }

    fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Status, content type and body bytes exactly as received.
    fn verbatim(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        match self.content_type {
            Some(content_type) => {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, content_type);
            }
            None => {
                response.headers_mut().remove(header::CONTENT_TYPE);
            }
        }
        response
    }

    /// JSON if the body parses, otherwise raw text under the original content type.
    fn passthrough(self) -> Response {
        if let Some(value) = self.json() {
            return (self.status, Json(value)).into_response();
        }
        let content_type = self
            .content_type
            .unwrap_or_else(|| HeaderValue::from_static("text/plain; charset=utf-8"));
        (
            self.status,
            [(header::CONTENT_TYPE, content_type)],
            self.body,
        )
            .into_response()
    }
}

fn json_content_type(headers: &HeaderMap) -> HeaderValue {
    headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"))
}

/// Write the token pair and a fresh CSRF token. The CSRF cookie lives as long
/// as the refresh token it is bound to.
fn issue_token_cookies(jar: &mut CookieJar, state: &ProxyState, pair: &SessionCredentialPair) {
    jar.set_access(&state.cookies, &pair.access_token, pair.access_max_age);
    jar.set_refresh(&state.cookies, &pair.refresh_token, pair.refresh_max_age);
    jar.set_csrf(&state.cookies, &generate_csrf_token(), pair.refresh_max_age);
}

/// Relay a login attempt and issue cookies when the backend accepts it.
async fn login(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let uri = state.upstream.uri_for(&UpstreamPath::new("/auth/login"), None)?;
    let upstream_headers = state
        .upstream
        .base_headers(Some(&json_content_type(&headers)))?;

    let response = state
        .upstream
        .send(Method::POST, uri, upstream_headers, Some(body))
        .await?;
    let reply = UpstreamReply::read(response).await?;

    let mut jar = CookieJar::new();
    if reply.status.is_success() {
        let payload = reply.json().unwrap_or_default();
        match extract_user_id(&payload) {
            Some(user_id) => {
                if state.auth_mode.uses_actor() {
                    jar.set_actor(&state.cookies, &user_id);
                }
                if state.auth_mode.uses_tokens() {
                    let pair = serde_json::from_value::<SessionPayload>(payload)
                        .ok()
                        .and_then(SessionPayload::into_credentials);
                    match pair {
                        Some(pair) => issue_token_cookies(&mut jar, &state, &pair),
                        None => debug!("Login response carries no token pair"),
                    }
                }
                info!(user_id = %user_id, "Login succeeded");
            }
            None => warn!("Login accepted upstream without a user id, no session issued"),
        }
    } else {
        debug!(status = %reply.status, "Login rejected upstream");
    }

    let mut response = reply.verbatim();
    jar.apply(response.headers_mut());
    Ok(response)
}

/// Rotate the token pair. Every failure clears the session cookies.
async fn refresh(State(state): State<ProxyState>, Credentials(credentials): Credentials) -> Response {
    let Some(refresh_token) = credentials.refresh_token else {
        return AuthError::new("No refresh token", state.cookies).into_response();
    };

    let mut jar = CookieJar::new();
    let mut response = match rotate_session(&state, &refresh_token).await {
        Ok(pair) => {
            issue_token_cookies(&mut jar, &state, &pair);
            Json(json!({
                "ok": true,
                "user": pair.user,
                "accessTokenExpiresIn": pair.access_max_age,
            }))
            .into_response()
        }
        Err(failure) => {
            jar.clear_all(&state.cookies);
            failure
        }
    };
    jar.apply(response.headers_mut());
    response
}

async fn rotate_session(
    state: &ProxyState,
    refresh_token: &str,
) -> Result<SessionCredentialPair, Response> {
    let uri = state
        .upstream
        .uri_for(&UpstreamPath::new("/auth/refresh"), None)
        .map_err(IntoResponse::into_response)?;
    let headers = state
        .upstream
        .base_headers(Some(&HeaderValue::from_static("application/json")))
        .map_err(IntoResponse::into_response)?;
    let body = json!({ "refreshToken": refresh_token }).to_string();

    let response = state
        .upstream
        .send(Method::POST, uri, headers, Some(Bytes::from(body)))
        .await
        .map_err(IntoResponse::into_response)?;
    let reply = UpstreamReply::read(response)
        .await
        .map_err(IntoResponse::into_response)?;

    if !reply.status.is_success() {
        warn!(status = %reply.status, "Token refresh rejected upstream");
        return Err(reply.passthrough());
    }

    reply
        .json()
        .and_then(|value| serde_json::from_value::<SessionPayload>(value).ok())
        .and_then(SessionPayload::into_credentials)
        .ok_or_else(|| {
            warn!("Token refresh response is missing required fields");
            ApiError::BadGateway("Invalid refresh response".into()).into_response()
        })
}

/// Clear the session. Never fails from the browser's point of view.
async fn logout(State(state): State<ProxyState>, Credentials(credentials): Credentials) -> Response {
    if let Some(refresh_token) = credentials.refresh_token {
        if let Err(e) = revoke_session(&state, &refresh_token).await {
            warn!(error = ?e, "Upstream logout failed, clearing local session anyway");
        }
    }

    let mut jar = CookieJar::new();
    jar.clear_all(&state.cookies);
    let mut response = Json(json!({ "ok": true })).into_response();
    jar.apply(response.headers_mut());
    response
}

async fn revoke_session(state: &ProxyState, refresh_token: &str) -> Result<(), ApiError> {
    let uri = state.upstream.uri_for(&UpstreamPath::new("/auth/logout"), None)?;
    let headers = state
        .upstream
        .base_headers(Some(&HeaderValue::from_static("application/json")))?;
    let body = json!({ "refreshToken": refresh_token }).to_string();

    let response = state
        .upstream
        .send(Method::POST, uri, headers, Some(Bytes::from(body)))
        .await?;
    if !response.status().is_success() {
        warn!(status = %response.status(), "Upstream logout returned an error");
    }
    Ok(())
}

/// Bearer-token passthrough guarded by the proxy key.
async fn token(
    State(state): State<ProxyState>,
    Credentials(credentials): Credentials,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let proxy_key = state.upstream.mandatory_proxy_key()?;
    let uri = state.upstream.uri_for(&UpstreamPath::new("/auth/token"), None)?;

    let mut upstream_headers = HeaderMap::new();
    upstream_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    upstream_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    upstream_headers.insert(header::CONTENT_TYPE, json_content_type(&headers));
    upstream_headers.insert(PROXY_KEY_HEADER, proxy_key);

    let bearer = headers
        .get(header::AUTHORIZATION)
        .filter(|v| v.as_bytes().starts_with(b"Bearer "))
        .cloned()
        .or_else(|| {
            credentials
                .access_token
                .and_then(|t| HeaderValue::from_str(&format!("Bearer {}", t)).ok())
        });
    if let Some(bearer) = bearer {
        upstream_headers.insert(header::AUTHORIZATION, bearer);
    }

    let response = state
        .upstream
        .send(Method::POST, uri, upstream_headers, Some(body))
        .await?;
    Ok(UpstreamReply::read(response).await?.passthrough())
}

async fn me(State(state): State<ProxyState>, request: Request) -> Result<Response, ApiError> {
    state
        .upstream
        .forward(request, UpstreamPath::new("/auth/me"))
        .await
}
