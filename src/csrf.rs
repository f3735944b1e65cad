//! CSRF token generation and the double-submit header.
//!
//! The token is minted here on login/refresh and stored in the one cookie
//! page script can read. Clients copy it into `x-csrf-token` on every
//! mutating request; the backend compares.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::auth::{CSRF_COOKIE_NAME, find_cookie};

/// Header carrying the CSRF token on mutating requests.
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

/// Header carrying the session's CSRF cookie value to the backend.
pub const SESSION_CSRF_HEADER: HeaderName = HeaderName::from_static("x-session-csrf");

/// Generate a fresh random CSRF token (32 bytes, base64url).
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// POST, PUT, PATCH and DELETE.
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Attach the CSRF cookie value to an outgoing request.
///
/// `cookie_source` is the script-visible cookie string at call time (the
/// `document.cookie` equivalent). Safe methods and missing cookies leave the
/// headers untouched. Returns whether the header was set.
pub fn attach_csrf_token(method: &Method, headers: &mut HeaderMap, cookie_source: &str) -> bool {
    if !is_mutating(method) {
        return false;
    }
    let Some(token) = find_cookie(cookie_source, CSRF_COOKIE_NAME) else {
        return false;
    };
    match HeaderValue::from_str(token) {
        Ok(value) => {
            headers.insert(CSRF_HEADER, value);
            true
        }
        Err(_) => false,
    }
}

/// Constant-time comparison of the submitted header against the cookie.
pub fn tokens_match(submitted: Option<&str>, cookie: Option<&str>) -> bool {
    match (submitted, cookie) {
        (Some(submitted), Some(cookie)) => bool::from(submitted.as_bytes().ct_eq(cookie.as_bytes())),
        _ => false,
    }
}
