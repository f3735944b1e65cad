//! Cookie-based session handling.
//!
//! The browser never sees the access or refresh token: both live in
//! `HttpOnly` cookies and are only read here, server-side, when the gateway
//! builds an upstream request. The CSRF cookie is the one script-readable
//! value.

mod cookie;
mod credentials;
mod errors;
mod gate;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, ACTOR_COOKIE_NAME, ACTOR_MAX_AGE, ALL_AUTH_COOKIES, CSRF_COOKIE_NAME,
    CookieJar, CookieSettings, DEFAULT_ACCESS_MAX_AGE, DEFAULT_REFRESH_MAX_AGE,
    REFRESH_COOKIE_NAME, find_cookie, get_cookie,
};
pub use credentials::{Credentials, SessionCredentials};
pub use errors::{AuthError, LoginRedirect};
pub use gate::{ADMIN_LOGIN_PATH, admin_access_allowed, admin_gate};
pub use types::{AuthMode, SessionCredentialPair, SessionPayload, extract_user_id};
