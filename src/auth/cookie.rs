//! Cookie parsing and `Set-Cookie` formatting for the session cookies.

use axum::http::{HeaderMap, HeaderValue, header};

/// Cookie name for the access token (server-only bearer credential).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token (server-only rotation credential).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie name for the CSRF token. The only cookie readable by page script.
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// Cookie name for the actor id used to tag proxied calls.
pub const ACTOR_COOKIE_NAME: &str = "actor_id";

/// Default access token lifetime when the backend omits it (15 minutes).
pub const DEFAULT_ACCESS_MAX_AGE: u64 = 900;

/// Default refresh token lifetime when the backend omits it (7 days).
pub const DEFAULT_REFRESH_MAX_AGE: u64 = 7 * 24 * 60 * 60;

/// Actor cookie lifetime (30 days).
pub const ACTOR_MAX_AGE: u64 = 30 * 24 * 60 * 60;

/// Every cookie owned by the session protocol.
pub const ALL_AUTH_COOKIES: [&str; 4] = [
    ACCESS_COOKIE_NAME,
    REFRESH_COOKIE_NAME,
    CSRF_COOKIE_NAME,
    ACTOR_COOKIE_NAME,
];

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        if let Some(value) = find_cookie(cookie_header, name) {
            return Some(value);
        }
    }
    None
}

/// Find a cookie in a `name=value; name2=value2` string.
///
/// Empty values are treated as absent, since a cleared cookie may linger
/// in a jar as `name=` until the browser drops it.
pub fn find_cookie<'a>(cookies: &'a str, name: &str) -> Option<&'a str> {
    for part in cookies.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

/// Attribute set shared by every cookie the proxy writes.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    /// Adds the `Secure` attribute (production deployments behind HTTPS).
    pub secure: bool,
}

impl CookieSettings {
    /// Format a `Set-Cookie` value.
    pub fn build(&self, name: &str, value: &str, max_age: u64, http_only: bool) -> String {
        let http_only = if http_only { "; HttpOnly" } else { "" };
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}{}; SameSite=Lax; Path=/; Max-Age={}{}",
            name, value, http_only, max_age, secure
        )
    }

    /// Format a `Set-Cookie` value that expires the cookie immediately.
    pub fn clear(&self, name: &str) -> String {
        let http_only = name != CSRF_COOKIE_NAME;
        self.build(name, "", 0, http_only)
    }
}

/// Accumulates `Set-Cookie` headers for a single response.
#[derive(Debug, Default)]
pub struct CookieJar {
    set_cookies: Vec<String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_access(&mut self, settings: &CookieSettings, token: &str, max_age: u64) {
        self.set_cookies
            .push(settings.build(ACCESS_COOKIE_NAME, token, max_age, true));
    }

    pub fn set_refresh(&mut self, settings: &CookieSettings, token: &str, max_age: u64) {
        self.set_cookies
            .push(settings.build(REFRESH_COOKIE_NAME, token, max_age, true));
    }

    pub fn set_csrf(&mut self, settings: &CookieSettings, token: &str, max_age: u64) {
        self.set_cookies
            .push(settings.build(CSRF_COOKIE_NAME, token, max_age, false));
    }

    pub fn set_actor(&mut self, settings: &CookieSettings, actor_id: &str) {
        self.set_cookies
            .push(settings.build(ACTOR_COOKIE_NAME, actor_id, ACTOR_MAX_AGE, true));
    }

    /// Expire every session cookie.
    pub fn clear_all(&mut self, settings: &CookieSettings) {
        self.set_cookies
            .extend(ALL_AUTH_COOKIES.iter().map(|name| settings.clear(name)));
    }

    /// Append the accumulated cookies to a response's headers.
    pub fn apply(self, headers: &mut HeaderMap) {
        for cookie in self.set_cookies {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => tracing::warn!("Dropping cookie with invalid characters"),
            }
        }
    }
}
