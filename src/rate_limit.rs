//! Rate limiting for the login endpoint.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password guessing.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};

use crate::api::ApiError;
use crate::cli::ClientIpHeader;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Requests per second allowed per IP on the login endpoint.
const LOGIN_PER_SEC: u32 = 1;

/// Burst allowance per IP on the login endpoint.
const LOGIN_BURST: u32 = 5;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login attempts (1 per second, burst of 5)
    pub login: Arc<IpLimiter>,
    /// Trusted proxy header naming the client. `None` keys on the socket address.
    pub client_ip_header: Option<ClientIpHeader>,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::with_quota(LOGIN_PER_SEC, LOGIN_BURST)
    }

    /// Build a limiter with a custom quota. Zero values are raised to one.
    pub fn with_quota(per_second: u32, burst: u32) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(per_second).allow_burst(burst),
            )),
            client_ip_header: None,
        }
    }

    pub fn with_client_ip_header(mut self, header: Option<ClientIpHeader>) -> Self {
        self.client_ip_header = header;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate-limit key for a request.
///
/// With a trusted header configured, the address comes from that header only
/// and a missing or malformed value is an error (no fallback to the socket).
/// Without one, forwarding headers are ignored: the socket address is used,
/// and requests without connection info share one bucket.
pub fn client_key(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    ip_header: Option<ClientIpHeader>,
) -> Result<String, &'static str> {
    match ip_header {
        Some(ip_header) => headers
            .get(ip_header.header_name())
            .ok_or("IP header not present")?
            .to_str()
            .ok()
            .and_then(|value| ip_header.extract(value))
            .map(|ip| ip.to_string())
            .ok_or("IP header is not a valid address"),
        None => Ok(connect_info
            .map(|ci| ci.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())),
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<RateLimitConfig>,
    request: Request,
    next: Next,
) -> Response {
    let key = match client_key(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        config.client_ip_header,
    ) {
        Ok(key) => key,
        Err(reason) => {
            tracing::warn!(reason, "Rejecting login without a usable client IP");
            return ApiError::forbidden("Unable to determine client IP").into_response();
        }
    };

    match config.login.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(client = %key, "Login rate limit exceeded");
            ApiError::TooManyRequests(
                "Too many login attempts. Please wait before trying again.".into(),
            )
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn addr(ip: &str) -> ConnectInfo<SocketAddr> {
        ConnectInfo(format!("{}:5000", ip).parse().unwrap())
    }

    #[test]
    fn test_forwarded_header_ignored_without_trust() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(
            client_key(&headers, Some(&addr("192.0.2.4")), None).unwrap(),
            "192.0.2.4"
        );
        assert_eq!(client_key(&headers, None, None).unwrap(), "unknown");
    }

    #[test]
    fn test_trusted_header_takes_proxy_appended_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.9.9.9, 203.0.113.9"),
        );
        let key = client_key(
            &headers,
            Some(&addr("127.0.0.1")),
            Some(ClientIpHeader::XForwardedFor),
        );
        assert_eq!(key.unwrap(), "203.0.113.9");
    }

    #[test]
    fn test_trusted_header_missing_is_error() {
        let key = client_key(
            &HeaderMap::new(),
            Some(&addr("127.0.0.1")),
            Some(ClientIpHeader::XRealIp),
        );
        assert!(key.is_err());
    }

    #[test]
    fn test_burst_then_limited() {
        let config = RateLimitConfig::with_quota(1, 2);
        assert!(config.login.check_key(&"a".to_string()).is_ok());
        assert!(config.login.check_key(&"a".to_string()).is_ok());
        assert!(config.login.check_key(&"a".to_string()).is_err());
        assert!(config.login.check_key(&"b".to_string()).is_ok());
    }
}
