//! CLI argument parsing, validation, and startup helpers.

use std::net::IpAddr;
use std::time::Duration;

use crate::ServerConfig;
use crate::auth::AuthMode;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Header a trusted reverse proxy uses to carry the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// `X-Forwarded-For`; the rightmost entry, appended by the trusted proxy
    XForwardedFor,
    /// `X-Real-IP`
    XRealIp,
    /// `CF-Connecting-IP`
    CfConnectingIp,
}

impl ClientIpHeader {
    pub fn header_name(self) -> &'static str {
        match self {
            Self::XForwardedFor => "x-forwarded-for",
            Self::XRealIp => "x-real-ip",
            Self::CfConnectingIp => "cf-connecting-ip",
        }
    }

    /// Parse the client address out of the header value.
    pub fn extract(self, value: &str) -> Option<IpAddr> {
        let candidate = match self {
            Self::XForwardedFor => value.rsplit(',').map(str::trim).find(|s| !s.is_empty())?,
            Self::XRealIp | Self::CfConnectingIp => value.trim(),
        };
        candidate.parse().ok()
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "newsroom-proxy",
    about = "API proxy and session relay for the newsroom front end"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Backend API base URL (e.g., "http://backend:8080/api")
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Path to file containing the internal proxy key. Prefer the PROXY_KEY env var instead
    #[arg(long)]
    pub proxy_key_file: Option<String>,

    /// Refuse to forward requests when no proxy key is configured
    #[arg(long, env = "REQUIRE_PROXY_KEY")]
    pub require_proxy_key: bool,

    /// Production mode: mark cookies Secure
    #[arg(long, env = "PRODUCTION")]
    pub production: bool,

    /// Cookie scheme that identifies a signed-in browser
    #[arg(long, env = "AUTH_MODE", default_value = "dual")]
    pub auth_mode: AuthMode,

    /// Reject mutating requests whose CSRF header does not match the CSRF cookie
    #[arg(long, env = "ENFORCE_CSRF")]
    pub enforce_csrf: bool,

    /// Maximum request body size forwarded to the backend, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = crate::DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Upstream request timeout in seconds (unset means no timeout)
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS")]
    pub upstream_timeout_secs: Option<u64>,

    /// Header set by a trusted reverse proxy carrying the client IP.
    /// Unset means the socket address is used and forwarding headers are ignored
    #[arg(long, env = "CLIENT_IP_HEADER")]
    pub client_ip_header: Option<ClientIpHeader>,

    /// Log output format
    #[arg(short, long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format. `RUST_LOG` overrides the default `info` level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load the proxy key from environment variable or file.
/// Returns `Ok(None)` when neither source is configured.
///
/// Must run before any other thread is spawned, since it mutates the
/// process environment.
pub fn load_proxy_key(proxy_key_file: Option<&str>) -> std::io::Result<Option<String>> {
    let key = if let Ok(key) = std::env::var("PROXY_KEY") {
        // Clear the environment variable to prevent leaking
        // SAFETY: called from `main` before the tokio runtime is built, so no
        // other thread exists that could read the environment concurrently.
        unsafe { std::env::remove_var("PROXY_KEY") };
        key
    } else if let Some(path) = proxy_key_file {
        std::fs::read_to_string(path)?
    } else {
        return Ok(None);
    };

    let key = key.trim();
    Ok((!key.is_empty()).then(|| key.to_string()))
}

/// Parse and validate the backend URL.
/// Returns None and logs an error if validation fails.
pub fn validate_backend_url(backend_url: &str) -> Option<Url> {
    let url = match Url::parse(backend_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %backend_url, error = %e, "Invalid backend URL");
            return None;
        }
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        error!(url = %backend_url, "Backend URL must use http or https");
        return None;
    }

    if url.cannot_be_a_base() || url.host_str().is_none() {
        error!(url = %backend_url, "Backend URL must include a host");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, backend_url: Option<Url>, proxy_key: Option<String>) -> ServerConfig {
    if backend_url.is_none() {
        warn!("No backend URL configured, proxied routes will answer 500");
    }
    if proxy_key.is_none() {
        if args.require_proxy_key {
            warn!("Proxy key is required but not configured, proxied routes will answer 500");
        } else {
            warn!("No proxy key configured, upstream calls carry no proxy key header");
        }
    }

    ServerConfig {
        backend_url,
        proxy_key,
        require_proxy_key: args.require_proxy_key,
        secure_cookies: args.production,
        auth_mode: args.auth_mode,
        enforce_csrf: args.enforce_csrf,
        max_body_bytes: args.max_body_bytes,
        upstream_timeout: args.upstream_timeout_secs.map(Duration::from_secs),
        client_ip_header: args.client_ip_header,
    }
}
