pub mod api;
pub mod auth;
pub mod cli;
pub mod csrf;
pub mod rate_limit;
pub mod resource_url;

use api::gateway::{Upstream, UpstreamOptions};
use api::{ProxyState, create_api_router};
use auth::{AuthMode, CookieSettings, admin_gate};
use cli::ClientIpHeader;
use axum::{Json, Router, http::StatusCode, middleware, response::IntoResponse};
use rate_limit::RateLimitConfig;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

/// Default cap on buffered request bodies (uploads included).
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub struct ServerConfig {
    /// Backend base URL. Without it every proxied route answers 500.
    pub backend_url: Option<Url>,
    /// Shared secret sent to the backend in `x-internal-proxy-key`
    pub proxy_key: Option<String>,
    /// Refuse to forward when no proxy key is configured
    pub require_proxy_key: bool,
    /// Whether to set Secure flag on cookies (production behind HTTPS)
    pub secure_cookies: bool,
    /// Which cookie scheme marks a signed-in browser
    pub auth_mode: AuthMode,
    /// Reject mutating requests whose CSRF header does not match the cookie
    pub enforce_csrf: bool,
    /// Maximum request body size read by the gateway
    pub max_body_bytes: usize,
    /// Upstream request timeout. None means no timeout.
    pub upstream_timeout: Option<Duration>,
    /// Trusted proxy header carrying the client IP, for login rate limiting
    pub client_ip_header: Option<ClientIpHeader>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            proxy_key: None,
            require_proxy_key: false,
            secure_cookies: false,
            auth_mode: AuthMode::default(),
            enforce_csrf: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            upstream_timeout: None,
            client_ip_header: None,
        }
    }
}

/// Create the application router with the given configuration.
///
/// Page rendering is not part of this service; non-API paths answer 404
/// after passing the admin gate. Use [`create_app_with_pages`] to mount a
/// page router behind the gate.
pub fn create_app(config: &ServerConfig) -> Result<Router, std::io::Error> {
    let pages = Router::new().fallback(page_not_found);
    create_app_with_pages(config, pages)
}

/// Create the application router with `pages` mounted behind the admin gate.
pub fn create_app_with_pages(
    config: &ServerConfig,
    pages: Router,
) -> Result<Router, std::io::Error> {
    let upstream = Upstream::new(UpstreamOptions {
        backend: config.backend_url.clone(),
        proxy_key: config.proxy_key.clone(),
        require_proxy_key: config.require_proxy_key,
        enforce_csrf: config.enforce_csrf,
        max_body_bytes: config.max_body_bytes,
        timeout: config.upstream_timeout,
    })?;

    let state = ProxyState {
        upstream: Arc::new(upstream),
        cookies: CookieSettings {
            secure: config.secure_cookies,
        },
        auth_mode: config.auth_mode,
    };

    let rate_limit = RateLimitConfig::new().with_client_ip_header(config.client_ip_header);
    let api_router = create_api_router(state, rate_limit);

    // The gate wraps everything, fallback included, and only acts on /admin paths.
    Ok(Router::new()
        .nest("/api", api_router)
        .merge(pages)
        .layer(middleware::from_fn_with_state(config.auth_mode, admin_gate)))
}

async fn page_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
