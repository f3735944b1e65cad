mod admin;
mod auth;
mod error;
pub mod gateway;
mod public;

use axum::{
    Json, Router,
    extract::Request,
    handler::Handler,
    response::Response,
    routing::{MethodRouter, get},
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::auth::{AuthMode, CookieSettings};
use crate::rate_limit::RateLimitConfig;
use gateway::{Upstream, UpstreamPath};

pub use error::{ApiError, ResultExt};

/// State shared by every proxy route.
#[derive(Clone)]
pub struct ProxyState {
    pub upstream: Arc<Upstream>,
    pub cookies: CookieSettings,
    pub auth_mode: AuthMode,
}

/// Create the API router.
pub fn create_api_router(state: ProxyState, rate_limit: RateLimitConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(rate_limit))
        .nest("/admin", admin::router())
        .nest("/public", public::router())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Route GET (and HEAD), POST, PUT, PATCH and DELETE to one forwarding handler.
fn forwarded<H, T>(handler: H) -> MethodRouter<ProxyState>
where
    H: Handler<T, ProxyState>,
    T: 'static,
{
    get(handler.clone())
        .post(handler.clone())
        .put(handler.clone())
        .patch(handler.clone())
        .delete(handler)
}

/// Forward the remainder of the (prefix-stripped) request path under `base`.
async fn forward_tail(
    state: &ProxyState,
    request: Request,
    base: &'static str,
) -> Result<Response, ApiError> {
    let path = UpstreamPath::new(base).tail(request.uri().path())?;
    state.upstream.forward(request, path).await
}
