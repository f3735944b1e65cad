//! Public reader routes, forwarded to the backend's `/public` tree.
//!
//! Media requests keep their Range and conditional headers, so partial
//! content and 304s come straight from the backend.

use axum::{
    Router,
    extract::{Request, State},
    response::Response,
};

use super::{ApiError, ProxyState, forward_tail, forwarded};

pub fn router() -> Router<ProxyState> {
    Router::new().route("/{*path}", forwarded(any_public))
}

async fn any_public(State(state): State<ProxyState>, request: Request) -> Result<Response, ApiError> {
    forward_tail(&state, request, "/public").await
}
