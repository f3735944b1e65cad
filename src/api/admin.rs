//! Admin console routes, forwarded to the backend's `/admin` tree.
//!
//! Posts, media, categories, front-page curation and listings all pass
//! through unchanged; the backend owns their shape.

use axum::{
    Router,
    extract::{Request, State},
    response::Response,
};

use super::{ApiError, ProxyState, forward_tail, forwarded};

pub fn router() -> Router<ProxyState> {
    Router::new().route("/{*path}", forwarded(any_admin))
}

async fn any_admin(State(state): State<ProxyState>, request: Request) -> Result<Response, ApiError> {
    forward_tail(&state, request, "/admin").await
}
