//! Route protection for the admin page area.
//!
//! Runs as middleware in front of page handlers, so direct URL entry and
//! reloads are gated the same way as in-app navigation.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::credentials::SessionCredentials;
use super::errors::LoginRedirect;
use super::types::AuthMode;

/// Login page path. Always reachable.
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";

/// Whether `path` lies inside the admin page area.
fn is_admin_path(path: &str) -> bool {
    path == "/admin" || path.starts_with("/admin/")
}

fn is_login_path(path: &str) -> bool {
    path == ADMIN_LOGIN_PATH || path == "/admin/login/"
}

/// Decide whether a navigation to `path` may proceed with the given cookies.
pub fn admin_access_allowed(path: &str, credentials: &SessionCredentials, mode: AuthMode) -> bool {
    if !is_admin_path(path) || is_login_path(path) {
        return true;
    }
    credentials.is_authenticated(mode)
}

/// Middleware redirecting unauthenticated admin navigation to the login page.
pub async fn admin_gate(State(mode): State<AuthMode>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let credentials = SessionCredentials::from_headers(request.headers());

    if admin_access_allowed(path, &credentials, mode) {
        return next.run(request).await;
    }

    tracing::debug!(path = %path, "Redirecting unauthenticated admin navigation");
    LoginRedirect {
        login_path: ADMIN_LOGIN_PATH,
    }
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_in() -> SessionCredentials {
        SessionCredentials {
            actor_id: Some("1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_login_always_allowed() {
        let anon = SessionCredentials::default();
        assert!(admin_access_allowed("/admin/login", &anon, AuthMode::Dual));
        assert!(admin_access_allowed("/admin/login/", &anon, AuthMode::Dual));
        assert!(admin_access_allowed("/admin/login", &signed_in(), AuthMode::Dual));
    }

    #[test]
    fn test_admin_requires_session() {
        let anon = SessionCredentials::default();
        assert!(!admin_access_allowed("/admin", &anon, AuthMode::Dual));
        assert!(!admin_access_allowed("/admin/dashboard", &anon, AuthMode::Dual));
        assert!(!admin_access_allowed("/admin/login-help", &anon, AuthMode::Dual));
        assert!(admin_access_allowed("/admin/dashboard", &signed_in(), AuthMode::Dual));
    }

    #[test]
    fn test_non_admin_paths_pass() {
        let anon = SessionCredentials::default();
        assert!(admin_access_allowed("/", &anon, AuthMode::Actor));
        assert!(admin_access_allowed("/administrator", &anon, AuthMode::Actor));
        assert!(admin_access_allowed("/gallery", &anon, AuthMode::Actor));
    }

    #[test]
    fn test_mode_decides_recognised_cookie() {
        let tokens_only = SessionCredentials {
            access_token: Some("a".into()),
            ..Default::default()
        };
        assert!(!admin_access_allowed("/admin/posts", &tokens_only, AuthMode::Actor));
        assert!(admin_access_allowed("/admin/posts", &tokens_only, AuthMode::Token));
    }
}
