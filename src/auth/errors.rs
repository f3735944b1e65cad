//! Authentication error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

use super::cookie::{CookieJar, CookieSettings};

/// 401 that also expires every session cookie, so a half-valid session
/// cannot linger in the browser.
#[derive(Debug)]
pub struct AuthError {
    pub message: &'static str,
    pub cookies: CookieSettings,
}

impl AuthError {
    pub fn new(message: &'static str, cookies: CookieSettings) -> Self {
        Self { message, cookies }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response();

        let mut jar = CookieJar::new();
        jar.clear_all(&self.cookies);
        jar.apply(response.headers_mut());

        response
    }
}

/// Page authentication error - redirects to the login page without touching cookies.
#[derive(Debug)]
pub struct LoginRedirect {
    pub login_path: &'static str,
}

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        Redirect::temporary(self.login_path).into_response()
    }
}
