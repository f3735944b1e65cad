//! Session types shared by the auth endpoints and the gateway.

use serde::{Deserialize, Deserializer};

use super::cookie::{DEFAULT_ACCESS_MAX_AGE, DEFAULT_REFRESH_MAX_AGE};

/// Which cookie scheme marks a browser as signed in.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// Only the actor id cookie.
    Actor,
    /// Only the access/refresh token pair.
    Token,
    /// Both schemes are written at login and either one is accepted.
    #[default]
    Dual,
}

impl AuthMode {
    pub fn uses_actor(self) -> bool {
        matches!(self, Self::Actor | Self::Dual)
    }

    pub fn uses_tokens(self) -> bool {
        matches!(self, Self::Token | Self::Dual)
    }
}

/// Token payload as returned by the backend on login and refresh.
/// Every field is optional here; [`SessionPayload::into_credentials`] decides validity.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub access_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub access_token_expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub refresh_token_expires_in: Option<u64>,
    pub user: Option<serde_json::Value>,
}

/// Accept a lifetime as an integer, a float or a numeric string. Anything
/// else (negative, non-finite, garbage) reads as absent so the default applies.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let seconds = match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().and_then(whole_seconds)),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_seconds))
        }
        _ => None,
    };
    Ok(seconds)
}

fn whole_seconds(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f <= u64::MAX as f64).then(|| f.round() as u64)
}

/// A validated access/refresh pair with resolved lifetimes.
#[derive(Debug, Clone)]
pub struct SessionCredentialPair {
    pub access_token: String,
    pub access_max_age: u64,
    pub refresh_token: String,
    pub refresh_max_age: u64,
    pub user: serde_json::Value,
}

impl SessionPayload {
    /// Require `accessToken`, `refreshToken` and `user`. Missing lifetimes fall
    /// back to the defaults.
    pub fn into_credentials(self) -> Option<SessionCredentialPair> {
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        let refresh_token = self.refresh_token.filter(|t| !t.is_empty())?;
        let user = self.user.filter(|u| !u.is_null())?;

        Some(SessionCredentialPair {
            access_token,
            access_max_age: self
                .access_token_expires_in
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_ACCESS_MAX_AGE),
            refresh_token,
            refresh_max_age: self
                .refresh_token_expires_in
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_REFRESH_MAX_AGE),
            user,
        })
    }
}

/// Pull a user id out of a login response.
///
/// Accepts `{"user": {"id": ..}}` or a top-level `{"id": ..}`, with the id as
/// a string or an integer.
pub fn extract_user_id(body: &serde_json::Value) -> Option<String> {
    let id = body
        .get("user")
        .and_then(|user| user.get("id"))
        .or_else(|| body.get("id"))?;

    match id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
