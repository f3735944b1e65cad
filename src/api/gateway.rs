//! Forwarding gateway: rebuilds an inbound request against the backend and
//! relays the answer.
//!
//! Headers are allow-listed in both directions. GET/HEAD carry no body; other
//! methods have their body read once and sent byte-for-byte. Response bodies
//! are streamed back without buffering, and upstream redirects are relayed as
//! is rather than followed.

use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, header},
    response::Response,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};
use url::Url;

use super::error::{ApiError, ResultExt};
use crate::auth::SessionCredentials;
use crate::csrf::{self, CSRF_HEADER, SESSION_CSRF_HEADER};

/// Shared-secret header proving a call came through this proxy.
pub const PROXY_KEY_HEADER: HeaderName = HeaderName::from_static("x-internal-proxy-key");

/// Actor tag attached to every proxied call.
pub const ACTOR_HEADER: HeaderName = HeaderName::from_static("x-actor-userid");

/// Freshness-version header used by the backend for cache busting.
pub const CONTENT_VERSION_HEADER: HeaderName = HeaderName::from_static("x-content-version");

const USER_AGENT: &str = concat!("newsroom-proxy/", env!("CARGO_PKG_VERSION"));

/// Request headers copied from the browser to the backend.
static REQUEST_HEADER_ALLOWLIST: [HeaderName; 7] = [
    header::CONTENT_TYPE,
    header::ACCEPT,
    header::RANGE,
    header::IF_NONE_MATCH,
    header::IF_MATCH,
    header::IF_MODIFIED_SINCE,
    CONTENT_VERSION_HEADER,
];

/// Response headers copied from the backend to the browser.
static RESPONSE_HEADER_ALLOWLIST: [HeaderName; 9] = [
    header::CONTENT_TYPE,
    header::CONTENT_DISPOSITION,
    header::CONTENT_LENGTH,
    header::ETAG,
    header::CACHE_CONTROL,
    header::ACCEPT_RANGES,
    header::CONTENT_RANGE,
    header::LOCATION,
    header::X_CONTENT_TYPE_OPTIONS,
];

type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// A backend answer with its body still unread.
pub type UpstreamResponse = axum::http::Response<Incoming>;

/// A backend-relative path, already percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamPath(String);

impl UpstreamPath {
    /// A fixed path declared by a route handler, e.g. `/auth/login`.
    pub fn new(fixed: &'static str) -> Self {
        Self(format!("/{}", fixed.trim_matches('/')))
    }

    /// Append a raw (still encoded) multi-segment tail taken from the request URI.
    ///
    /// Segments are kept byte-for-byte. Empty, `.` and `..` segments are
    /// rejected, as are segments that decode to something containing a path
    /// separator.
    pub fn tail(mut self, raw: &str) -> Result<Self, ApiError> {
        let raw = raw.trim_start_matches('/');
        if raw.is_empty() {
            return Err(ApiError::bad_request("Path cannot be empty"));
        }
        for segment in raw.split('/') {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            if decoded.is_empty()
                || decoded == "."
                || decoded == ".."
                || decoded.contains('/')
                || decoded.contains('\\')
            {
                return Err(ApiError::bad_request("Invalid path segment"));
            }
            self.0.push('/');
            self.0.push_str(segment);
        }
        Ok(self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Upstream connection settings plus the pooled HTTP client.
pub struct Upstream {
    client: HttpClient,
    /// Backend base URL without query, fragment or trailing slash.
    base: Option<String>,
    proxy_key: Option<HeaderValue>,
    require_proxy_key: bool,
    enforce_csrf: bool,
    max_body_bytes: usize,
    timeout: Option<Duration>,
}

/// Options used to build an [`Upstream`].
#[derive(Debug, Clone, Default)]
pub struct UpstreamOptions {
    pub backend: Option<Url>,
    pub proxy_key: Option<String>,
    pub require_proxy_key: bool,
    pub enforce_csrf: bool,
    pub max_body_bytes: usize,
    pub timeout: Option<Duration>,
}

impl Upstream {
    /// Build the client. Fails on a proxy key that cannot be sent as a header.
    pub fn new(options: UpstreamOptions) -> Result<Self, std::io::Error> {
        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(std::io::Error::other)?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        // The legacy client never follows redirects.
        let client = Client::builder(TokioExecutor::new()).build(https);

        let proxy_key = options
            .proxy_key
            .filter(|key| !key.is_empty())
            .map(|key| HeaderValue::from_str(&key))
            .transpose()
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "proxy key is not a valid header value",
                )
            })?;

        let base = options.backend.map(|mut url| {
            url.set_query(None);
            url.set_fragment(None);
            url.as_str().trim_end_matches('/').to_string()
        });

        Ok(Self {
            client,
            base,
            proxy_key,
            require_proxy_key: options.require_proxy_key,
            enforce_csrf: options.enforce_csrf,
            max_body_bytes: options.max_body_bytes,
            timeout: options.timeout,
        })
    }

    /// Resolve `path` against the backend base URL.
    ///
    /// The query is appended exactly as received; `Url` would re-encode it.
    pub fn uri_for(&self, path: &UpstreamPath, query: Option<&str>) -> Result<Uri, ApiError> {
        let base = self
            .base
            .as_deref()
            .ok_or_else(|| ApiError::config("Backend URL is not configured"))?;

        let mut target = format!("{}{}", base, path.as_str());
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        target
            .parse::<Uri>()
            .map_err(|_| ApiError::bad_request("Invalid upstream path"))
    }

    /// The shared-secret header. Absent unless configured; an error if required.
    fn proxy_key_header(&self) -> Result<Option<HeaderValue>, ApiError> {
        match &self.proxy_key {
            Some(key) => Ok(Some(key.clone())),
            None if self.require_proxy_key => Err(ApiError::config("Missing proxy key")),
            None => Ok(None),
        }
    }

    /// Trust headers only, for the auth handshake calls.
    pub fn base_headers(&self, content_type: Option<&HeaderValue>) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(content_type) = content_type {
            headers.insert(header::CONTENT_TYPE, content_type.clone());
        }
        if let Some(key) = self.proxy_key_header()? {
            headers.insert(PROXY_KEY_HEADER, key);
        }
        Ok(headers)
    }

    /// Like [`Upstream::base_headers`] but the shared secret is mandatory.
    pub fn mandatory_proxy_key(&self) -> Result<HeaderValue, ApiError> {
        self.proxy_key
            .clone()
            .ok_or_else(|| ApiError::config("Missing proxy key"))
    }

    /// Build the outbound header set for a gateway forward.
    pub fn forward_headers(
        &self,
        inbound: &HeaderMap,
        credentials: &SessionCredentials,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();

        for name in REQUEST_HEADER_ALLOWLIST.iter() {
            for value in inbound.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        if let Some(value) = inbound.get(CSRF_HEADER) {
            headers.insert(CSRF_HEADER, value.clone());
        }
        if let Some(csrf) = credentials.csrf_token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(csrf) {
                headers.insert(SESSION_CSRF_HEADER, value);
            }
        }

        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        if let Some(key) = self.proxy_key_header()? {
            headers.insert(PROXY_KEY_HEADER, key);
        }

        // The cookie is authoritative; a client-supplied header only counts
        // when no actor cookie exists.
        let actor = match credentials.actor_id.as_deref() {
            Some(actor) => HeaderValue::from_str(actor).ok(),
            None => inbound.get(ACTOR_HEADER).cloned(),
        };
        if let Some(actor) = actor {
            headers.insert(ACTOR_HEADER, actor);
        }

        if let Some(token) = credentials.access_token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(header::AUTHORIZATION, value);
            }
        }

        Ok(headers)
    }

    /// Execute a single upstream call. Never retried.
    pub async fn send(
        &self,
        method: Method,
        uri: Uri,
        mut headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<UpstreamResponse, ApiError> {
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        let mut request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(body.unwrap_or_default()))
            .internal_err("Failed to build upstream request")?;
        *request.headers_mut() = headers;

        let call = self.client.request(request);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|e| ApiError::upstream("Upstream request failed", &e))?,
            None => call.await,
        };
        result.map_err(|e| ApiError::upstream("Upstream request failed", &e))
    }

    /// Forward `request` to `path` and relay the response.
    pub async fn forward(&self, request: Request, path: UpstreamPath) -> Result<Response, ApiError> {
        let (parts, body) = request.into_parts();

        // Fail fast on configuration before touching the network.
        let uri = self.uri_for(&path, parts.uri.query())?;
        let credentials = SessionCredentials::from_headers(&parts.headers);

        if self.enforce_csrf && csrf::is_mutating(&parts.method) {
            let submitted = parts.headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
            if !csrf::tokens_match(submitted, credentials.csrf_token.as_deref()) {
                return Err(ApiError::forbidden("Invalid CSRF token"));
            }
        }

        let headers = self.forward_headers(&parts.headers, &credentials)?;

        let body = if matches!(parts.method, Method::GET | Method::HEAD) {
            None
        } else {
            let bytes = axum::body::to_bytes(body, self.max_body_bytes)
                .await
                .map_err(|e| {
                    debug!(error = %e, "Failed to read request body");
                    ApiError::PayloadTooLarge("Request body is too large or unreadable".into())
                })?;
            Some(bytes)
        };

        debug!(method = %parts.method, path = %path.as_str(), "Forwarding request");
        let response = self.send(parts.method, uri, headers, body).await?;
        debug!(status = %response.status(), path = %path.as_str(), "Upstream responded");

        relay_response(response)
    }
}

/// Relay an upstream response: status verbatim, allow-listed headers, streamed body.
pub fn relay_response(upstream: UpstreamResponse) -> Result<Response, ApiError> {
    let (parts, body) = upstream.into_parts();
    let mut builder = Response::builder().status(parts.status);
    if let Some(headers) = builder.headers_mut() {
        for name in RESPONSE_HEADER_ALLOWLIST.iter() {
            for value in parts.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }
    // A failure mid-body can only abort the stream; the status is already sent.
    let body = body.map_err(|e| {
        warn!(error = %e, "Upstream body stream failed");
        e
    });
    builder
        .body(Body::new(body))
        .internal_err("Failed to build response")
}
