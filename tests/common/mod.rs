#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    response::{IntoResponse, Response},
};
use newsroom_proxy::{ServerConfig, create_app};
use tokio::net::TcpListener;
use url::Url;

pub const TEST_PROXY_KEY: &str = "test-proxy-key";

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    /// Path and query, exactly as received
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("Recorded body is not JSON")
    }
}

type Responder = Arc<dyn Fn(&Recorded) -> Response + Send + Sync>;

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<Recorded>>>,
    responder: Responder,
}

/// In-process backend on a random port that records every request.
pub struct MockBackend {
    pub url: Url,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    /// Start a backend whose base URL has an `/api` prefix, answering with `responder`.
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Recorded) -> Response + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            requests: requests.clone(),
            responder: Arc::new(responder),
        };
        let app = Router::new().fallback(record).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: Url::parse(&format!("http://{}/api", addr)).expect("Invalid URL"),
            requests,
            handle,
        }
    }

    /// A backend that answers every request with `200 {"ok":true}`.
    pub async fn ok() -> Self {
        Self::start(|_| json_response(200, serde_json::json!({ "ok": true }))).await
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> Recorded {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("Backend received no requests")
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record(State(state): State<MockState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let recorded = Recorded {
        method: parts.method,
        uri,
        headers: parts.headers,
        body,
    };
    let response = (state.responder)(&recorded);
    state.requests.lock().unwrap().push(recorded);
    response
}

pub fn json_response(status: u16, value: serde_json::Value) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
        .into_response()
}

/// A URL nothing listens on, for transport failure tests.
pub async fn unreachable_backend() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local address");
    drop(listener);
    Url::parse(&format!("http://{}/api", addr)).expect("Invalid URL")
}

pub fn test_config(backend: Option<&Url>) -> ServerConfig {
    ServerConfig {
        backend_url: backend.cloned(),
        proxy_key: Some(TEST_PROXY_KEY.to_string()),
        ..Default::default()
    }
}

pub fn test_app(backend: Option<&Url>) -> Router {
    create_app(&test_config(backend)).expect("Failed to create app")
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = body_bytes(response).await;
    serde_json::from_slice(&body).expect("Response body is not JSON")
}

/// All `Set-Cookie` values on a response.
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The `Set-Cookie` value for `name`, if any.
pub fn set_cookie(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with(&prefix))
}

/// The value part of a `Set-Cookie` string.
pub fn cookie_value(set_cookie: &str) -> &str {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value)
        .unwrap_or("")
}

/// Assert that every session cookie is expired on `response`.
pub fn assert_all_cookies_cleared(response: &Response) {
    for name in newsroom_proxy::auth::ALL_AUTH_COOKIES {
        let cookie = set_cookie(response, name)
            .unwrap_or_else(|| panic!("{} should be cleared", name));
        assert!(
            cookie.contains("Max-Age=0"),
            "{} should expire immediately: {}",
            name,
            cookie
        );
    }
}
