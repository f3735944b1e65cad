//! Resolution of backend-relative media and content URLs.

/// Where a URL is going to be dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Server-side code talking to the backend directly.
    Server,
    /// A browser that reaches the backend through this proxy.
    Browser,
}

/// Rewrites backend-emitted URLs for the current execution context.
#[derive(Debug, Clone)]
pub struct ResourceUrlResolver {
    backend_base: Option<String>,
}

impl ResourceUrlResolver {
    pub fn new(backend_base: Option<&str>) -> Self {
        Self {
            backend_base: backend_base.map(|base| base.trim_end_matches('/').to_string()),
        }
    }

    /// Resolve `url` for `context`.
    ///
    /// Absolute URLs are returned unchanged. Relative URLs get the backend base
    /// in a server context and stay relative (routed through the proxy) in a
    /// browser context. Resolving a resolved URL is a no-op.
    pub fn resolve(&self, url: &str, context: ExecutionContext) -> String {
        if url.is_empty() || is_absolute(url) {
            return url.to_string();
        }
        match (context, &self.backend_base) {
            (ExecutionContext::Server, Some(base)) => {
                if url.starts_with('/') {
                    format!("{}{}", base, url)
                } else {
                    format!("{}/{}", base, url)
                }
            }
            _ => url.to_string(),
        }
    }
}

/// `scheme:...` or protocol-relative `//host/...`.
fn is_absolute(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = url.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
