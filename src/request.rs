//! Incoming HTTP request type.
//!
//! A [`Request`] is exclusively owned by the task handling it. Besides the
//! parsed method/path/headers/body it carries a typed per-request store
//! ([`http::Extensions`]) that the pipeline uses to hand the derived trace
//! context down to the application handler without re-deriving it, plus the
//! matched route template once dispatch has resolved it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method};
use opentelemetry::Context;

/// An incoming HTTP request.
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    peer: SocketAddr,
    extensions: Extensions,
    route: Option<Arc<str>>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
        peer: SocketAddr,
    ) -> Self {
        Self {
            method,
            path,
            query,
            headers,
            body,
            params: HashMap::new(),
            peer,
            extensions: Extensions::new(),
            route: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup; `None` for absent or non-UTF-8 values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Address of the connected peer.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Full request URL, reconstructed from the `host` header.
    pub fn url(&self) -> String {
        let host = self.header("host").unwrap_or("localhost");
        match &self.query {
            Some(q) => format!("http://{host}{}?{q}", self.path),
            None => format!("http://{host}{}", self.path),
        }
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// The route template this request matched (e.g. `/rest/orders/{id}`).
    /// `None` before dispatch or when no route matched.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub(crate) fn set_route(&mut self, route: Arc<str>) {
        self.route = Some(route);
    }

    /// The trace context installed by the tracer interceptor.
    ///
    /// Untraced requests (tracing disabled, ignore-listed path, or the
    /// interceptor not in the chain) get a fresh empty context, so handlers
    /// can always pass the result to the outbound client unconditionally.
    pub fn trace_context(&self) -> Context {
        self.extensions.get::<Context>().cloned().unwrap_or_default()
    }

    pub(crate) fn set_trace_context(&mut self, cx: Context) {
        // Replacing the stored value is the only supported mutation; the
        // context itself is never mutated in place.
        self.extensions.insert(cx);
    }

    #[cfg(test)]
    pub(crate) fn headers_mut_for_test(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The per-request typed store, for application use.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

#[cfg(test)]
pub(crate) fn test_request(method: Method, path: &str) -> Request {
    Request::new(
        method,
        path.to_owned(),
        None,
        HeaderMap::new(),
        Bytes::new(),
        "127.0.0.1:9999".parse().unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::TraceContextExt;

    use super::*;

    #[test]
    fn url_includes_host_and_query() {
        let mut req = test_request(Method::GET, "/orders/7");
        req.headers.insert("host", "api.example.com".parse().unwrap());
        req.query = Some("full=1".to_owned());
        assert_eq!(req.url(), "http://api.example.com/orders/7?full=1");
    }

    #[test]
    fn trace_context_defaults_to_empty() {
        let req = test_request(Method::GET, "/x");
        assert!(!req.trace_context().has_active_span());
    }
}
