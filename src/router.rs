//! Route registry and the dispatcher it compiles into.
//!
//! The registry is an explicit object handed to [`Server::serve`] — there is
//! no ambient global route table, so independent servers can coexist in one
//! process. Registration is a build-time operation: composing the pipeline
//! consumes the registry and snapshots it into per-method radix trees, which
//! makes post-start mutation unrepresentable rather than racy.
//!
//! Lookup is by exact (method, path) match through [`matchit`], one tree per
//! method. The dispatcher is also where the panic boundary sits: handlers run
//! inside the recovery guard, so the interceptors wrapping the dispatcher
//! always observe a real response — 500 included — and can finish their span
//! and record their sample even for a panicking request.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as PathTree;

use crate::handler::{BoxedHandler, Handler};
use crate::recover::Recovery;
use crate::request::Request;
use crate::response::Response;

pub(crate) const HEALTHZ: &str = "/healthz";
pub(crate) const HEALTHZ_LOG: &str = "/healthz/log";
pub(crate) const HEALTHZ_PING: &str = "/healthz/ping";
pub(crate) const INFO: &str = "/info";
pub(crate) const METRICS_URI: &str = "/metrics";
pub(crate) const PPROF_PREFIX: &str = "/debug/pprof";

/// Infrastructure paths excluded from tracing, debug logging and metrics.
/// Probes and scrapes must never pollute trace or label cardinality.
pub(crate) fn is_ignored(path: &str) -> bool {
    matches!(path, HEALTHZ | HEALTHZ_LOG | HEALTHZ_PING | INFO | METRICS_URI)
        || path.starts_with(PPROF_PREFIX)
}

struct RouteEntry {
    method: Method,
    path: String,
    handler: BoxedHandler,
}

/// The application route table. Append-only, ordered, immutable once the
/// server composes it.
///
/// ```rust
/// use girder::{Method, Registry, Request, Response};
///
/// # async fn get_order(_: Request) -> Response { Response::text("") }
/// # async fn create_order(_: Request) -> Response { Response::text("") }
/// let app = Registry::new()
///     .route(Method::GET, "/orders/{id}", get_order)
///     .route(Method::POST, "/orders", create_order);
/// ```
pub struct Registry {
    routes: Vec<RouteEntry>,
    not_found: BoxedHandler,
    method_not_allowed: BoxedHandler,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            not_found: json_not_found.into_boxed_handler(),
            method_not_allowed: json_method_not_allowed.into_boxed_handler(),
        }
    }

    /// Appends a route. Path parameters use `{name}` syntax. Returns `self`
    /// so registrations chain.
    pub fn route(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes.push(RouteEntry {
            method,
            path: path.to_owned(),
            handler: handler.into_boxed_handler(),
        });
        self
    }

    /// Replaces the handler invoked when no route matches the path.
    /// The default produces a 404 JSON `{"msg": …}` body.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = handler.into_boxed_handler();
        self
    }

    /// Replaces the handler invoked when the path matches under a different
    /// method. The default produces a 405 JSON `{"msg": …}` body.
    pub fn method_not_allowed(mut self, handler: impl Handler) -> Self {
        self.method_not_allowed = handler.into_boxed_handler();
        self
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

async fn json_not_found(_req: Request) -> Response {
    Response::failed(StatusCode::NOT_FOUND, "no such route")
}

async fn json_method_not_allowed(_req: Request) -> Response {
    Response::failed(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

struct Route {
    handler: BoxedHandler,
    template: Arc<str>,
}

/// The compiled, read-only dispatch table plus the recovery boundary.
pub(crate) struct Dispatcher {
    trees: HashMap<Method, PathTree<Route>>,
    not_found: BoxedHandler,
    method_not_allowed: BoxedHandler,
    recovery: Recovery,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Compiles a registry into radix trees, prefixing application routes
    /// with `prefix` and merging in the server's built-in routes (health,
    /// info, metrics, profiling — registered unprefixed).
    pub(crate) fn build(
        registry: Registry,
        prefix: &str,
        builtins: Vec<(Method, String, BoxedHandler)>,
        recovery: Recovery,
    ) -> Result<Self, crate::Error> {
        let mut trees: HashMap<Method, PathTree<Route>> = HashMap::new();

        let mut insert = |method: Method, path: String, handler: BoxedHandler| {
            let template: Arc<str> = path.as_str().into();
            trees
                .entry(method)
                .or_default()
                .insert(path.clone(), Route { handler, template })
                .map_err(|e| crate::Error::Route { path, reason: e.to_string() })
        };

        for (method, path, handler) in builtins {
            insert(method, path, handler)?;
        }
        for entry in registry.routes {
            insert(entry.method, format!("{prefix}{}", entry.path), entry.handler)?;
        }

        Ok(Self {
            trees,
            not_found: registry.not_found,
            method_not_allowed: registry.method_not_allowed,
            recovery,
        })
    }

    /// Resolves and runs the handler for one request, inside the panic guard.
    pub(crate) async fn dispatch(&self, mut req: Request) -> Response {
        let method = req.method().clone();
        let path = req.path().to_owned();

        let mut template = None;
        let handler = match self.trees.get(&method).map(|tree| tree.at(&path)) {
            Some(Ok(matched)) => {
                let params = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                req.set_params(params);
                let route = &*matched.value;
                req.set_route(Arc::clone(&route.template));
                template = Some(Arc::clone(&route.template));
                Arc::clone(&route.handler)
            }
            _ if self.allowed_elsewhere(&method, &path) => Arc::clone(&self.method_not_allowed),
            _ => Arc::clone(&self.not_found),
        };

        let mut resp = self.recovery.guard(method, path, handler.call(req)).await;
        resp.route = template;
        resp
    }

    fn allowed_elsewhere(&self, method: &Method, path: &str) -> bool {
        self.trees
            .iter()
            .any(|(m, tree)| m != method && tree.at(path).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_request;

    fn dispatcher(registry: Registry) -> Dispatcher {
        Dispatcher::build(registry, "/rest", Vec::new(), Recovery::new(Vec::new())).unwrap()
    }

    async fn echo_id(req: Request) -> Response {
        Response::text(req.param("id").unwrap_or("missing").to_owned())
    }

    #[tokio::test]
    async fn routes_are_prefixed_and_params_resolve() {
        let d = dispatcher(Registry::new().route(Method::GET, "/orders/{id}", echo_id));
        let resp = d.dispatch(test_request(Method::GET, "/rest/orders/42")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"42");
        assert_eq!(resp.route.as_deref(), Some("/rest/orders/{id}"));

        // The unprefixed path no longer exists.
        let resp = d.dispatch(test_request(Method::GET, "/orders/42")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unmatched_path_yields_json_404() {
        let d = dispatcher(Registry::new());
        let resp = d.dispatch(test_request(Method::GET, "/nowhere")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert!(v["msg"].is_string());
        assert!(!resp.body().is_empty());
    }

    #[tokio::test]
    async fn wrong_method_yields_json_405() {
        let d = dispatcher(Registry::new().route(Method::GET, "/orders/{id}", echo_id));
        let resp = d.dispatch(test_request(Method::DELETE, "/rest/orders/42")).await;
        assert_eq!(resp.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(v["msg"], "method not allowed");
    }

    #[tokio::test]
    async fn conflicting_routes_are_rejected_at_build() {
        let registry = Registry::new()
            .route(Method::GET, "/a/{x}", echo_id)
            .route(Method::GET, "/a/{x}", echo_id);
        let err =
            Dispatcher::build(registry, "", Vec::new(), Recovery::new(Vec::new())).unwrap_err();
        assert!(matches!(err, crate::Error::Route { .. }));
    }

    #[tokio::test]
    async fn panicking_handler_recovers_to_500() {
        async fn boom(_req: Request) -> Response {
            panic!("boom");
        }
        let d = dispatcher(Registry::new().route(Method::GET, "/boom", boom));
        let resp = d.dispatch(test_request(Method::GET, "/rest/boom")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ignore_list_covers_infrastructure_paths() {
        for path in [HEALTHZ, HEALTHZ_LOG, HEALTHZ_PING, INFO, METRICS_URI, "/debug/pprof/heap"] {
            assert!(is_ignored(path), "{path} should be ignored");
        }
        assert!(!is_ignored("/rest/orders/1"));
        assert!(!is_ignored("/healthz2"));
    }
}
