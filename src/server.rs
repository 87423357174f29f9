//! Pipeline composition and server lifecycle.
//!
//! `Server` is the composer: it owns the interceptor chain, the recovery
//! boundary and the built-in routes, and folds them with the application's
//! [`Registry`] into one handler at `serve` time. Everything is configured
//! before `serve`; the registry is consumed, so the serving route table and
//! chain are immutable snapshots.
//!
//! # Graceful shutdown
//!
//! `serve` returns after a full graceful shutdown: SIGTERM / Ctrl-C or
//! [`ServerHandle::stop`], followed by in-flight requests completing. When
//! Kubernetes terminates a pod it sends SIGTERM and waits
//! `terminationGracePeriodSeconds` before SIGKILL — set that longer than your
//! slowest request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::health;
use crate::metrics::HttpMetrics;
use crate::middleware::{
    Compress, DebugLog, MetricsInterceptor, Middleware, Next, TracerInterceptor,
};
use crate::recover::{PanicHandler, PanicReport, Recovery};
use crate::request::Request;
use crate::response::Response;
use crate::router::{
    self, Dispatcher, HEALTHZ, HEALTHZ_LOG, HEALTHZ_PING, INFO, METRICS_URI, Registry,
};

const DEFAULT_PATH_PREFIX: &str = "/rest";
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// The HTTP server and pipeline composer.
///
/// ```rust,no_run
/// use girder::{Method, Registry, Request, Response, Server};
///
/// # async fn demo(_: Request) -> Response { Response::text("hello") }
/// #[tokio::main]
/// async fn main() {
///     let app = Registry::new().route(Method::GET, "/demo", demo);
///     Server::bind("0.0.0.0:8082").serve(app).await.unwrap();
/// }
/// ```
pub struct Server {
    addr: String,
    path_prefix: String,
    trace_enabled: bool,
    read_timeout: Duration,
    metrics_namespace: String,
    panic_handlers: Vec<PanicHandler>,
    profiler: Option<BoxedHandler>,
    extra: Vec<Arc<dyn Middleware>>,
    ready_rx: watch::Receiver<Option<SocketAddr>>,
    ready_tx: watch::Sender<Option<SocketAddr>>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Server {
    /// Configures a server that will bind `addr` when `serve` is called.
    /// Nothing is validated or bound until then.
    pub fn bind(addr: impl Into<String>) -> Self {
        let (ready_tx, ready_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            addr: addr.into(),
            path_prefix: DEFAULT_PATH_PREFIX.to_owned(),
            trace_enabled: true,
            read_timeout: DEFAULT_READ_TIMEOUT,
            metrics_namespace: env!("CARGO_PKG_NAME").to_owned(),
            panic_handlers: Vec::new(),
            profiler: None,
            extra: Vec::new(),
            ready_rx,
            ready_tx,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    /// Prefix applied to every application route (built-in routes stay
    /// unprefixed). Defaults to `/rest`.
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// Removes the tracer interceptor from the chain entirely — not a
    /// runtime bypass; disabled tracing costs nothing per request.
    pub fn disable_trace(mut self) -> Self {
        self.trace_enabled = false;
        self
    }

    /// Idle-connection header read timeout. Defaults to 120 s.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Namespace prepended to every metric name. Defaults to the crate name.
    pub fn metrics_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metrics_namespace = namespace.into();
        self
    }

    /// Appends a crash-notification callback, invoked after a handler panic
    /// has been converted into a 500. Callbacks run in registration order;
    /// one failing does not stop the rest.
    pub fn panic_handler(mut self, handler: impl Fn(&PanicReport) + Send + Sync + 'static) -> Self {
        self.panic_handlers.push(Arc::new(handler));
        self
    }

    /// Installs the `/debug/pprof/*` collaborator. Without one the endpoint
    /// answers 501.
    pub fn profiler(mut self, handler: impl Handler) -> Self {
        self.profiler = Some(handler.into_boxed_handler());
        self
    }

    /// Appends a custom interceptor between the built-in chain and the
    /// dispatcher. Like routes, the chain is fixed once `serve` runs.
    pub fn middleware(mut self, interceptor: impl Middleware) -> Self {
        self.extra.push(Arc::new(interceptor));
        self
    }

    /// A handle for stopping the server and discovering its bound address.
    /// Cheap to clone, valid before `serve` is called.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            addr: self.ready_rx.clone(),
            stop: Arc::clone(&self.stop_tx),
        }
    }

    /// Composes the pipeline, binds the listener and serves until a graceful
    /// shutdown completes. Bind failure is an error value, never a crash.
    pub async fn serve(self, registry: Registry) -> Result<(), Error> {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|_| Error::Addr(self.addr.clone()))?;

        let app = Arc::new(App::compose(
            registry,
            &self.path_prefix,
            self.trace_enabled,
            &self.metrics_namespace,
            self.panic_handlers,
            self.profiler,
            self.extra,
        )?);
        let read_timeout = self.read_timeout;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local = listener.local_addr()?;
        let _ = self.ready_tx.send(Some(local));
        info!(addr = %local, "girder listening");

        // Tells in-flight connections to finish their current request and
        // close, once the accept loop has stopped.
        let (conn_stop_tx, conn_stop_rx) = watch::channel(false);

        // JoinSet tracks every connection task so shutdown can drain them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal(self.stop_rx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a stop immediately halts accepts,
                // even with more connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    let app = Arc::clone(&app);
                    let stop = conn_stop_rx.clone();
                    tasks.spawn(serve_connection(stream, peer, app, read_timeout, stop));
                }

                // Reap finished tasks so the JoinSet does not grow without
                // bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        let _ = conn_stop_tx.send(true);
        while tasks.join_next().await.is_some() {}

        info!("girder stopped");
        Ok(())
    }
}

/// Remote control for a running [`Server`].
#[derive(Clone)]
pub struct ServerHandle {
    addr: watch::Receiver<Option<SocketAddr>>,
    stop: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Waits until the listener is bound and returns its address. `None` if
    /// the server exited before ever listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut rx = self.addr.clone();
        loop {
            if let Some(addr) = *rx.borrow() {
                return Some(addr);
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Requests a graceful shutdown: the listener stops accepting, in-flight
    /// requests complete, then `serve` returns.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

// ── Composition ───────────────────────────────────────────────────────────────

/// The composed pipeline: interceptor chain plus dispatcher, shared by all
/// connection tasks.
pub(crate) struct App {
    chain: Arc<[Arc<dyn Middleware>]>,
    dispatcher: Arc<Dispatcher>,
}

impl App {
    /// Folds registry, built-in routes, recovery and the interceptor chain
    /// into one handler. Interceptor order (outermost first): tracer when
    /// enabled, metrics, debug logging, compression, then any custom
    /// interceptors, then the recovery-wrapped dispatcher.
    pub(crate) fn compose(
        registry: Registry,
        path_prefix: &str,
        trace_enabled: bool,
        metrics_namespace: &str,
        panic_handlers: Vec<PanicHandler>,
        profiler: Option<BoxedHandler>,
        extra: Vec<Arc<dyn Middleware>>,
    ) -> Result<Self, Error> {
        let metrics = Arc::new(HttpMetrics::new(metrics_namespace)?);

        let mut builtins: Vec<(Method, String, BoxedHandler)> = Vec::new();
        for path in [HEALTHZ, HEALTHZ_LOG, HEALTHZ_PING] {
            builtins.push((Method::GET, path.to_owned(), health::healthz.into_boxed_handler()));
            builtins.push((Method::HEAD, path.to_owned(), health::healthz.into_boxed_handler()));
        }
        builtins.push((Method::GET, INFO.to_owned(), health::healthz.into_boxed_handler()));

        let scrape = Arc::clone(&metrics);
        let metrics_handler = move |_req: Request| {
            let scrape = Arc::clone(&scrape);
            async move {
                Response::builder()
                    .bytes("text/plain; version=0.0.4; charset=utf-8", scrape.render())
            }
        };
        builtins.push((Method::GET, METRICS_URI.to_owned(), metrics_handler.into_boxed_handler()));

        let profiler =
            profiler.unwrap_or_else(|| health::profiling_disabled.into_boxed_handler());
        builtins.push((
            Method::GET,
            format!("{}/{{*name}}", router::PPROF_PREFIX),
            profiler,
        ));

        let dispatcher = Dispatcher::build(
            registry,
            path_prefix,
            builtins,
            Recovery::new(panic_handlers),
        )?;

        let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();
        if trace_enabled {
            chain.push(Arc::new(TracerInterceptor));
        }
        chain.push(Arc::new(MetricsInterceptor::new(metrics)));
        chain.push(Arc::new(DebugLog));
        chain.push(Arc::new(Compress));
        chain.extend(extra);

        Ok(Self { chain: chain.into(), dispatcher: Arc::new(dispatcher) })
    }

    pub(crate) async fn handle(&self, req: Request) -> Response {
        Next::new(Arc::clone(&self.chain), Arc::clone(&self.dispatcher))
            .run(req)
            .await
    }
}

// ── Connection handling ───────────────────────────────────────────────────────

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    app: Arc<App>,
    read_timeout: Duration,
    stop: watch::Receiver<bool>,
) {
    // TokioIo adapts tokio's AsyncRead/AsyncWrite to hyper's IO traits.
    let io = TokioIo::new(stream);
    let svc = service_fn(move |req| {
        let app = Arc::clone(&app);
        async move { serve_request(app, req, peer).await }
    });

    // Auto builder negotiates HTTP/1.1 or HTTP/2 per connection.
    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout);

    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);
    tokio::select! {
        res = conn.as_mut() => {
            if let Err(e) = res {
                warn!(peer = %peer, "connection error: {e}");
            }
        }
        () = stopped(stop) => {
            // Finish the request in flight, then close instead of holding
            // the keep-alive connection open forever.
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                warn!(peer = %peer, "connection error during shutdown: {e}");
            }
        }
    }
}

/// Core hot path: one hyper request through the composed pipeline.
///
/// The error type is `Infallible` — every failure becomes a response with a
/// JSON `msg` body, hyper never sees an error.
async fn serve_request(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_owned();
    let query = parts.uri.query().map(str::to_owned);

    let body = match Limited::new(body, MAX_REQUEST_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let status = if e.downcast_ref::<LengthLimitError>().is_some() {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            return Ok(Response::failed(status, "read request body failed").into_hyper());
        }
    };

    let request = Request::new(parts.method, path, query, parts.headers, body, peer);
    Ok(app.handle(request).await.into_hyper())
}

// ── Shutdown plumbing ─────────────────────────────────────────────────────────

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves on the first shutdown trigger: [`ServerHandle::stop`], SIGTERM
/// (what Kubernetes sends) or SIGINT (Ctrl-C for local dev).
async fn shutdown_signal(stop: watch::Receiver<bool>) {
    let explicit = stopped(stop);

    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; rely on the other triggers.
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = explicit => {}
        () = ctrl_c => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_request;

    fn compose(registry: Registry, prefix: &str, namespace: &str) -> App {
        App::compose(registry, prefix, true, namespace, Vec::new(), None, Vec::new()).unwrap()
    }

    async fn scrape(app: &App) -> String {
        let resp = app.handle(test_request(Method::GET, METRICS_URI)).await;
        String::from_utf8(resp.body.clone()).unwrap()
    }

    #[tokio::test]
    async fn demo_request_records_a_sample_under_its_route() {
        async fn demo(_req: Request) -> Response {
            Response::text("hello")
        }
        let app = compose(Registry::new().route(Method::GET, "/demo", demo), "", "girder_demo");

        let resp = app.handle(test_request(Method::GET, "/demo")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(std::str::from_utf8(resp.body()).unwrap().contains("hello"));

        let text = scrape(&app).await;
        assert!(text.contains(
            r#"girder_demo_api_request_total{endpoint="/demo",method="GET",status="200"} 1"#
        ));
    }

    #[tokio::test]
    async fn metrics_label_is_the_route_template() {
        async fn order(req: Request) -> Response {
            Response::text(req.param("id").unwrap_or("?").to_owned())
        }
        let app = compose(
            Registry::new().route(Method::GET, "/orders/{id}", order),
            "/rest",
            "girder_tmpl",
        );

        app.handle(test_request(Method::GET, "/rest/orders/42")).await;
        app.handle(test_request(Method::GET, "/rest/orders/43")).await;

        let text = scrape(&app).await;
        assert!(text.contains(
            r#"girder_tmpl_api_request_total{endpoint="/rest/orders/{id}",method="GET",status="200"} 2"#
        ));
        assert!(!text.contains("/rest/orders/42"));
    }

    #[tokio::test]
    async fn unmatched_path_falls_back_to_raw_path_label() {
        let app = compose(Registry::new(), "", "girder_fallback");
        app.handle(test_request(Method::GET, "/nowhere")).await;
        let text = scrape(&app).await;
        assert!(text.contains(
            r#"girder_fallback_api_request_total{endpoint="/nowhere",method="GET",status="404"} 1"#
        ));
    }

    #[tokio::test]
    async fn ignored_paths_never_produce_samples() {
        let app = compose(Registry::new(), "", "girder_ignore");
        app.handle(test_request(Method::GET, HEALTHZ)).await;
        app.handle(test_request(Method::GET, METRICS_URI)).await;

        let text = scrape(&app).await;
        assert!(!text.contains("endpoint=\"/healthz\""));
        assert!(!text.contains("endpoint=\"/metrics\""));
    }

    #[tokio::test]
    async fn built_in_routes_answer() {
        let app = compose(Registry::new(), "/rest", "girder_builtin");

        for path in [HEALTHZ, HEALTHZ_LOG, HEALTHZ_PING, INFO] {
            let resp = app.handle(test_request(Method::GET, path)).await;
            assert_eq!(resp.status_code(), StatusCode::OK, "{path}");
        }
        let resp = app.handle(test_request(Method::HEAD, HEALTHZ)).await;
        assert!(resp.body().is_empty());

        let resp = app.handle(test_request(Method::GET, "/debug/pprof/heap")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn composed_pipeline_is_a_snapshot() {
        async fn demo(_req: Request) -> Response {
            Response::text("hello")
        }
        // The registry is consumed by composition: routes registered into a
        // *different* registry afterwards cannot reach a serving pipeline.
        let app = compose(Registry::new().route(Method::GET, "/a", demo), "", "girder_snap");
        let _later = Registry::new().route(Method::GET, "/b", demo);

        assert_eq!(
            app.handle(test_request(Method::GET, "/a")).await.status_code(),
            StatusCode::OK
        );
        assert_eq!(
            app.handle(test_request(Method::GET, "/b")).await.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn panic_handlers_fire_through_the_full_pipeline() {
        use std::sync::Mutex;
        async fn boom(_req: Request) -> Response {
            panic!("demo panic");
        }
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let notify: PanicHandler = Arc::new(move |report: &PanicReport| {
            seen2.lock().unwrap().push(report.message.clone());
        });
        let app = App::compose(
            Registry::new().route(Method::GET, "/boom", boom),
            "",
            true,
            "girder_panic",
            vec![notify],
            None,
            Vec::new(),
        )
        .unwrap();

        let resp = app.handle(test_request(Method::GET, "/boom")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert!(v["msg"].is_string());
        assert_eq!(*seen.lock().unwrap(), vec!["demo panic".to_owned()]);

        // The panicked request still produced a metrics sample.
        let text = scrape(&app).await;
        assert!(text.contains(
            r#"girder_panic_api_request_total{endpoint="/boom",method="GET",status="500"} 1"#
        ));
    }
}
