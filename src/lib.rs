//! # girder
//!
//! An instrumented HTTP service runtime. Every request flows through one
//! fixed, ordered interceptor chain — tracer, metrics, debug logging,
//! response compression — around a radix-tree dispatcher with a panic
//! boundary. Cross-cutting concerns compose once, at construction, and then
//! hold for every request under concurrency.
//!
//! ## The contract
//!
//! - **Ordering** — interceptor 0 is outermost: first in, last out, reversed
//!   exactly on the unwind path, for every request including panicking ones.
//! - **No silent failure** — a handler panic becomes a logged 500 with a JSON
//!   `{"msg": …}` body; instrumentation failures are logged and swallowed;
//!   only startup failures (bad address, bind, route conflicts) surface as
//!   `Err` from [`Server::serve`].
//! - **Trace continuity** — the server extracts the caller's trace context
//!   from inbound headers, and [`TracedClient`] re-injects it on outbound
//!   calls, so one trace spans the fleet. Span lifecycle and wire format
//!   belong to the globally registered OpenTelemetry tracer and propagator.
//! - **Probes don't pollute** — `/healthz`, `/info`, `/metrics` and
//!   `/debug/pprof` are served built-in and excluded from traces, metrics
//!   and debug logs.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use girder::{Method, Registry, Request, Response, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Registry::new()
//!         .route(Method::GET, "/orders/{id}", get_order);
//!
//!     // Listens on :8082, serves /rest/orders/{id} plus the built-in
//!     // health, info, metrics and profiling endpoints.
//!     Server::bind("0.0.0.0:8082").serve(app).await.unwrap();
//! }
//!
//! async fn get_order(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::ok(&serde_json::json!({ "id": id }))
//! }
//! ```
//!
//! Handlers that call other services keep the trace alive by passing the
//! request's context to the client:
//!
//! ```rust,no_run
//! # use girder::{Request, Response, StatusCode, TracedClient};
//! async fn proxy_info(req: Request) -> Response {
//!     let client = TracedClient::new();
//!     match client.get(&req.trace_context(), "http://inventory:8082/info").await {
//!         Ok(body) => Response::json(body.to_vec()),
//!         Err(e) => Response::failed(StatusCode::BAD_GATEWAY, e.to_string()),
//!     }
//! }
//! ```

mod client;
mod error;
mod handler;
mod health;
mod metrics;
mod propagation;
mod recover;
mod request;
mod response;
mod router;
mod server;
mod version;

pub mod middleware;

pub use client::{TracedClient, with_timeout};
pub use error::Error;
pub use handler::Handler;
pub use recover::{PanicHandler, PanicReport};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Registry;
pub use server::{Server, ServerHandle};
pub use version::BuildInfo;

// The wire types are the `http` crate's; re-exported so applications don't
// need a direct dependency for the common cases.
pub use http::{Method, StatusCode};
