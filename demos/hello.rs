//! Minimal girder service — one traced endpoint plus the built-ins.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example hello
//!
//! Try:
//!   curl http://localhost:8082/rest/demo
//!   curl http://localhost:8082/healthz
//!   curl http://localhost:8082/info
//!   curl http://localhost:8082/metrics

use std::time::Duration;

use girder::{Method, Registry, Request, Response, Server, StatusCode, TracedClient, with_timeout};
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,girder=debug")),
        )
        .init();

    // W3C trace propagation. Spans go nowhere without an exporter — wire a
    // provider at your collector here for a real deployment.
    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(opentelemetry_sdk::trace::TracerProvider::builder().build());

    let app = Registry::new().route(Method::GET, "/demo", handle_demo);

    Server::bind("0.0.0.0:8082")
        .panic_handler(|report| {
            eprintln!("crash report: {} {}: {}", report.method, report.path, report.message);
        })
        .serve(app)
        .await
        .expect("server error");
}

// GET /rest/demo — calls our own /info endpoint, continuing the trace.
async fn handle_demo(req: Request) -> Response {
    let client = TracedClient::new();
    let info = with_timeout(
        Duration::from_secs(2),
        client.get(&req.trace_context(), "http://localhost:8082/info"),
    )
    .await;

    match info {
        Ok(body) => Response::ok(&format!("this is a demo! {}", String::from_utf8_lossy(&body))),
        Err(e) => Response::failed(StatusCode::BAD_REQUEST, format!("info failed: {e}")),
    }
}
