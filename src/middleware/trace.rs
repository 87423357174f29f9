//! Server-side tracer interceptor.
//!
//! Makes every request part of a trace: extract a remote parent from the
//! inbound headers (or start a fresh root), expose the span's context through
//! the request store for the rest of the pipeline and the outbound client,
//! then status-tag and finish the span exactly once on the way out. The
//! recovery boundary sits inside this interceptor, so even a panicking
//! handler comes back as a 500 response and the span is still finished.
//!
//! Ignore-listed paths skip all of this — probes never create spans.

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer};

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::propagation::extract_context;
use crate::request::Request;
use crate::router::is_ignored;

pub(crate) const TRACER_NAME: &str = "girder";

pub(crate) struct TracerInterceptor;

impl Middleware for TracerInterceptor {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        Box::pin(async move {
            if is_ignored(req.path()) {
                return next.run(req).await;
            }

            let parent = extract_context(req.headers());
            let tracer = global::tracer(TRACER_NAME);
            let span = tracer
                .span_builder("http.server")
                .with_kind(SpanKind::Server)
                .with_attributes([
                    KeyValue::new("http.method", req.method().to_string()),
                    KeyValue::new("http.url", req.url()),
                    KeyValue::new("component", TRACER_NAME),
                ])
                .start_with_context(&tracer, &parent);
            let cx = parent.with_span(span);
            req.set_trace_context(cx.clone());

            let resp = next.run(req).await;

            let span = cx.span();
            span.set_attribute(KeyValue::new(
                "http.status_code",
                i64::from(resp.status_code().as_u16()),
            ));
            span.end();
            resp
        })
    }
}
