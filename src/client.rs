//! Outbound HTTP client that continues the caller's trace.
//!
//! Every call derives a child span from the supplied context, injects that
//! span's context into the outbound headers through the carrier writer, and
//! finishes the span when the round trip completes — success or error. An
//! untraced context simply produces a root client span; tracing never gates
//! the call itself.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue, global};

use crate::error::Error;
use crate::middleware::TRACER_NAME;
use crate::propagation::inject_context;

/// A traced HTTP client over a shared, connection-pooled transport.
///
/// Cheap to clone; clones share the pool. Handlers obtain the context to pass
/// in from [`Request::trace_context`](crate::Request::trace_context).
#[derive(Clone, Default)]
pub struct TracedClient {
    http: reqwest::Client,
}

impl TracedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// `GET` the URI and return the raw response body bytes.
    pub async fn get(&self, cx: &Context, uri: &str) -> Result<Bytes, Error> {
        self.request(cx, Method::GET, uri, None).await
    }

    /// `POST` the body to the URI and return the raw response body bytes.
    pub async fn post(&self, cx: &Context, uri: &str, body: Bytes) -> Result<Bytes, Error> {
        self.request(cx, Method::POST, uri, Some(body)).await
    }

    /// Performs one traced round trip.
    ///
    /// Non-2xx responses are not errors at this layer; callers get the body
    /// either way and judge the status themselves through higher-level
    /// conventions.
    pub async fn request(
        &self,
        cx: &Context,
        method: Method,
        uri: &str,
        body: Option<Bytes>,
    ) -> Result<Bytes, Error> {
        let tracer = global::tracer(TRACER_NAME);
        let span = tracer
            .span_builder("http.client")
            .with_kind(SpanKind::Client)
            .with_attributes([
                KeyValue::new("http.method", method.to_string()),
                KeyValue::new("http.url", uri.to_owned()),
                KeyValue::new("component", TRACER_NAME),
            ])
            .start_with_context(&tracer, cx);
        let child = cx.with_span(span);

        let mut headers = HeaderMap::new();
        inject_context(&child, &mut headers);

        let mut builder = self.http.request(method, uri).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let result = match builder.send().await {
            Ok(resp) => {
                let span = child.span();
                span.set_attribute(KeyValue::new(
                    "http.status_code",
                    i64::from(resp.status().as_u16()),
                ));
                resp.bytes().await.map_err(Error::from)
            }
            Err(e) => Err(Error::from(e)),
        };

        let span = child.span();
        if let Err(e) = &result {
            span.set_status(Status::error(e.to_string()));
        }
        span.end();
        result
    }
}

/// Runs `fut` with a deadline, mapping elapse to [`Error::Timeout`].
///
/// Outbound calls carry no deadline of their own beyond the transport's;
/// callers needing bounded latency wrap the call:
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use girder::{TracedClient, with_timeout};
/// # async fn demo(client: TracedClient, cx: opentelemetry::Context) {
/// let body = with_timeout(Duration::from_secs(2), client.get(&cx, "http://orders/info")).await;
/// # }
/// ```
pub async fn with_timeout<F, T>(deadline: Duration, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(deadline)),
    }
}
