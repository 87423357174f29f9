//! Metrics interceptor.
//!
//! One sample per completed request: count, request/response body bytes and
//! latency in milliseconds, labeled by method, endpoint and status. The
//! endpoint label is the matched route template carried back from the
//! dispatcher, so `/orders/42` and `/orders/43` aggregate together; when no
//! route matched, the raw path is the fallback. Ignore-listed paths are
//! skipped entirely, so probes and the scrape itself never produce samples.

use std::sync::Arc;
use std::time::Instant;

use crate::metrics::HttpMetrics;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;
use crate::router::is_ignored;

pub(crate) struct MetricsInterceptor {
    metrics: Arc<HttpMetrics>,
}

impl MetricsInterceptor {
    pub(crate) fn new(metrics: Arc<HttpMetrics>) -> Self {
        Self { metrics }
    }
}

impl Middleware for MetricsInterceptor {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let metrics = Arc::clone(&self.metrics);
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().to_string();
            let path = req.path().to_owned();
            let request_bytes = req.body().len() as f64;

            let resp = next.run(req).await;

            if !is_ignored(&path) {
                let endpoint = resp.route.as_deref().unwrap_or(&path);
                metrics.observe(
                    &method,
                    endpoint,
                    resp.status_code().as_str(),
                    request_bytes,
                    resp.body().len() as f64,
                    start.elapsed().as_secs_f64() * 1000.0,
                );
            }
            resp
        })
    }
}
