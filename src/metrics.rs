//! Per-server HTTP metrics, exposed at `/metrics` in Prometheus text format.
//!
//! Each server owns its registry so independent instances can coexist in one
//! process (and in one test binary). Collectors mirror the fleet's existing
//! dashboards: request totals, request/response bytes and latency, all keyed
//! by `{method, endpoint, status}` where `endpoint` is the registered route
//! template — `/orders/42` and `/orders/43` aggregate under `/orders/{id}`.

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::error;

use crate::version::BuildInfo;

const LABELS: &[&str] = &["method", "endpoint", "status"];

pub(crate) struct HttpMetrics {
    registry: Registry,
    request_total: CounterVec,
    request_bytes: CounterVec,
    response_time: HistogramVec,
    response_size: HistogramVec,
}

impl HttpMetrics {
    pub(crate) fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_total = CounterVec::new(
            Opts::new("request_total", "Total number of requests.")
                .namespace(namespace)
                .subsystem("api"),
            LABELS,
        )?;
        let request_bytes = CounterVec::new(
            Opts::new("request_bytes", "Total request body bytes.")
                .namespace(namespace)
                .subsystem("api"),
            LABELS,
        )?;
        let response_time = HistogramVec::new(
            HistogramOpts::new("response_time", "Response time of each request in milliseconds.")
                .namespace(namespace)
                .subsystem("api")
                .buckets(vec![
                    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
                    10000.0,
                ]),
            LABELS,
        )?;
        let response_size = HistogramVec::new(
            HistogramOpts::new("response_size", "Response body bytes of each request.")
                .namespace(namespace)
                .subsystem("api")
                .buckets(prometheus::exponential_buckets(64.0, 4.0, 10)?),
            LABELS,
        )?;
        let version = IntGaugeVec::new(
            Opts::new("version", "Which build is running; 1 for the current build's labels.")
                .namespace(namespace)
                .subsystem("server"),
            &["version", "revision", "rustc_version"],
        )?;

        registry.register(Box::new(request_total.clone()))?;
        registry.register(Box::new(request_bytes.clone()))?;
        registry.register(Box::new(response_time.clone()))?;
        registry.register(Box::new(response_size.clone()))?;
        registry.register(Box::new(version.clone()))?;

        let build = BuildInfo::current();
        version
            .with_label_values(&[build.version, build.git_revision, build.toolchain])
            .set(1);

        Ok(Self { registry, request_total, request_bytes, response_time, response_size })
    }

    /// One sample for one completed request. Updates are fire-and-forget
    /// against internally synchronized collectors; nothing here blocks.
    pub(crate) fn observe(
        &self,
        method: &str,
        endpoint: &str,
        status: &str,
        request_bytes: f64,
        response_bytes: f64,
        latency_ms: f64,
    ) {
        let labels = &[method, endpoint, status];
        self.request_total.with_label_values(labels).inc();
        self.request_bytes.with_label_values(labels).inc_by(request_bytes.max(0.0));
        self.response_time.with_label_values(labels).observe(latency_ms);
        self.response_size.with_label_values(labels).observe(response_bytes);
    }

    /// Text exposition of every collector in this server's registry.
    pub(crate) fn render(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            error!(error = %e, "metrics encode failed");
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_show_up_in_exposition() {
        let metrics = HttpMetrics::new("girder_test").unwrap();
        metrics.observe("GET", "/orders/{id}", "200", 12.0, 345.0, 8.5);
        metrics.observe("GET", "/orders/{id}", "200", 3.0, 7.0, 1.2);

        let text = String::from_utf8(metrics.render()).unwrap();
        assert!(text.contains(
            r#"girder_test_api_request_total{endpoint="/orders/{id}",method="GET",status="200"} 2"#
        ));
        assert!(text.contains("girder_test_api_response_time"));
        assert!(text.contains("girder_test_server_version{"));
        assert!(text.contains("rustc_version="));
    }

    #[test]
    fn negative_request_bytes_clamp_to_zero() {
        let metrics = HttpMetrics::new("girder_clamp").unwrap();
        metrics.observe("POST", "/x", "200", -5.0, 0.0, 0.1);
        let text = String::from_utf8(metrics.render()).unwrap();
        assert!(text.contains(
            r#"girder_clamp_api_request_bytes{endpoint="/x",method="POST",status="200"} 0"#
        ));
    }

    #[test]
    fn two_registries_coexist() {
        let a = HttpMetrics::new("girder_a").unwrap();
        let b = HttpMetrics::new("girder_b").unwrap();
        a.observe("GET", "/only-a", "200", 0.0, 0.0, 0.0);
        let b_text = String::from_utf8(b.render()).unwrap();
        assert!(!b_text.contains("/only-a"));
    }
}
