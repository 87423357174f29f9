//! Carrier adapters between HTTP header maps and the trace propagator.
//!
//! Tracing code never touches a concrete header representation directly: it
//! sees only the two narrow capabilities below — a key/value writer for
//! outbound injection and a key/value reader for inbound extraction. Both
//! operate over the header map in place; header stores can be large and are
//! never copied into an intermediate mapping.
//!
//! The wire encoding itself belongs to the globally registered text-map
//! propagator (W3C `traceparent`/`tracestate` in the demos), so injection and
//! extraction stay symmetric: `extract(inject(cx))` preserves trace identity.

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::Context;
use opentelemetry::global;
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::trace::TraceContextExt;
use tracing::debug;

/// Reader capability over an inbound header map.
pub(crate) struct HeaderExtractor<'a>(pub(crate) &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Writer capability over an outbound header map.
pub(crate) struct HeaderInjector<'a>(pub(crate) &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.0.insert(name, value);
            }
            _ => {
                // Injection problems never fail the call; the request goes
                // out with whatever headers were already written.
                debug!(key, "trace header injection skipped: invalid name or value");
            }
        }
    }
}

/// Extracts the remote trace context from inbound headers.
///
/// Absence is the normal case for untraced callers and yields an empty
/// context; present-but-undecodable headers are reported at debug level and
/// tracing proceeds with a fresh root.
pub(crate) fn extract_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| {
        let cx = propagator.extract(&HeaderExtractor(headers));
        if !cx.span().span_context().is_valid()
            && propagator.fields().any(|f| headers.contains_key(f))
        {
            debug!("inbound trace headers present but no valid context extracted");
        }
        cx
    })
}

/// Injects `cx` into outbound headers through the writer capability.
pub(crate) fn inject_context(cx: &Context, headers: &mut HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut HeaderInjector(headers));
    });
}
