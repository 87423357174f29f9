//! Per-request debug logging interceptor.
//!
//! Emits one structured line per completed request, but only when debug
//! output is enabled — checked before AND after the inner call so the
//! disabled hot path captures no timestamp at all. Ignore-listed paths stay
//! silent; probes arriving every few seconds are log noise, not signal.

use std::time::Instant;

use tracing::{Level, debug, enabled};

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;
use crate::router::is_ignored;

pub(crate) struct DebugLog;

impl Middleware for DebugLog {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin(async move {
            let mut before = None;
            if enabled!(Level::DEBUG) {
                before = Some((Instant::now(), req.method().to_string(), req.path().to_owned(), req.peer()));
            }

            let resp = next.run(req).await;

            if enabled!(Level::DEBUG) {
                if let Some((start, method, path, peer)) = before {
                    if !is_ignored(&path) {
                        debug!(
                            status = resp.status_code().as_u16(),
                            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
                            client = %peer,
                            method = %method,
                            path = %path,
                            response_size = resp.body().len(),
                            "http request"
                        );
                    }
                }
            }
            resp
        })
    }
}
