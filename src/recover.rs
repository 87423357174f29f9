//! Panic recovery at the dispatcher boundary.
//!
//! The handler future runs inside an unwind guard. A panic becomes a logged
//! 500 with a JSON `{"msg": …}` body and a run through the configured
//! crash-notification callbacks; the process never dies for a request, and
//! the guard always hands a valid response back to the interceptors above it
//! — which therefore still status-tag their span and record their metrics
//! sample for the panicked request.

use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use http::{Method, StatusCode};
use tracing::{error, warn};

use crate::handler::BoxFuture;
use crate::response::Response;

/// What the recovery boundary knows about a panicked request.
#[derive(Clone, Debug)]
pub struct PanicReport {
    pub method: Method,
    pub path: String,
    /// The panic payload, rendered to a string.
    pub message: String,
}

/// Crash-notification callback, invoked after a handler panic has been
/// converted into a 500. Register via
/// [`Server::panic_handler`](crate::Server::panic_handler).
pub type PanicHandler = Arc<dyn Fn(&PanicReport) + Send + Sync>;

/// The recovery boundary. One per server, shared by every request task.
pub(crate) struct Recovery {
    handlers: Vec<PanicHandler>,
}

impl Recovery {
    pub(crate) fn new(handlers: Vec<PanicHandler>) -> Self {
        Self { handlers }
    }

    /// Runs `fut` to completion, converting an unwind into a 500 response.
    pub(crate) async fn guard(&self, method: Method, path: String, fut: BoxFuture) -> Response {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(resp) => resp,
            Err(payload) => {
                let report = PanicReport {
                    method,
                    path,
                    message: panic_message(payload.as_ref()),
                };
                error!(
                    method = %report.method,
                    path = %report.path,
                    panic = %report.message,
                    backtrace = %Backtrace::force_capture(),
                    "handler panicked, recovered"
                );
                self.notify(&report);
                Response::failed(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }

    /// Invokes every callback in registration order. Each runs under its own
    /// unwind guard: one callback blowing up must not starve the rest.
    fn notify(&self, report: &PanicReport) {
        for handler in &self.handlers {
            let h = Arc::clone(handler);
            if std::panic::catch_unwind(AssertUnwindSafe(|| h(report))).is_err() {
                warn!(path = %report.path, "panic handler itself panicked, continuing");
            }
        }
    }
}

/// Renders a panic payload; handlers overwhelmingly panic with `&str` or
/// `String` payloads, anything else is opaque.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recording_handler(log: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> PanicHandler {
        Arc::new(move |_report| log.lock().unwrap().push(tag))
    }

    #[tokio::test]
    async fn panic_becomes_500_with_msg_body() {
        let recovery = Recovery::new(Vec::new());
        let resp = recovery
            .guard(
                Method::GET,
                "/boom".to_owned(),
                Box::pin(async { panic!("kaboom") }),
            )
            .await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(v["msg"], "internal server error");
    }

    #[tokio::test]
    async fn handlers_run_in_order_even_when_one_panics() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing: PanicHandler = Arc::new(|_| panic!("handler bug"));
        let recovery = Recovery::new(vec![
            recording_handler(Arc::clone(&log), "first"),
            failing,
            recording_handler(Arc::clone(&log), "last"),
        ]);
        recovery
            .guard(
                Method::POST,
                "/boom".to_owned(),
                Box::pin(async { panic!("kaboom") }),
            )
            .await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "last"]);
    }

    #[tokio::test]
    async fn normal_response_passes_through_untouched() {
        let recovery = Recovery::new(vec![recording_handler(
            Arc::new(Mutex::new(Vec::new())),
            "never",
        )]);
        let resp = recovery
            .guard(
                Method::GET,
                "/fine".to_owned(),
                Box::pin(async { Response::text("fine") }),
            )
            .await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"fine");
    }

    #[test]
    fn panic_message_renders_common_payloads() {
        let s: Box<dyn std::any::Any + Send> = Box::new("literal");
        assert_eq!(panic_message(s.as_ref()), "literal");
        let s: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(s.as_ref()), "<non-string panic payload>");
    }
}
