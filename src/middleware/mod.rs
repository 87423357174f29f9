//! The interceptor chain.
//!
//! Interceptors are held as one ordered sequence, fixed when the server is
//! composed. The interceptor at index 0 is the outermost wrapper: it runs
//! first on the way in and last on the way out, and the exit order is always
//! the exact reverse of the entry order for a given request — including
//! requests that panic, since the recovery boundary inside the dispatcher
//! converts the panic to a 500 before the chain unwinds. That ordering is a
//! tested property, not an emergent effect of closure nesting.
//!
//! The default chain, outermost to innermost:
//! tracer → metrics → debug logging → response compression → dispatcher.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::Response;
use crate::router::Dispatcher;

mod compress;
mod log;
mod metrics;
mod trace;

pub(crate) use compress::Compress;
pub(crate) use log::DebugLog;
pub(crate) use metrics::MetricsInterceptor;
pub(crate) use trace::{TRACER_NAME, TracerInterceptor};

/// The future type interceptors return.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A request-handling wrapper: runs logic before and/or after delegating to
/// the next element of the chain via [`Next::run`].
///
/// Custom interceptors registered through
/// [`Server::middleware`](crate::Server::middleware) sit between the built-in
/// chain and the dispatcher, in registration order.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// Cursor over the remaining chain, ending at the dispatcher.
///
/// Each interceptor receives a `Next` and consumes it exactly once; dropping
/// it instead short-circuits the rest of the chain (how an auth interceptor
/// would reject early, for example).
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: Arc<Dispatcher>,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Middleware>]>, endpoint: Arc<Dispatcher>) -> Self {
        Self { chain, index: 0, endpoint }
    }

    /// Passes the request to the next interceptor, or to the dispatcher once
    /// the chain is exhausted.
    pub async fn run(mut self, req: Request) -> Response {
        match self.chain.get(self.index).cloned() {
            Some(interceptor) => {
                self.index += 1;
                interceptor.handle(req, self).await
            }
            None => self.endpoint.dispatch(req).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{Method, StatusCode};

    use super::*;
    use crate::recover::Recovery;
    use crate::request::test_request;
    use crate::router::Registry;

    /// Records "<tag>-in" on entry and "<tag>-out" on exit.
    struct Recording {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recording {
        fn handle(&self, req: Request, next: Next) -> BoxFuture {
            let tag = self.tag;
            let log = Arc::clone(&self.log);
            Box::pin(async move {
                log.lock().unwrap().push(format!("{tag}-in"));
                let resp = next.run(req).await;
                log.lock().unwrap().push(format!("{tag}-out"));
                resp
            })
        }
    }

    fn chain_with(
        registry: Registry,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> (Arc<[Arc<dyn Middleware>]>, Arc<Dispatcher>) {
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recording { tag: "outer", log: Arc::clone(log) }),
            Arc::new(Recording { tag: "mid", log: Arc::clone(log) }),
            Arc::new(Recording { tag: "inner", log: Arc::clone(log) }),
        ];
        let dispatcher =
            Dispatcher::build(registry, "", Vec::new(), Recovery::new(Vec::new())).unwrap();
        (chain.into(), Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn exit_order_reverses_entry_order() {
        async fn hello(_req: Request) -> Response {
            Response::text("hi")
        }
        let log = Arc::new(Mutex::new(Vec::new()));
        let (chain, dispatcher) = chain_with(Registry::new().route(Method::GET, "/x", hello), &log);

        let resp = Next::new(chain, dispatcher).run(test_request(Method::GET, "/x")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer-in", "mid-in", "inner-in", "inner-out", "mid-out", "outer-out"]
        );
    }

    #[tokio::test]
    async fn panicking_request_still_unwinds_in_reverse() {
        async fn boom(_req: Request) -> Response {
            panic!("boom");
        }
        let log = Arc::new(Mutex::new(Vec::new()));
        let (chain, dispatcher) = chain_with(Registry::new().route(Method::GET, "/boom", boom), &log);

        let resp = Next::new(chain, dispatcher).run(test_request(Method::GET, "/boom")).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer-in", "mid-in", "inner-in", "inner-out", "mid-out", "outer-out"]
        );
    }

    #[tokio::test]
    async fn dropping_next_short_circuits() {
        struct Reject;
        impl Middleware for Reject {
            fn handle(&self, _req: Request, _next: Next) -> BoxFuture {
                Box::pin(async { Response::failed(StatusCode::UNAUTHORIZED, "no token") })
            }
        }
        let log = Arc::new(Mutex::new(Vec::new()));
        let (_, dispatcher) = chain_with(Registry::new(), &log);
        let chain: Arc<[Arc<dyn Middleware>]> = vec![Arc::new(Reject) as Arc<dyn Middleware>].into();

        let resp = Next::new(chain, dispatcher).run(test_request(Method::GET, "/x")).await;
        assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
    }
}
