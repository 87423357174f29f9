//! Built-in health-probe and build-info handlers.
//!
//! `GET|HEAD /healthz`, `/healthz/log`, `/healthz/ping` and `GET /info` all
//! answer 200; HEAD gets an empty body, GET gets the build metadata JSON that
//! deploy tooling scrapes. These paths sit on the ignore-list, so probes
//! never show up in traces, metrics or debug logs.

use http::{Method, StatusCode};

use crate::request::Request;
use crate::response::Response;
use crate::version::BuildInfo;

pub(crate) async fn healthz(req: Request) -> Response {
    if req.method() == Method::HEAD {
        return Response::status(StatusCode::OK);
    }
    Response::ok(&BuildInfo::current())
}

/// Default `/debug/pprof/*` handler, used until a profiler collaborator is
/// installed via [`Server::profiler`](crate::Server::profiler).
pub(crate) async fn profiling_disabled(_req: Request) -> Response {
    Response::failed(StatusCode::NOT_IMPLEMENTED, "profiling not enabled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_request;

    #[tokio::test]
    async fn head_probe_has_empty_body() {
        let resp = healthz(test_request(Method::HEAD, "/healthz")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn get_probe_serves_build_info() {
        let resp = healthz(test_request(Method::GET, "/info")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
        assert!(v["golangVersion"].is_string());
    }
}
