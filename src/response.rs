//! Outgoing HTTP response type, the [`IntoResponse`] conversion trait, and
//! the JSON envelope helpers.
//!
//! Envelope conventions, used by every built-in handler and recommended for
//! applications:
//!
//! - success: the raw payload, serialized as-is — [`Response::ok`]
//! - error: `{"msg": "<reason>"}` — [`Response::failed`]
//! - failure with a partial result: `{"msg": …, "result": …}` —
//!   [`Response::failed_with`]
//!
//! The common 4xx/5xx cases have shorthands: [`Response::bad_request`],
//! [`Response::unauthorized`], [`Response::forbidden`] and
//! [`Response::internal_error`].
//!
//! Internal errors always produce a body. An empty 500 or a bare connection
//! reset is never the pipeline's answer.

use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct ErrorMsg<'a> {
    msg: &'a str,
}

#[derive(Serialize)]
struct FailedMsg<'a, T: Serialize> {
    msg: &'a str,
    result: &'a T,
}

/// An outgoing HTTP response.
///
/// # Shortcuts
///
/// ```rust
/// use girder::{Response, StatusCode};
///
/// Response::ok(&serde_json::json!({"id": 1}));
/// Response::text("hello");
/// Response::failed(StatusCode::NOT_FOUND, "no such order");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use girder::{Response, StatusCode};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/orders/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    /// Route template attached by the dispatcher on the way back out, so the
    /// metrics interceptor labels by template rather than literal path.
    pub(crate) route: Option<Arc<str>>,
}

impl Response {
    /// `200 OK` with the payload serialized as the raw JSON body.
    pub fn ok<T: Serialize>(data: &T) -> Self {
        Self::encode(StatusCode::OK, data)
    }

    /// An error envelope: `{"msg": <msg>}` with the given status code.
    pub fn failed(status: StatusCode, msg: impl AsRef<str>) -> Self {
        Self::encode(status, &ErrorMsg { msg: msg.as_ref() })
    }

    /// A failure envelope carrying a partial result:
    /// `{"msg": <msg>, "result": <result>}`.
    pub fn failed_with<T: Serialize>(status: StatusCode, msg: impl AsRef<str>, result: &T) -> Self {
        Self::encode(status, &FailedMsg { msg: msg.as_ref(), result })
    }

    /// `400 Bad Request` error envelope.
    pub fn bad_request(msg: impl AsRef<str>) -> Self {
        Self::failed(StatusCode::BAD_REQUEST, msg)
    }

    /// `401 Unauthorized` error envelope.
    pub fn unauthorized(msg: impl AsRef<str>) -> Self {
        Self::failed(StatusCode::UNAUTHORIZED, msg)
    }

    /// `403 Forbidden` error envelope.
    pub fn forbidden(msg: impl AsRef<str>) -> Self {
        Self::failed(StatusCode::FORBIDDEN, msg)
    }

    /// `500 Internal Server Error` error envelope.
    pub fn internal_error(msg: impl AsRef<str>) -> Self {
        Self::failed(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Serialize `data` as a JSON body with the given status.
    pub fn encode<T: Serialize>(status: StatusCode, data: &T) -> Self {
        match serde_json::to_vec(data) {
            Ok(body) => Self::bytes_raw(status, "application/json", body),
            Err(e) => {
                error!(error = %e, "json encode failed");
                Self::bytes_raw(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    e.to_string().into_bytes(),
                )
            }
        }
    }

    /// `200 OK` — pre-serialized `application/json` bytes.
    pub fn json(body: Vec<u8>) -> Self {
        Self::bytes_raw(StatusCode::OK, "application/json", body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes_raw(StatusCode::OK, "text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(status: StatusCode) -> Self {
        Self { status, headers: Vec::new(), body: Vec::new(), route: None }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn bytes_raw(status: StatusCode, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            body,
            route: None,
        }
    }

    pub(crate) fn into_hyper(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match builder.body(Full::new(Bytes::from(self.body))) {
            Ok(resp) => resp,
            Err(e) => {
                // A handler pushed a malformed header name/value. Degrade to
                // a bare 500 rather than tearing down the connection.
                error!(error = %e, "response headers invalid");
                let mut resp = http::Response::new(Full::new(Bytes::new()));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            }
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Obtain via [`Response::builder()`];
/// defaults to 200 and is terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Terminate with an arbitrary content type.
    pub fn bytes(self, content_type: &str, body: Vec<u8>) -> Response {
        self.finish(content_type, body)
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Vec::new(), route: None }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { status: self.status, headers, body, route: None }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`]; implement on your own types to
/// return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        Response::text(self)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        Response::text(self)
    }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        Response::status(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_has_msg_field() {
        let resp = Response::failed(StatusCode::NOT_FOUND, "no such route");
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(v["msg"], "no such route");
    }

    #[test]
    fn status_shorthands_wrap_the_error_envelope() {
        for (resp, status) in [
            (Response::bad_request("bad id"), StatusCode::BAD_REQUEST),
            (Response::unauthorized("no token"), StatusCode::UNAUTHORIZED),
            (Response::forbidden("not yours"), StatusCode::FORBIDDEN),
            (Response::internal_error("oops"), StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            assert_eq!(resp.status_code(), status);
            let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
            assert!(v["msg"].is_string(), "{status}");
        }
    }

    #[test]
    fn failure_envelope_carries_partial_result() {
        let resp = Response::failed_with(
            StatusCode::BAD_REQUEST,
            "two ids unknown",
            &vec!["a", "b"],
        );
        let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(v["msg"], "two ids unknown");
        assert_eq!(v["result"][1], "b");
    }

    #[test]
    fn ok_body_is_raw_payload() {
        let resp = Response::ok(&serde_json::json!({"id": 7}));
        let v: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(v, serde_json::json!({"id": 7}));
        assert_eq!(resp.header("content-type"), Some("application/json"));
    }

    #[test]
    fn builder_sets_status_and_headers() {
        let resp = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/orders/99")
            .json(b"{}".to_vec());
        assert_eq!(resp.status_code(), StatusCode::CREATED);
        assert_eq!(resp.header("location"), Some("/orders/99"));
        let hyper = resp.into_hyper();
        assert_eq!(hyper.status(), StatusCode::CREATED);
    }
}
