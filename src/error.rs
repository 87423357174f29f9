//! Unified error type.
//!
//! Only infrastructure failures live here: binding the listener, an invalid
//! route table, an outbound call that never completed. Application-level
//! failures (404, 422, a panicking handler) are expressed as HTTP
//! [`Response`](crate::Response) values and never surface as `Error`s — a
//! missing trace or a dropped metric is not a failed request.

use std::net::SocketAddr;
use std::time::Duration;

/// The error type returned by girder's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured listen address did not parse as `host:port`.
    #[error("invalid listen address `{0}`")]
    Addr(String),

    /// Binding the TCP listener failed (port taken, permission denied).
    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A registered route path was rejected by the radix tree
    /// (syntax error or conflict with an existing route).
    #[error("invalid route `{path}`: {reason}")]
    Route { path: String, reason: String },

    /// Setting up the metrics registry failed (duplicate collector names).
    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    /// An outbound HTTP call failed at the transport level.
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    /// A future wrapped by [`with_timeout`](crate::with_timeout) did not
    /// complete within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
