//! Response compression interceptor.
//!
//! Gzips the response body when the client advertised `accept-encoding:
//! gzip`, the body clears a minimum size, and the response is not already
//! encoded. Tiny bodies gain nothing from the gzip header overhead.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::warn;

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::request::Request;

const MIN_BODY_LEN: usize = 256;

pub(crate) struct Compress;

impl Middleware for Compress {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let accepts_gzip = req
            .header("accept-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"));
        Box::pin(async move {
            let mut resp = next.run(req).await;

            if accepts_gzip
                && resp.body.len() >= MIN_BODY_LEN
                && resp.header("content-encoding").is_none()
            {
                match gzip(&resp.body) {
                    Ok(compressed) => {
                        resp.body = compressed;
                        resp.headers.push(("content-encoding".to_owned(), "gzip".to_owned()));
                        resp.headers.push(("vary".to_owned(), "accept-encoding".to_owned()));
                    }
                    Err(e) => {
                        // Send the identity body; compression is best-effort.
                        warn!(error = %e, "gzip failed");
                    }
                }
            }
            resp
        })
    }
}

fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}
