//! Build version metadata served by `/info` and the health probes.

use serde::Serialize;

/// Build-time metadata for the running binary.
///
/// Field names on the wire are fixed for compatibility with existing
/// dashboards and deploy tooling that scrape `/info` — including
/// `golangVersion`, which here carries the Rust toolchain string.
///
/// Everything except `version` is stamped in at compile time through
/// `GIRDER_*` environment variables (set them from your build script or CI):
///
/// ```sh
/// GIRDER_GIT_REVISION=$(git rev-parse --short HEAD) \
/// GIRDER_BUILD_TIME=$(date -u +%Y-%m-%dT%H:%M:%SZ) \
/// cargo build --release
/// ```
#[derive(Clone, Copy, Debug, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    #[serde(rename = "gitRevision")]
    pub git_revision: &'static str,
    pub user: &'static str,
    pub host: &'static str,
    #[serde(rename = "buildTime")]
    pub build_time: &'static str,
    #[serde(rename = "golangVersion")]
    pub toolchain: &'static str,
    #[serde(rename = "buildStatus")]
    pub build_status: &'static str,
}

impl BuildInfo {
    /// Metadata for the current build. Unstamped fields read `"unknown"`.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_revision: option_env!("GIRDER_GIT_REVISION").unwrap_or("unknown"),
            user: option_env!("GIRDER_BUILD_USER").unwrap_or("unknown"),
            host: option_env!("GIRDER_BUILD_HOST").unwrap_or("unknown"),
            build_time: option_env!("GIRDER_BUILD_TIME").unwrap_or("unknown"),
            toolchain: option_env!("GIRDER_RUSTC_VERSION").unwrap_or("unknown"),
            build_status: option_env!("GIRDER_BUILD_STATUS").unwrap_or("unknown"),
        }
    }
}
