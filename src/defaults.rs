//! Default Configuration Values
//!
//! Centralizes the defaults used by [`crate::HttpConfig`] and the telemetry helpers.

use std::time::Duration;

/// HTTP client default configurations
pub mod http {
    use super::*;

    /// Default request timeout applied by the reqwest transport.
    ///
    /// Operations never time out on their own; this only bounds a single
    /// transport call when the caller did not pass a deadline-bound signal.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default connection timeout for establishing HTTP connections
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default User-Agent string for HTTP requests
    pub const USER_AGENT: &str = concat!("initfetch/", env!("CARGO_PKG_VERSION"));
}

/// Environment variables read by [`crate::telemetry::init_from_env`].
pub mod env {
    pub const LOG_LEVEL: &str = "INITFETCH_LOG_LEVEL";
    pub const LOG_FORMAT: &str = "INITFETCH_LOG_FORMAT";
}
