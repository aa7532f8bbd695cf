//! HTTP transport abstraction.
//!
//! The session never talks to the network directly: it hands a fully merged
//! [`TransportRequest`] to an injectable [`HttpTransport`]. The default
//! implementation is backed by `reqwest`; tests substitute their own.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap};

use crate::config::HttpConfig;
use crate::error::{FetchError, Result};
use crate::options::{Credentials, RequestOptions};
use crate::response::HttpResponse;

/// Transport-level request data, after option merging.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl TransportRequest {
    /// Build the wire request for `url` from merged options.
    ///
    /// A missing method means GET. `Credentials::Omit` strips cookie and
    /// authorization headers.
    pub fn from_options(url: String, options: &RequestOptions) -> Self {
        let mut headers = options.headers.clone();
        if options.credentials == Some(Credentials::Omit) {
            headers.remove(COOKIE);
            headers.remove(AUTHORIZATION);
        }
        Self {
            method: options.method.clone().unwrap_or(Method::GET),
            url,
            headers,
            body: options.body.clone(),
        }
    }
}

/// Performs a single HTTP exchange.
///
/// Implementations should read the whole body before returning. Cancellation
/// is handled by the session, which drops the returned future when the
/// request's signal fires.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<HttpResponse>;
}

/// Default transport backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client honoring timeouts, proxy and user agent from `config`.
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| FetchError::Configuration(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<HttpResponse> {
        let mut rb = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            rb = rb.body(body);
        }
        let resp = rb.send().await?;
        HttpResponse::from_reqwest(resp).await
    }
}
