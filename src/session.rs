//! The request session: base URL, default options and transport.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::error::Result;
use crate::fetch::{FetchOperation, FetchOptions};
use crate::infinite::{InfiniteFetchOperation, InfiniteFetchOptions};
use crate::options::{RequestOptions, RequestOptionsProvider, resolve_chain};
use crate::response::HttpResponse;
use crate::send::{SendOperation, SendOptions};
use crate::signal::race;
use crate::transport::{HttpTransport, ReqwestTransport, TransportRequest};

/// Entry point holding the base URL and default request options.
///
/// Cloning is cheap and every clone shares the same configuration. The
/// configuration is never mutated after construction, so operations created
/// from one session can run concurrently without coordination.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    base_url: String,
    default_options: RequestOptions,
    transport: Arc<dyn HttpTransport>,
}

impl Session {
    /// Create a session using the default reqwest transport.
    ///
    /// An empty `base_url` is allowed (paths are then used as-is) but logged
    /// as a warning.
    pub fn new(base_url: impl Into<String>, default_options: Option<RequestOptions>) -> Self {
        let transport = ReqwestTransport::from_config(&HttpConfig::default()).unwrap_or_else(|e| {
            warn!(error = %e, "falling back to a default HTTP client");
            ReqwestTransport::default()
        });
        Self::from_parts(
            base_url.into(),
            default_options.unwrap_or_default(),
            Arc::new(transport),
        )
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    fn from_parts(
        base_url: String,
        default_options: RequestOptions,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        if base_url.is_empty() {
            warn!("The provided base url is empty");
        }
        Self {
            inner: Arc::new(SessionInner {
                base_url,
                default_options,
                transport,
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn default_options(&self) -> &RequestOptions {
        &self.inner.default_options
    }

    /// `base_url + path`, verbatim. Slashes are the caller's business.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Resolve `init`, merge it over the defaults and perform the request.
    ///
    /// No lifecycle state is involved; this is the primitive the operations
    /// build on.
    pub async fn dispatch(
        &self,
        path: &str,
        init: impl Into<RequestOptionsProvider>,
    ) -> Result<HttpResponse> {
        let init = init.into();
        let options = resolve_chain(self.default_options(), &[&init]).await?;
        self.execute(path, options).await
    }

    /// Perform a request with already merged options.
    ///
    /// When the options carry a signal, the transport call is dropped as soon
    /// as it fires and `FetchError::Aborted` is returned.
    pub(crate) async fn execute(&self, path: &str, options: RequestOptions) -> Result<HttpResponse> {
        let request = TransportRequest::from_options(self.url_for(path), &options);
        let request_id = Uuid::new_v4();
        debug!(
            %request_id,
            method = %request.method,
            url = %request.url,
            "dispatching request"
        );

        let result = race(
            options.signal.as_ref(),
            self.inner.transport.execute(request),
        )
        .await
        .and_then(|r| r);

        match &result {
            Ok(response) => debug!(%request_id, status = %response.status(), "request settled"),
            Err(e) => debug!(%request_id, error = %e, "request failed"),
        }
        result
    }

    /// Build a [`SendOperation`] bound to this session.
    pub fn send(&self, options: SendOptions) -> SendOperation {
        SendOperation::new(self.clone(), options)
    }

    /// Build a [`FetchOperation`] bound to this session.
    pub fn fetch(&self, options: FetchOptions) -> FetchOperation {
        FetchOperation::new(self.clone(), options)
    }

    /// Build an [`InfiniteFetchOperation`] bound to this session.
    pub fn infinite_fetch(&self, options: InfiniteFetchOptions) -> InfiniteFetchOperation {
        InfiniteFetchOperation::new(self.clone(), options)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.inner.base_url)
            .field("default_options", &self.inner.default_options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    base_url: String,
    default_options: RequestOptions,
    http_config: HttpConfig,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl SessionBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn default_options(mut self, options: RequestOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Client settings for the default transport. Ignored when a custom
    /// transport is supplied.
    pub fn http_config(mut self, config: HttpConfig) -> Self {
        self.http_config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Session> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::from_config(&self.http_config)?),
        };
        Ok(Session::from_parts(
            self.base_url,
            self.default_options,
            transport,
        ))
    }
}
