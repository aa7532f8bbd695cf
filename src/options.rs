//! Request options and their merge rules.
//!
//! [`RequestOptions`] is the per-request record (method, headers, body,
//! credentials, signal). Session defaults and per-call options are combined
//! with [`RequestOptions::merge`]; a [`RequestOptionsProvider`] lets the
//! caller compute per-call options from the defaults at call time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::signal::AbortSignal;

/// Whether credentials (cookies, HTTP auth) accompany a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    /// Strip `Cookie` and `Authorization` before the request leaves.
    Omit,
    /// Session requests always target the base URL's origin, so this behaves like `Include`.
    #[default]
    SameOrigin,
    Include,
}

/// Options for a single request.
///
/// Every field is optional so that an empty value merges as a no-op.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub credentials: Option<Credentials>,
    pub signal: Option<AbortSignal>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Add a header, replacing any value already set under the same name.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Replace the header map wholesale.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and mark it `application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Layer `overrides` on top of `self` and return the result.
    ///
    /// Headers merge key by key: a name present in `overrides` replaces all
    /// values under that name, other names from both sides are kept. Every
    /// other field is taken from `overrides` when it is set there.
    pub fn merge(&self, overrides: &RequestOptions) -> RequestOptions {
        let mut headers = self.headers.clone();
        for name in overrides.headers.keys() {
            headers.remove(name);
            for value in overrides.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        RequestOptions {
            method: overrides.method.clone().or_else(|| self.method.clone()),
            headers,
            body: overrides.body.clone().or_else(|| self.body.clone()),
            credentials: overrides.credentials.or(self.credentials),
            signal: overrides.signal.clone().or_else(|| self.signal.clone()),
        }
    }
}

type DeferredFn =
    dyn Fn(&RequestOptions) -> BoxFuture<'static, Result<RequestOptions>> + Send + Sync;

/// Per-call options, either given directly or computed from the session defaults.
#[derive(Clone)]
pub enum RequestOptionsProvider {
    Literal(RequestOptions),
    Deferred(Arc<DeferredFn>),
}

impl RequestOptionsProvider {
    /// Compute options asynchronously from the session defaults.
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(&RequestOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RequestOptions>> + Send + 'static,
    {
        Self::Deferred(Arc::new(move |defaults| Box::pin(f(defaults))))
    }

    /// Compute options synchronously from the session defaults.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RequestOptions) -> RequestOptions + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(move |defaults| {
            let options = f(defaults);
            Box::pin(async move { Ok(options) })
        }))
    }

    /// Turn the provider into plain options, invoking the deferred form if needed.
    pub async fn resolve(&self, defaults: &RequestOptions) -> Result<RequestOptions> {
        match self {
            Self::Literal(options) => Ok(options.clone()),
            Self::Deferred(f) => f(defaults).await,
        }
    }
}

impl Default for RequestOptionsProvider {
    fn default() -> Self {
        Self::Literal(RequestOptions::default())
    }
}

impl From<RequestOptions> for RequestOptionsProvider {
    fn from(options: RequestOptions) -> Self {
        Self::Literal(options)
    }
}

impl fmt::Debug for RequestOptionsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(options) => f.debug_tuple("Literal").field(options).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Fold a chain of providers into one set of options on top of `defaults`.
///
/// Each provider is resolved against `defaults` and layered over the result
/// of the previous one, so later providers win.
pub(crate) async fn resolve_chain(
    defaults: &RequestOptions,
    providers: &[&RequestOptionsProvider],
) -> Result<RequestOptions> {
    let mut merged = defaults.clone();
    for provider in providers {
        let resolved = provider.resolve(defaults).await?;
        merged = merged.merge(&resolved);
    }
    Ok(merged)
}
