//! Response callbacks.
//!
//! A callback receives the buffered response and decides whether the request
//! succeeded: returning `Err` is treated exactly like a transport failure.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::response::HttpResponse;

/// Caller-supplied response handler producing a `T`.
pub type Callback<T> = Arc<dyn Fn(HttpResponse) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Box an async closure into a [`Callback`].
///
/// ```rust,ignore
/// let on_page = callback(|response: HttpResponse| async move {
///     let page: Page = response.error_for_status()?.json()?;
///     Ok(page.next.is_some())
/// });
/// ```
pub fn callback<T, F, Fut>(f: F) -> Callback<T>
where
    F: Fn(HttpResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move |response| Box::pin(f(response)))
}

/// A callback that accepts any response, whatever its status.
pub fn accept_any() -> Callback<()> {
    callback(|_| async { Ok(()) })
}
