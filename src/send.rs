//! Send operation: an explicitly triggered request of any method.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::callback::Callback;
use crate::error::{FetchError, Result};
use crate::options::{RequestOptionsProvider, resolve_chain};
use crate::session::Session;
use crate::signal::{AbortSignal, race};
use crate::state::{LifecycleState, StateCell};

/// How a single invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Failed,
    Aborted,
}

/// Options for [`Session::send`].
#[derive(Clone)]
pub struct SendOptions {
    pub path: String,
    pub callback: Callback<()>,
    /// Options applied to every call, beneath the per-call `init`.
    pub init: Option<RequestOptionsProvider>,
}

impl SendOptions {
    pub fn new(path: impl Into<String>, callback: Callback<()>) -> Self {
        Self {
            path: path.into(),
            callback,
            init: None,
        }
    }

    pub fn init(mut self, init: impl Into<RequestOptionsProvider>) -> Self {
        self.init = Some(init.into());
        self
    }
}

/// Handle returned by [`Session::send`].
///
/// Clones share state. Concurrent [`send`](Self::send) calls are not
/// deduplicated; `is_sending` stays true while any of them is in flight.
#[derive(Clone)]
pub struct SendOperation {
    inner: Arc<SendInner>,
}

struct SendInner {
    session: Session,
    path: Mutex<String>,
    callback: Mutex<Callback<()>>,
    init: Option<RequestOptionsProvider>,
    state: StateCell<LifecycleState>,
    in_flight: AtomicUsize,
}

impl SendOperation {
    pub(crate) fn new(session: Session, options: SendOptions) -> Self {
        Self {
            inner: Arc::new(SendInner {
                session,
                path: Mutex::new(options.path),
                callback: Mutex::new(options.callback),
                init: options.init,
                state: StateCell::new(LifecycleState::default()),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.inner.state.get().is_busy
    }

    pub fn is_error(&self) -> bool {
        self.inner.state.get().has_failed
    }

    pub fn error(&self) -> Option<FetchError> {
        self.inner.state.get().last_error
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    pub fn path(&self) -> String {
        self.inner
            .path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the path used by later calls. Nothing is re-sent.
    pub fn set_path(&self, path: impl Into<String>) {
        *self.inner.path.lock().unwrap_or_else(PoisonError::into_inner) = path.into();
    }

    /// Change the callback used by later calls. Nothing is re-sent.
    pub fn set_callback(&self, callback: Callback<()>) {
        *self
            .inner
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = callback;
    }

    /// Issue the request and hand the response to the callback.
    ///
    /// Failures end up in [`error`](Self::error) rather than being returned.
    /// If the request's own signal was aborted, the failure is discarded and
    /// only the busy flag is released.
    pub async fn send(&self, init: impl Into<RequestOptionsProvider>) {
        self.run(self.path(), init.into()).await;
    }

    pub(crate) fn cell(&self) -> &StateCell<LifecycleState> {
        &self.inner.state
    }

    pub(crate) async fn run(&self, path: String, call: RequestOptionsProvider) -> Outcome {
        let inner = &self.inner;
        inner.state.update(|s| {
            inner.in_flight.fetch_add(1, Ordering::SeqCst);
            s.is_busy = true;
        });
        debug!(path = %path, "request started");

        let callback = inner
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut signal: Option<AbortSignal> = None;
        let result: Result<()> = async {
            let providers: Vec<&RequestOptionsProvider> =
                inner.init.iter().chain(std::iter::once(&call)).collect();
            let options = resolve_chain(inner.session.default_options(), &providers).await?;
            signal = options.signal.clone();
            let response = inner.session.execute(&path, options).await?;
            race(signal.as_ref(), callback(response)).await?
        }
        .await;

        self.settle(&path, signal.as_ref(), result)
    }

    /// Record the outcome and release this invocation's hold on the busy flag.
    fn settle(&self, path: &str, signal: Option<&AbortSignal>, result: Result<()>) -> Outcome {
        let aborted = signal.is_some_and(AbortSignal::is_aborted);
        let outcome = match &result {
            _ if aborted => Outcome::Aborted,
            Err(FetchError::Aborted) => Outcome::Aborted,
            Ok(()) => Outcome::Completed,
            Err(_) => Outcome::Failed,
        };

        let inner = &self.inner;
        inner.state.update(|s| {
            match result {
                Ok(()) if outcome == Outcome::Completed => s.record_success(),
                Err(e) if outcome == Outcome::Failed => s.record_failure(e),
                _ => {}
            }
            let remaining = inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            s.is_busy = remaining > 0;
        });

        match outcome {
            Outcome::Completed => debug!(path = %path, "request completed"),
            Outcome::Failed => debug!(path = %path, "request failed"),
            Outcome::Aborted => debug!(path = %path, "request aborted, outcome discarded"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{accept_any, callback};
    use crate::options::RequestOptions;
    use crate::response::HttpResponse;
    use crate::signal::AbortController;
    use crate::test_support::ScriptedTransport;
    use reqwest::Method;

    fn session(transport: Arc<ScriptedTransport>) -> Session {
        Session::builder()
            .base_url("https://api.example.com")
            .transport(transport)
            .build()
            .unwrap()
    }

    fn status_checked() -> Callback<()> {
        callback(|response: HttpResponse| async move {
            response.error_for_status()?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn transport_failure_is_captured() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err("connection refused");
        let op = session(transport.clone()).send(SendOptions::new("/posts", accept_any()));

        op.send(RequestOptions::new().method(Method::POST).body("{}"))
            .await;

        assert!(!op.is_sending());
        assert!(op.is_error());
        assert_eq!(
            op.error(),
            Some(FetchError::Transport("connection refused".into()))
        );
        let sent = transport.requests();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].url, "https://api.example.com/posts");
    }

    #[tokio::test]
    async fn callback_error_is_captured_like_transport_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(500, "boom");
        let op = session(transport).send(SendOptions::new("/posts", status_checked()));

        op.send(RequestOptions::new().method(Method::POST)).await;

        let state = op.state();
        assert!(!state.is_busy);
        assert!(state.has_failed);
        assert_eq!(
            state.last_error.and_then(|e| e.status()),
            Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[tokio::test]
    async fn success_clears_previous_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err("reset");
        transport.push_ok(200, "{}");
        let op = session(transport).send(SendOptions::new("/posts", status_checked()));

        op.send(RequestOptions::new()).await;
        assert!(op.is_error());

        op.send(RequestOptions::new()).await;
        assert!(!op.is_error());
        assert_eq!(op.error(), None);
    }

    #[tokio::test]
    async fn aborted_send_leaves_error_state_alone() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err("earlier failure");
        transport.push_pending();
        let op = session(transport).send(SendOptions::new("/posts", accept_any()));

        op.send(RequestOptions::new()).await;
        let before = op.error();
        assert!(before.is_some());

        let controller = AbortController::new();
        let pending = op.send(RequestOptions::new().signal(controller.signal()));
        let abort = async {
            tokio::task::yield_now().await;
            assert!(op.is_sending());
            controller.abort();
        };
        tokio::join!(pending, abort);

        assert!(!op.is_sending());
        assert_eq!(op.error(), before);
    }

    #[tokio::test]
    async fn busy_until_every_concurrent_send_settles() {
        let transport = Arc::new(ScriptedTransport::new());
        let first = transport.push_gated(200, "{}");
        let second = transport.push_gated(200, "{}");
        let op = session(transport.clone()).send(SendOptions::new("/posts", accept_any()));

        let a = tokio::spawn({
            let op = op.clone();
            async move { op.send(RequestOptions::new()).await }
        });
        let b = tokio::spawn({
            let op = op.clone();
            async move { op.send(RequestOptions::new()).await }
        });
        while transport.request_count() < 2 {
            tokio::task::yield_now().await;
        }

        first.notify_one();
        a.await.unwrap();
        assert!(op.is_sending());

        second.notify_one();
        b.await.unwrap();
        assert!(!op.is_sending());
    }

    #[tokio::test]
    async fn operation_init_sits_between_defaults_and_call() {
        let transport = Arc::new(ScriptedTransport::new());
        let op = session(transport.clone()).send(
            SendOptions::new("/posts", accept_any()).init(
                RequestOptions::new()
                    .method(Method::PUT)
                    .header("x-op", "op")
                    .unwrap(),
            ),
        );

        op.send(RequestOptions::new().header("x-call", "call").unwrap())
            .await;

        let sent = transport.requests();
        assert_eq!(sent[0].method, Method::PUT);
        assert_eq!(sent[0].headers.get("x-op").unwrap(), "op");
        assert_eq!(sent[0].headers.get("x-call").unwrap(), "call");
    }

    #[tokio::test]
    async fn deferred_init_failure_is_captured() {
        let transport = Arc::new(ScriptedTransport::new());
        let op = session(transport.clone()).send(SendOptions::new("/posts", accept_any()));

        op.send(RequestOptionsProvider::deferred(|_: &RequestOptions| async {
            Err::<RequestOptions, _>(FetchError::Configuration("token unavailable".into()))
        }))
        .await;

        assert!(!op.is_sending());
        assert_eq!(
            op.error(),
            Some(FetchError::Configuration("token unavailable".into()))
        );
        assert_eq!(transport.request_count(), 0);
    }
}
