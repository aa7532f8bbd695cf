//! Fetch operation: a GET that loads once on activation and can be re-issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Method;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::callback::Callback;
use crate::error::FetchError;
use crate::options::{RequestOptions, RequestOptionsProvider};
use crate::send::{Outcome, SendOperation, SendOptions};
use crate::session::Session;
use crate::signal::{AbortController, AbortSignal};
use crate::state::{LifecycleState, StateCell};

/// Options for [`Session::fetch`].
#[derive(Clone)]
pub struct FetchOptions {
    pub path: String,
    pub callback: Callback<()>,
    pub init: Option<RequestOptionsProvider>,
}

impl FetchOptions {
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

/// Handle returned by [`Session::fetch`].
///
/// The hosting UI calls [`on_activate`](Self::on_activate) when the consumer
/// mounts and [`on_deactivate`](Self::on_deactivate) when it goes away.
/// Changing the path or callback afterwards does not fetch again; only
/// [`refetch`](Self::refetch) or a new activation does.
#[derive(Clone)]
pub struct FetchOperation {
    inner: Arc<FetchInner>,
}

struct FetchInner {
    send: SendOperation,
    init: Option<RequestOptionsProvider>,
    /// Parent of every signal this operation creates; replaced on deactivation.
    lifetime: Mutex<AbortController>,
    /// Bumped by every initial load and every deactivation.
    loads: AtomicU64,
}

impl FetchOperation {
    pub(crate) fn new(session: Session, options: FetchOptions) -> Self {
        let send = SendOperation::new(session, SendOptions::new(options.path, options.callback));
        Self {
            inner: Arc::new(FetchInner {
                send,
                init: options.init,
                lifetime: Mutex::new(AbortController::new()),
                loads: AtomicU64::new(0),
            }),
        }
    }

    /// True while any request of this operation is in flight.
    pub fn is_fetching(&self) -> bool {
        self.state().is_busy
    }

    /// True only during the automatic load started by [`on_activate`](Self::on_activate).
    pub fn is_loading(&self) -> bool {
        self.state().is_initial_load
    }

    pub fn is_error(&self) -> bool {
        self.state().has_failed
    }

    pub fn error(&self) -> Option<FetchError> {
        self.state().last_error
    }

    pub fn state(&self) -> LifecycleState {
        self.cell().get()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.cell().subscribe()
    }

    pub fn path(&self) -> String {
        self.inner.send.path()
    }

    pub fn set_path(&self, path: impl Into<String>) {
        self.inner.send.set_path(path);
    }

    pub fn set_callback(&self, callback: Callback<()>) {
        self.inner.send.set_callback(callback);
    }

    /// Start the automatic first load on the current Tokio runtime.
    ///
    /// The load targets the path current at the time of the call.
    pub fn on_activate(&self) -> JoinHandle<()> {
        let path = self.path();
        let this = self.clone();
        tokio::spawn(async move {
            this.load_initial(path).await;
        })
    }

    /// Abort everything this operation started and clear the loading flag.
    ///
    /// Aborted requests leave the error state untouched. Requests issued with
    /// a caller-supplied signal are the caller's to abort.
    pub fn on_deactivate(&self) {
        {
            let mut lifetime = self
                .inner
                .lifetime
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            lifetime.abort();
            *lifetime = AbortController::new();
        }
        self.inner.loads.fetch_add(1, Ordering::SeqCst);
        self.cell().update(|s| s.is_initial_load = false);
        debug!(path = %self.path(), "fetch deactivated");
    }

    /// Issue the GET again.
    ///
    /// Without a signal, the request is tied to this operation's lifetime and
    /// aborted by [`on_deactivate`](Self::on_deactivate).
    pub async fn refetch(&self, signal: Option<AbortSignal>) {
        let signal = signal.unwrap_or_else(|| self.child_signal());
        self.issue(self.path(), signal).await;
    }

    pub(crate) fn cell(&self) -> &StateCell<LifecycleState> {
        self.inner.send.cell()
    }

    /// A fresh signal aborted together with this operation's lifetime.
    pub(crate) fn child_signal(&self) -> AbortSignal {
        let lifetime = self
            .inner
            .lifetime
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        AbortController::child_of(&lifetime.signal()).signal()
    }

    pub(crate) async fn load_initial(&self, path: String) -> Outcome {
        let generation = self.inner.loads.fetch_add(1, Ordering::SeqCst) + 1;
        let signal = self.child_signal();
        self.cell().update(|s| s.is_initial_load = true);

        let outcome = self.issue(path, signal.clone()).await;

        if !signal.is_aborted() && self.inner.loads.load(Ordering::SeqCst) == generation {
            self.cell().update(|s| s.is_initial_load = false);
        }
        outcome
    }

    /// GET `path` under `signal`, layering the operation's own options over
    /// the session defaults.
    pub(crate) async fn issue(&self, path: String, signal: AbortSignal) -> Outcome {
        let init = self.inner.init.clone();
        let provider = RequestOptionsProvider::deferred(move |defaults: &RequestOptions| {
            let defaults = defaults.clone();
            let init = init.clone();
            let signal = signal.clone();
            async move {
                let own = match &init {
                    Some(init) => init.resolve(&defaults).await?,
                    None => RequestOptions::new(),
                };
                Ok(own.method(Method::GET).signal(signal))
            }
        });
        self.inner.send.run(path, provider).await
    }
}
