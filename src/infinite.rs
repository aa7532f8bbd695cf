//! Infinite fetch: paginated accumulation driven by path changes.
//!
//! Each page is an ordinary fetch. The caller's callback inspects the page
//! and answers whether another one exists; the caller then advances by
//! changing the path (typically a page number embedded in it). A page is only
//! requested while `has_next_page` holds and no other page is in flight. A
//! path change that arrives mid-flight is remembered and fetched once the
//! in-flight page completes.
//!
//! Every activation is a fresh mount: accumulated pages are dropped and the
//! first page is loaded again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::callback::{Callback, callback};
use crate::error::FetchError;
use crate::fetch::{FetchOperation, FetchOptions};
use crate::options::RequestOptionsProvider;
use crate::response::HttpResponse;
use crate::send::Outcome;
use crate::session::Session;
use crate::state::{LifecycleState, PageState, StateCell};

/// Options for [`Session::infinite_fetch`].
#[derive(Clone)]
pub struct InfiniteFetchOptions {
    pub path: String,
    /// Returns whether another page exists after this one.
    pub callback: Callback<bool>,
    pub init: Option<RequestOptionsProvider>,
}

impl InfiniteFetchOptions {
    pub fn new(path: impl Into<String>, callback: Callback<bool>) -> Self {
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

/// Combined snapshot of an infinite fetch.
#[derive(Debug, Clone)]
pub struct InfiniteFetchState {
    pub all_responses: Vec<HttpResponse>,
    pub last_response: Option<HttpResponse>,
    pub has_next_page: bool,
    pub is_fetching: bool,
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<FetchError>,
}

/// Handle returned by [`Session::infinite_fetch`].
#[derive(Clone)]
pub struct InfiniteFetchOperation {
    inner: Arc<InfiniteInner>,
}

struct InfiniteInner {
    fetch: FetchOperation,
    pages: Arc<StateCell<PageState>>,
    /// Path of the most recently issued page.
    last_requested: Mutex<Option<String>>,
    /// Bumped on every activation, deactivation and reset. Pages are only
    /// appended by callbacks that started in the current epoch.
    epoch: Arc<AtomicU64>,
    active: AtomicBool,
    /// Held by whichever task is currently issuing pages.
    paging: AtomicBool,
}

/// Append successful pages and record the callback's verdict.
///
/// A page whose callback started before the latest activation, deactivation
/// or reset is dropped. The epoch is re-checked under the page lock, which is
/// also where activation and reset clear the pages.
fn page_callback(
    pages: Arc<StateCell<PageState>>,
    epoch: Arc<AtomicU64>,
    user: Callback<bool>,
) -> Callback<()> {
    callback(move |response: HttpResponse| {
        let pages = pages.clone();
        let epoch = epoch.clone();
        let user = user.clone();
        async move {
            let started = epoch.load(Ordering::SeqCst);
            let has_next_page = user(response.clone()).await?;
            let appended = pages.update_if(|p| {
                if epoch.load(Ordering::SeqCst) != started {
                    return false;
                }
                p.push(response, has_next_page);
                true
            });
            if !appended {
                debug!("page superseded, not appended");
            }
            Ok(())
        }
    })
}

impl InfiniteFetchOperation {
    pub(crate) fn new(session: Session, options: InfiniteFetchOptions) -> Self {
        let pages = Arc::new(StateCell::new(PageState::default()));
        let epoch = Arc::new(AtomicU64::new(0));
        let mut fetch_options = FetchOptions::new(
            options.path,
            page_callback(pages.clone(), epoch.clone(), options.callback),
        );
        fetch_options.init = options.init;

        Self {
            inner: Arc::new(InfiniteInner {
                fetch: session.fetch(fetch_options),
                pages,
                last_requested: Mutex::new(None),
                epoch,
                active: AtomicBool::new(false),
                paging: AtomicBool::new(false),
            }),
        }
    }

    pub fn all_responses(&self) -> Vec<HttpResponse> {
        self.inner.pages.get().all_responses
    }

    pub fn last_response(&self) -> Option<HttpResponse> {
        self.inner.pages.get().last_response
    }

    pub fn has_next_page(&self) -> bool {
        self.inner.pages.get().has_next_page
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.fetch.is_fetching()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.fetch.is_loading()
    }

    pub fn is_error(&self) -> bool {
        self.inner.fetch.is_error()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.inner.fetch.error()
    }

    pub fn path(&self) -> String {
        self.inner.fetch.path()
    }

    pub fn snapshot(&self) -> InfiniteFetchState {
        let pages = self.inner.pages.get();
        let lifecycle = self.inner.fetch.state();
        InfiniteFetchState {
            all_responses: pages.all_responses,
            last_response: pages.last_response,
            has_next_page: pages.has_next_page,
            is_fetching: lifecycle.is_busy,
            is_loading: lifecycle.is_initial_load,
            is_error: lifecycle.has_failed,
            error: lifecycle.last_error,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.fetch.subscribe()
    }

    pub fn subscribe_pages(&self) -> watch::Receiver<PageState> {
        self.inner.pages.subscribe()
    }

    /// Replace the page callback. Pages already accumulated are kept.
    pub fn set_callback(&self, callback: Callback<bool>) {
        self.inner.fetch.set_callback(page_callback(
            self.inner.pages.clone(),
            self.inner.epoch.clone(),
            callback,
        ));
    }

    /// Start from empty pages and load the first one, then any page whose
    /// path change arrived meanwhile.
    ///
    /// The first page is the path current at the time of the call.
    pub fn on_activate(&self) -> JoinHandle<()> {
        let path = self.path();
        let epoch = self.clear_pages();
        self.remember(&path);
        self.inner.active.store(true, Ordering::SeqCst);
        self.inner.paging.store(true, Ordering::SeqCst);

        let this = self.clone();
        tokio::spawn(async move {
            if this.inner.fetch.load_initial(path).await == Outcome::Completed {
                this.drain(epoch).await;
            } else {
                this.release(epoch);
            }
        })
    }

    /// Abort the in-flight page, if any, and stop reacting to path changes.
    pub fn on_deactivate(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.active.store(false, Ordering::SeqCst);
        self.inner.paging.store(false, Ordering::SeqCst);
        self.inner.fetch.on_deactivate();
    }

    /// Record a new path and, when allowed, request the page behind it.
    ///
    /// Returns the spawned task when a request was started. Nothing is
    /// requested if the path is unchanged, the operation is inactive, or the
    /// last page said there is no next one. If a page is in flight the path
    /// is picked up once it completes.
    pub fn on_path_changed(&self, path: impl Into<String>) -> Option<JoinHandle<()>> {
        let path = path.into();
        if path == self.path() {
            return None;
        }
        self.inner.fetch.set_path(path.clone());

        if !self.inner.active.load(Ordering::SeqCst) {
            return None;
        }
        if !self.has_next_page() {
            debug!(path = %path, "no further pages, ignoring path change");
            return None;
        }
        if self.inner.paging.swap(true, Ordering::SeqCst) {
            debug!(path = %path, "page in flight, deferring path change");
            return None;
        }

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let this = self.clone();
        Some(tokio::spawn(async move { this.drain(epoch).await }))
    }

    /// Drop every page and return to the initial state.
    ///
    /// In-flight work is aborted; call [`on_activate`](Self::on_activate)
    /// again to load the first page.
    pub fn reset(&self) {
        self.on_deactivate();
        self.clear_pages();
        *self
            .inner
            .last_requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Empty the page list and open a new epoch, atomically with respect to
    /// page appends.
    fn clear_pages(&self) -> u64 {
        let mut epoch = 0;
        self.inner.pages.update(|p| {
            epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *p = PageState::default();
        });
        epoch
    }

    fn remember(&self, path: &str) {
        *self
            .inner
            .last_requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.to_string());
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
    }

    /// The path to request next, if a page is owed.
    fn next_pending(&self, epoch: u64) -> Option<String> {
        if !self.is_current(epoch) || !self.has_next_page() {
            return None;
        }
        let path = self.path();
        let last = self
            .inner
            .last_requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (last.as_deref() != Some(path.as_str())).then_some(path)
    }

    /// Give up the paging claim, unless a newer activation owns it.
    fn release(&self, epoch: u64) -> bool {
        if !self.is_current(epoch) {
            return false;
        }
        self.inner.paging.store(false, Ordering::SeqCst);
        true
    }

    /// Issue pages until none is owed, then release the paging claim.
    ///
    /// Stops at the first page that does not complete; a path change that was
    /// deferred behind it waits for the next path change.
    async fn drain(&self, epoch: u64) {
        loop {
            while let Some(path) = self.next_pending(epoch) {
                self.remember(&path);
                let signal = self.inner.fetch.child_signal();
                if self.inner.fetch.issue(path, signal).await != Outcome::Completed {
                    self.release(epoch);
                    return;
                }
            }
            if !self.release(epoch) {
                return;
            }
            // A path change may have been deferred right before the claim was released.
            if self.next_pending(epoch).is_none() || self.inner.paging.swap(true, Ordering::SeqCst) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn session(transport: Arc<ScriptedTransport>) -> Session {
        Session::builder()
            .base_url("https://api.example.com")
            .transport(transport)
            .build()
            .unwrap()
    }

    /// Reads `{"next": bool}` from each page.
    fn next_flag() -> Callback<bool> {
        callback(|response: HttpResponse| async move {
            let body: serde_json::Value = response.error_for_status()?.json()?;
            Ok(body["next"].as_bool().unwrap_or(false))
        })
    }

    fn page(n: u32) -> String {
        format!("/posts?page={n}")
    }

    #[tokio::test]
    async fn pages_accumulate_until_callback_says_stop() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":true}"#);
        transport.push_ok(200, r#"{"next":true}"#);
        transport.push_ok(200, r#"{"next":false}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        assert!(op.has_next_page());
        let mut observed = Vec::new();

        op.on_activate().await.unwrap();
        observed.push(op.has_next_page());
        for n in 2..=3 {
            op.on_path_changed(page(n)).unwrap().await.unwrap();
            observed.push(op.has_next_page());
        }

        assert_eq!(observed, vec![true, true, false]);
        let urls: Vec<String> = op
            .all_responses()
            .iter()
            .map(|r| r.url().to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://api.example.com/posts?page=1",
                "https://api.example.com/posts?page=2",
                "https://api.example.com/posts?page=3",
            ]
        );
        assert_eq!(
            op.last_response().map(|r| r.url().to_string()),
            Some("https://api.example.com/posts?page=3".to_string())
        );
    }

    #[tokio::test]
    async fn terminal_state_is_sticky() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":false}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        op.on_activate().await.unwrap();
        assert!(!op.has_next_page());

        assert!(op.on_path_changed(page(2)).is_none());
        assert!(op.on_path_changed(page(3)).is_none());
        tokio::task::yield_now().await;

        assert_eq!(transport.request_count(), 1);
        assert_eq!(op.all_responses().len(), 1);
    }

    #[tokio::test]
    async fn unchanged_path_requests_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":true}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        op.on_activate().await.unwrap();
        assert!(op.on_path_changed(page(1)).is_none());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn failed_page_keeps_earlier_pages_and_next_flag() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":true}"#);
        transport.push_ok(500, "oops");
        transport.push_ok(200, r#"{"next":false}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        op.on_activate().await.unwrap();
        op.on_path_changed(page(2)).unwrap().await.unwrap();

        let snapshot = op.snapshot();
        assert!(snapshot.is_error);
        assert!(snapshot.has_next_page);
        assert_eq!(snapshot.all_responses.len(), 1);
        assert!(!snapshot.is_fetching);

        // The next path change tries again and clears the error.
        op.on_path_changed(page(3)).unwrap().await.unwrap();
        let snapshot = op.snapshot();
        assert!(!snapshot.is_error);
        assert!(!snapshot.has_next_page);
        assert_eq!(snapshot.all_responses.len(), 2);
    }

    #[tokio::test]
    async fn path_change_during_flight_is_fetched_afterwards() {
        let transport = Arc::new(ScriptedTransport::new());
        let first = transport.push_gated(200, r#"{"next":true}"#);
        transport.push_ok(200, r#"{"next":true}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        let activation = op.on_activate();
        while transport.request_count() < 1 {
            tokio::task::yield_now().await;
        }
        assert!(op.is_loading());

        assert!(op.on_path_changed(page(2)).is_none());
        assert!(op.on_path_changed(page(3)).is_none());
        first.notify_one();
        activation.await.unwrap();

        // Only the latest pending path is requested.
        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.example.com/posts?page=1",
                "https://api.example.com/posts?page=3",
            ]
        );
        assert_eq!(op.all_responses().len(), 2);
        assert!(!op.is_fetching());
    }

    #[tokio::test]
    async fn failed_page_does_not_chase_deferred_path() {
        let transport = Arc::new(ScriptedTransport::new());
        let first = transport.push_gated(500, "down");
        transport.push_ok(200, r#"{"next":true}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        let activation = op.on_activate();
        while transport.request_count() < 1 {
            tokio::task::yield_now().await;
        }
        assert!(op.on_path_changed(page(2)).is_none());
        first.notify_one();
        activation.await.unwrap();

        assert_eq!(transport.request_count(), 1);
        assert!(op.is_error());
        assert!(op.all_responses().is_empty());

        op.on_path_changed(page(3)).unwrap().await.unwrap();
        assert_eq!(transport.request_count(), 2);
        assert!(!op.is_error());
    }

    #[tokio::test]
    async fn deactivation_aborts_page_without_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":true}"#);
        transport.push_pending();
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        op.on_activate().await.unwrap();
        let task = op.on_path_changed(page(2)).unwrap();
        while transport.request_count() < 2 {
            tokio::task::yield_now().await;
        }
        op.on_deactivate();
        task.await.unwrap();

        let snapshot = op.snapshot();
        assert!(!snapshot.is_error);
        assert!(!snapshot.is_fetching);
        assert_eq!(snapshot.all_responses.len(), 1);

        // Inactive operations only track the path.
        assert!(op.on_path_changed(page(3)).is_none());
        assert_eq!(op.path(), page(3));
    }

    #[tokio::test]
    async fn reset_allows_paging_again() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":false}"#);
        transport.push_ok(200, r#"{"next":true}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        op.on_activate().await.unwrap();
        assert!(!op.has_next_page());

        op.reset();
        assert!(op.has_next_page());
        assert!(op.all_responses().is_empty());

        op.on_activate().await.unwrap();
        assert!(op.has_next_page());
        assert_eq!(op.all_responses().len(), 1);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn path_change_right_after_activation_follows_first_page() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":true}"#);
        transport.push_ok(200, r#"{"next":true}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        let activation = op.on_activate();
        assert!(op.on_path_changed(page(2)).is_none());
        activation.await.unwrap();

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.example.com/posts?page=1",
                "https://api.example.com/posts?page=2",
            ]
        );
        assert_eq!(op.all_responses().len(), 2);
    }

    #[tokio::test]
    async fn reactivation_starts_from_fresh_pages() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":false}"#);
        transport.push_ok(200, r#"{"next":true}"#);
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), next_flag()));

        op.on_activate().await.unwrap();
        assert!(!op.has_next_page());
        assert_eq!(op.all_responses().len(), 1);

        // Still terminal while unmounted.
        op.on_deactivate();
        assert!(!op.has_next_page());
        assert_eq!(op.all_responses().len(), 1);

        op.on_activate().await.unwrap();
        assert_eq!(transport.request_count(), 2);
        assert_eq!(op.all_responses().len(), 1);
        assert!(op.has_next_page());
    }

    #[tokio::test]
    async fn superseded_page_is_not_appended() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, r#"{"next":true}"#);
        transport.push_ok(200, r#"{"next":false}"#);

        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let held_first = callback({
            let entered = entered.clone();
            let gate = gate.clone();
            let calls = calls.clone();
            move |response: HttpResponse| {
                let entered = entered.clone();
                let gate = gate.clone();
                let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        entered.notify_one();
                        gate.notified().await;
                    }
                    let body: serde_json::Value = response.json()?;
                    Ok(body["next"].as_bool().unwrap_or(false))
                }
            }
        });
        let op = session(transport.clone())
            .infinite_fetch(InfiniteFetchOptions::new(page(1), held_first));

        let stale = op.on_activate();
        entered.notified().await;
        op.on_activate().await.unwrap();
        assert_eq!(op.all_responses().len(), 1);
        assert!(!op.has_next_page());

        gate.notify_one();
        stale.await.unwrap();

        assert_eq!(transport.request_count(), 2);
        assert_eq!(op.all_responses().len(), 1);
        assert!(!op.has_next_page());
    }
}
