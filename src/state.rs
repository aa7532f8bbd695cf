//! Observable lifecycle state.
//!
//! Each operation owns one or more [`StateCell`]s. A cell is a `tokio::sync::watch`
//! sender: writes never fail even when nobody is listening, and every write wakes
//! the receivers handed out by `subscribe`, which is what a UI layer hooks its
//! re-render on.

use tokio::sync::watch;

use crate::error::FetchError;
use crate::response::HttpResponse;

/// A single reactive value.
#[derive(Debug)]
pub struct StateCell<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> StateCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Mutate in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Mutate in place; subscribers are notified only when `f` returns true.
    pub fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// Progress flags of one operation.
///
/// The fields are independent: a first load is busy and initial at the same
/// time. `has_failed` is true exactly when `last_error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleState {
    pub is_busy: bool,
    pub is_initial_load: bool,
    pub has_failed: bool,
    pub last_error: Option<FetchError>,
}

impl LifecycleState {
    pub(crate) fn record_failure(&mut self, error: FetchError) {
        self.has_failed = true;
        self.last_error = Some(error);
    }

    pub(crate) fn record_success(&mut self) {
        self.has_failed = false;
        self.last_error = None;
    }
}

/// Pages accumulated by an infinite fetch.
#[derive(Debug, Clone)]
pub struct PageState {
    /// Starts `true`: until the first page says otherwise, assume there is more.
    pub has_next_page: bool,
    pub all_responses: Vec<HttpResponse>,
    pub last_response: Option<HttpResponse>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            has_next_page: true,
            all_responses: Vec::new(),
            last_response: None,
        }
    }
}

impl PageState {
    pub(crate) fn push(&mut self, response: HttpResponse, has_next_page: bool) {
        self.all_responses.push(response.clone());
        self.last_response = Some(response);
        self.has_next_page = has_next_page;
    }
}
