//! Cancellation primitives
//!
//! An [`AbortController`] owns the right to cancel; the [`AbortSignal`] it
//! hands out travels with a request inside [`crate::RequestOptions`]. Both are
//! thin wrappers over a `tokio_util` cancellation token, so signals created as
//! children of an operation's lifetime are cancelled together with it.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::FetchError;

/// Owner of a cancellation token.
#[derive(Debug, Default)]
pub struct AbortController {
    token: CancellationToken,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller that is also aborted whenever `parent` is.
    pub(crate) fn child_of(parent: &AbortSignal) -> Self {
        Self {
            token: parent.token.child_token(),
        }
    }

    /// The signal observed by requests issued under this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
        }
    }

    /// Abort every request observing this controller's signal.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Read side of an [`AbortController`].
#[derive(Clone, Debug)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    /// A signal that aborts on its own once `duration` has elapsed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn timeout(duration: Duration) -> Self {
        let token = CancellationToken::new();
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(duration) => timer.cancel(),
            }
        });
        Self { token }
    }

    /// A signal that is already aborted.
    pub fn aborted() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self { token }
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is aborted.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// Drive `future` to completion unless `signal` aborts first.
///
/// An already-aborted signal wins even if `future` would be immediately ready.
pub(crate) async fn race<F: Future>(
    signal: Option<&AbortSignal>,
    future: F,
) -> Result<F::Output, FetchError> {
    let Some(signal) = signal else {
        return Ok(future.await);
    };
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(FetchError::Aborted),
        out = future => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_signal_follows_parent() {
        let parent = AbortController::new();
        let child = AbortController::child_of(&parent.signal());
        let signal = child.signal();

        assert!(!signal.is_aborted());
        parent.abort();
        assert!(signal.is_aborted());
        assert!(child.is_aborted());
    }

    #[test]
    fn aborting_child_leaves_parent_alive() {
        let parent = AbortController::new();
        let child = AbortController::child_of(&parent.signal());
        child.abort();
        assert!(!parent.signal().is_aborted());
    }

    #[tokio::test]
    async fn race_prefers_abort_over_ready_future() {
        let signal = AbortSignal::aborted();
        let out = race(Some(&signal), async { 42 }).await;
        assert_eq!(out, Err(FetchError::Aborted));

        let out = race(None, async { 42 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_signal_fires_after_duration() {
        let signal = AbortSignal::timeout(Duration::from_millis(50));
        assert!(!signal.is_aborted());

        let out = race(Some(&signal), std::future::pending::<()>()).await;
        assert_eq!(out, Err(FetchError::Aborted));
        assert!(signal.is_aborted());
    }
}
