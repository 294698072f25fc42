use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A cooperative cancellation signal shared between a controller and the loop it runs.
///
/// Cancelling is sticky: once cancelled, a token stays cancelled. Clones share the same state.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use core_warden::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.wait_timeout(Duration::from_millis(1)));
///
/// token.clone().cancel();
/// assert!(token.is_cancelled());
/// assert!(token.wait_timeout(Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    changed: Condvar,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and wakes up everyone waiting on it.
    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.changed.notify_all();
    }

    /// Whether the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Waits until the token is cancelled or the timeout elapses, whichever comes first.
    ///
    /// Returns `true` if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();

        // Timeouts too large to represent as an instant are treated as "forever".
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                self.inner
                    .changed
                    .wait_while_until(&mut cancelled, |cancelled| !*cancelled, deadline);
            }
            None => self
                .inner
                .changed
                .wait_while(&mut cancelled, |cancelled| !*cancelled),
        }

        *cancelled
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(CancellationToken: Send, Sync, Clone);

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();

        assert!(!token.is_cancelled());
        assert!(!token.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();

        clone.cancel();
        clone.cancel();

        assert!(token.is_cancelled());
        assert!(token.wait_timeout(Duration::ZERO));
    }

    #[cfg_attr(miri, ignore)] // Real-time waits are too slow under Miri.
    #[test]
    fn cancel_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();

        let started = Instant::now();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(60)));

        thread::sleep(Duration::from_millis(10));
        token.cancel();

        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn huge_timeout_returns_immediately_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        assert!(token.wait_timeout(Duration::MAX));
    }
}
