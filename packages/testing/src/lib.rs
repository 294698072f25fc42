#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing `core_warden`.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How often [`eventually()`] re-checks its condition.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

fn default_timeout() -> Duration {
    // Miri is dramatically slower for thread synchronization.
    if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    }
}

/// Runs a test on a separate thread and fails it if it does not finish in time.
///
/// Protection loops live on background threads and a broken stop path shows up as a hang, not
/// a failure. The watchdog turns such hangs into failures after 10 seconds (60 under Miri).
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test runs directly, so that mutation testing can detect hanging mutations.
///
/// # Panics
///
/// Panics if the test times out. A panic inside the test is propagated as-is.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    with_watchdog_timeout(default_timeout(), test_fn)
}

/// Like [`with_watchdog()`] but with an explicit timeout.
///
/// # Panics
///
/// Panics if the test takes longer than `timeout`. A panic inside the test is propagated as-is.
pub fn with_watchdog_timeout<F, R>(timeout: Duration, test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::Builder::new()
        .name("watched-test".to_string())
        .spawn(move || {
            // If the receiver is gone, the watchdog has already failed the test.
            drop(tx.send(test_fn()));
        })
        .expect("the test harness must be able to spawn a thread");

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread
                .join()
                .expect("test thread finished after sending its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {timeout:?}");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without a result"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

/// Polls `condition` until it returns `true` or `timeout` elapses.
///
/// Returns whether the condition was met. Use this to wait for effects of a background thread
/// without guessing at sleep durations.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use testing::eventually;
///
/// assert!(eventually(Duration::from_secs(1), || true));
/// assert!(!eventually(Duration::from_millis(20), || false));
/// ```
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now().checked_add(timeout);

    loop {
        if condition() {
            return true;
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return false;
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Collects values handed to a callback, typically from another thread.
///
/// # Example
///
/// ```rust
/// use testing::Recorder;
///
/// let recorder = Recorder::new();
/// let sink = recorder.sink();
///
/// sink(&"first");
/// sink(&"second");
///
/// assert_eq!(recorder.take(), vec!["first", "second"]);
/// assert!(recorder.is_empty());
/// ```
#[derive(Debug)]
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> Recorder<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callback that appends a clone of every value it is given.
    pub fn sink(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let values = Arc::clone(&self.values);

        move |value: &T| values.lock().push(value.clone())
    }

    /// Number of values recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Removes and returns everything recorded so far.
    #[must_use]
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.values.lock())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn watchdog_returns_result() {
        assert_eq!(with_watchdog(|| "done"), "done");
    }

    #[test]
    #[should_panic]
    fn watchdog_fails_hanging_test() {
        with_watchdog_timeout(Duration::from_millis(10), || {
            thread::sleep(Duration::from_secs(5));
        });
    }

    #[test]
    #[should_panic]
    fn watchdog_propagates_panic() {
        with_watchdog(|| panic!("inner failure"));
    }

    #[test]
    fn eventually_waits_for_condition() {
        let calls = AtomicUsize::new(0);

        assert!(eventually(Duration::from_secs(5), || {
            calls.fetch_add(1, Ordering::Relaxed) >= 3
        }));
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn recorder_collects_from_other_threads() {
        let recorder = Recorder::new();
        let sink = recorder.sink();

        thread::spawn(move || sink(&7_u32)).join().unwrap();

        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.take(), vec![7]);
    }
}
