#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in the recycling pool packages.

use std::any::type_name;
use std::fmt;
use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// How long a probe should be given before concluding that its operation is blocked.
///
/// Long enough that a non-blocking operation finishes even on a loaded CI machine, short
/// enough that tests asserting "this blocks" stay fast.
pub const BLOCKING_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Runs a test with a timeout to prevent infinite hangs.
///
/// Pool tests deliberately park threads on condition variables, so a bookkeeping bug shows up
/// as a hang rather than as a failed assertion. This wraps the test so such a bug fails the
/// test instead of stalling the whole run.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under Miri, where thread
/// synchronization primitives are significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled
/// and the test function is executed directly. This allows mutation testing to properly
/// detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode). A panic inside
/// the test is propagated unchanged.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let mut probe = Probe::spawn(test_fn);

    assert!(
        probe.finished_within(timeout),
        "test exceeded the {}-second watchdog timeout",
        timeout.as_secs()
    );

    probe.join()
}

/// Runs an operation that may block on a background thread and reports whether it finished.
///
/// Used to assert that a pool operation blocks (it has not finished after a grace period)
/// or does not block (it finishes promptly), and to let the test unblock it later and
/// collect its result.
///
/// # Example
///
/// ```rust
/// use std::sync::mpsc;
///
/// use testing::{BLOCKING_GRACE_PERIOD, Probe};
///
/// let (tx, rx) = mpsc::channel::<u32>();
///
/// let mut probe = Probe::spawn(move || rx.recv().unwrap());
/// assert!(!probe.finished_within(BLOCKING_GRACE_PERIOD));
///
/// tx.send(5).unwrap();
/// assert_eq!(probe.join(), 5);
/// ```
pub struct Probe<R> {
    completed: mpsc::Receiver<R>,
    worker: Option<thread::JoinHandle<()>>,
    result: Option<R>,
}

impl<R> Probe<R>
where
    R: Send + 'static,
{
    /// Starts `operation` on a new thread.
    #[must_use]
    pub fn spawn<F>(operation: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            // If the receiver is gone, nobody is interested in the result anymore.
            drop(tx.send(operation()));
        });

        Self {
            completed: rx,
            worker: Some(worker),
            result: None,
        }
    }

    /// Waits up to `timeout` for the operation to finish and returns whether it did.
    ///
    /// # Panics
    ///
    /// Re-raises the operation's panic if it panicked.
    pub fn finished_within(&mut self, timeout: Duration) -> bool {
        if self.result.is_some() {
            return true;
        }

        match self.completed.recv_timeout(timeout) {
            Ok(result) => {
                self.result = Some(result);
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => false,
            Err(mpsc::RecvTimeoutError::Disconnected) => self.propagate_panic(),
        }
    }

    /// Waits for the operation to finish, however long it takes, and returns its result.
    ///
    /// # Panics
    ///
    /// Re-raises the operation's panic if it panicked.
    pub fn join(mut self) -> R {
        let result = match self.result.take() {
            Some(result) => result,
            None => match self.completed.recv() {
                Ok(result) => result,
                Err(mpsc::RecvError) => self.propagate_panic(),
            },
        };

        if let Some(worker) = self.worker.take() {
            worker.join().expect("probe thread panicked after reporting its result");
        }

        result
    }

    fn propagate_panic(&mut self) -> ! {
        let worker = self
            .worker
            .take()
            .expect("the probe thread is only joined once");

        match worker.join() {
            Ok(()) => panic!("probe thread exited without reporting a result"),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<R> fmt::Debug for Probe<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("result_type", &format_args!("{}", type_name::<R>()))
            .field("finished", &self.result.is_some())
            .finish_non_exhaustive()
    }
}
