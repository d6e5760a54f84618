use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::Duration,
};

use thiserror::Error;

/// Raised when a wait is cut short by [`InterruptSignal::interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait interrupted")]
pub struct WaitInterrupted;

/// Process-wide cancellation flag for blocked workers. Once raised it stays
/// raised; every current and future wait fails immediately.
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    inner: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    interrupted: Mutex<bool>,
    wakeup: Condvar,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes every blocked waiter.
    pub fn interrupt(&self) {
        let mut interrupted = self
            .inner
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *interrupted = true;
        drop(interrupted);
        self.inner.wakeup.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        *self
            .inner
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks the calling thread for at least `duration`, or until the flag
    /// is raised.
    pub fn wait_for(&self, duration: Duration) -> Result<(), WaitInterrupted> {
        let interrupted = self
            .inner
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (interrupted, _timeout) = self
            .inner
            .wakeup
            .wait_timeout_while(interrupted, duration, |interrupted| !*interrupted)
            .unwrap_or_else(PoisonError::into_inner);

        if *interrupted {
            Err(WaitInterrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        thread,
        time::{Duration, Instant},
    };

    #[test]
    fn waits_at_least_the_requested_duration() {
        let signal = InterruptSignal::new();
        let started = Instant::now();
        signal.wait_for(Duration::from_millis(50)).expect("not interrupted");
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn zero_wait_returns_immediately() {
        let signal = InterruptSignal::new();
        assert_eq!(signal.wait_for(Duration::ZERO), Ok(()));
    }

    #[test]
    fn interrupt_wakes_blocked_waiter() {
        let signal = InterruptSignal::new();
        let waiter = signal.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || waiter.wait_for(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(50));
        signal.interrupt();

        assert_eq!(handle.join().unwrap(), Err(WaitInterrupted));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn raised_flag_fails_new_waits() {
        let signal = InterruptSignal::new();
        signal.interrupt();
        signal.interrupt();
        assert!(signal.is_interrupted());
        assert_eq!(signal.wait_for(Duration::ZERO), Err(WaitInterrupted));
        assert_eq!(
            signal.wait_for(Duration::from_secs(30)),
            Err(WaitInterrupted)
        );
    }
}
