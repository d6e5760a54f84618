use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    model::{current_worker_name, TimingReport},
    services::{
        clock::ServiceClock,
        interrupt::{InterruptSignal, WaitInterrupted},
        sink::ReportSink,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelayError {
    #[error("delay of {requested_millis}ms was interrupted")]
    WaitInterrupted {
        requested_millis: u64,
        #[source]
        source: WaitInterrupted,
    },
}

/// Blocks the calling worker for the requested delay and reports who served
/// the request and how long the service has been up.
#[derive(Clone)]
pub struct DelayResponder {
    clock: ServiceClock,
    interrupt: InterruptSignal,
    sink: Arc<dyn ReportSink>,
}

impl DelayResponder {
    pub fn new(clock: ServiceClock, interrupt: InterruptSignal, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            clock,
            interrupt,
            sink,
        }
    }

    pub fn clock(&self) -> &ServiceClock {
        &self.clock
    }

    pub fn interrupt_signal(&self) -> &InterruptSignal {
        &self.interrupt
    }

    /// Blocks the current thread for `requested_millis`, then emits and
    /// returns the timing line. Nothing is emitted when the wait is
    /// interrupted.
    pub fn handle_delay(&self, requested_millis: u64) -> Result<TimingReport, DelayError> {
        self.interrupt
            .wait_for(Duration::from_millis(requested_millis))
            .map_err(|source| {
                warn!(requested_millis, "delay interrupted before completion");
                DelayError::WaitInterrupted {
                    requested_millis,
                    source,
                }
            })?;

        let report = TimingReport {
            worker: current_worker_name(),
            requested_millis,
            elapsed_millis: self.clock.elapsed_millis(),
        };
        self.sink.emit(&report.to_line());
        debug!(
            worker = %report.worker,
            requested_millis,
            elapsed_millis = %report.elapsed_millis,
            "delay completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sink::MemorySink;
    use std::{
        thread,
        time::{Duration, Instant},
    };

    fn responder(interrupt: InterruptSignal) -> (DelayResponder, MemorySink) {
        let sink = MemorySink::new();
        let responder = DelayResponder::new(ServiceClock::start(), interrupt, Arc::new(sink.clone()));
        (responder, sink)
    }

    #[test]
    fn blocks_for_at_least_the_requested_delay() {
        let (responder, sink) = responder(InterruptSignal::new());
        let started = Instant::now();

        let report = responder.handle_delay(100).expect("delay completes");

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(report.requested_millis, 100);
        assert!(report.elapsed_millis >= 100);
        assert!(!report.worker.is_empty());
        assert_eq!(sink.lines(), vec![report.to_line()]);
    }

    #[test]
    fn zero_delay_reports_immediately() {
        let (responder, sink) = responder(InterruptSignal::new());
        let started = Instant::now();

        let report = responder.handle_delay(0).expect("delay completes");

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.requested_millis, 0);
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn reports_the_serving_thread() {
        let (responder, _sink) = responder(InterruptSignal::new());
        let report = thread::Builder::new()
            .name("delay-pool-7".into())
            .spawn(move || responder.handle_delay(1))
            .unwrap()
            .join()
            .unwrap()
            .expect("delay completes");
        assert!(report.worker.starts_with("delay-pool-7#"), "{}", report.worker);
    }

    #[test]
    fn interrupted_wait_fails_without_emitting() {
        let interrupt = InterruptSignal::new();
        let (responder, sink) = responder(interrupt.clone());
        let worker = responder.clone();
        let handle = thread::spawn(move || worker.handle_delay(30_000));

        thread::sleep(Duration::from_millis(50));
        interrupt.interrupt();

        let err = handle.join().unwrap().unwrap_err();
        assert_eq!(
            err,
            DelayError::WaitInterrupted {
                requested_millis: 30_000,
                source: WaitInterrupted,
            }
        );
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn elapsed_time_counts_from_service_start() {
        let (responder, _sink) = responder(InterruptSignal::new());
        thread::sleep(Duration::from_millis(30));
        let report = responder.handle_delay(0).expect("delay completes");
        assert!(report.elapsed_millis >= 30);
    }
}
