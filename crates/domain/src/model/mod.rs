//! Data structures shared between the delay responder and the HTTP layer.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    thread,
};

/// Column width reserved for the worker name.
pub const WORKER_WIDTH: usize = 14;
/// Column width reserved for the requested delay.
pub const REQUESTED_WIDTH: usize = 6;
/// Column width reserved for the elapsed milliseconds.
pub const ELAPSED_WIDTH: usize = 10;

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static WORKER_NAME: String = {
        let seq = NEXT_WORKER.fetch_add(1, Ordering::Relaxed);
        match thread::current().name() {
            Some(name) if !name.is_empty() => format!("{name}#{seq}"),
            _ => format!("worker#{seq}"),
        }
    };
}

/// Outcome of one completed delay: who served it, what was asked for and how
/// long the service had been up when the wait finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    pub worker: String,
    pub requested_millis: u64,
    pub elapsed_millis: u128,
}

impl TimingReport {
    /// Renders the newline-terminated line returned to callers and written to
    /// the report sink.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<worker_width$} {:<requested_width$} {:<elapsed_width$}",
            self.worker,
            self.requested_millis,
            self.elapsed_millis,
            worker_width = WORKER_WIDTH,
            requested_width = REQUESTED_WIDTH,
            elapsed_width = ELAPSED_WIDTH,
        )
    }
}

/// Identifier of the thread running the caller: the thread name (or
/// `worker`) suffixed with a process-wide sequence number assigned on first
/// use. Runtimes give every pool thread the same name, so the suffix is what
/// tells two workers apart. Stable for the lifetime of the thread.
pub fn current_worker_name() -> String {
    WORKER_NAME.with(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_pads_each_column() {
        let report = TimingReport {
            worker: "worker-1".into(),
            requested_millis: 100,
            elapsed_millis: 1234,
        };
        assert_eq!(report.to_line(), "worker-1       100    1234      \n");
    }

    #[test]
    fn overlong_fields_are_not_truncated() {
        let report = TimingReport {
            worker: "actix-rt|system:0|arbiter:3".into(),
            requested_millis: 12_345_678,
            elapsed_millis: 98_765_432_100,
        };
        let line = report.to_line();
        let fields: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(fields, ["actix-rt|system:0|arbiter:3", "12345678", "98765432100"]);
        assert!(line.ends_with('\n'));
    }

    fn name_on_thread(name: Option<&str>) -> (String, String) {
        let mut builder = thread::Builder::new();
        if let Some(name) = name {
            builder = builder.name(name.to_string());
        }
        builder
            .spawn(|| (current_worker_name(), current_worker_name()))
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn worker_name_uses_thread_name() {
        let (first, again) = name_on_thread(Some("delay-worker"));
        assert!(first.starts_with("delay-worker#"), "{first}");
        assert_eq!(first, again);
    }

    #[test]
    fn unnamed_worker_gets_generic_prefix() {
        let (name, _) = name_on_thread(None);
        assert!(name.starts_with("worker#"), "{name}");
    }

    #[test]
    fn same_named_threads_get_distinct_names() {
        let (a, _) = name_on_thread(Some("tokio-runtime-worker"));
        let (b, _) = name_on_thread(Some("tokio-runtime-worker"));
        assert!(a.starts_with("tokio-runtime-worker#"));
        assert!(b.starts_with("tokio-runtime-worker#"));
        assert_ne!(a, b);
        assert_ne!(a, current_worker_name());
    }
}
