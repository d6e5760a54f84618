use std::time::Instant;

use chrono::{DateTime, Utc};

/// Start-of-service timestamp, captured once during bootstrap and handed to
/// whoever needs elapsed time. Never mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ServiceClock {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl ServiceClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Whole milliseconds since [`ServiceClock::start`], on the monotonic clock.
    pub fn elapsed_millis(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
