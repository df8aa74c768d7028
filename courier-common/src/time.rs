use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Source of wall-clock time for scheduling decisions
///
/// Warmup stages, sequence delays and scheduled sends are all gated on wall
/// time; workers take the clock as a dependency so tests can pin it.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
