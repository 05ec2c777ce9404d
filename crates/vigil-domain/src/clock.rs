use chrono::{DateTime, Utc};

/// Injectable time source.
///
/// Lease expiry and firing arithmetic go through this seam so timer-driven
/// behavior stays testable under a paused runtime clock.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
