use std::sync::OnceLock;
use std::time::Instant;

/// Source of monotonic timestamps in nanoseconds.
pub trait Clock {
    fn now_ns(&self) -> u64;
}

/// Nanoseconds since the first reading in this process.
///
/// Never returns 0: stream records use 0 for "not started".
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        static START: OnceLock<Instant> = OnceLock::new();
        let elapsed = START.get_or_init(Instant::now).elapsed().as_nanos();
        u64::try_from(elapsed).unwrap_or(u64::MAX).max(1)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}
