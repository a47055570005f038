use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Millisecond time source for metering samples.
pub trait Clock {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Wall-clock time anchored once, then advanced by the monotonic clock.
///
/// Readings never go backwards, so bucket keys only ever grow.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor_millis: u64,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let anchor_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            anchor_millis,
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.anchor_millis + self.anchor.elapsed().as_millis() as u64
    }
}
