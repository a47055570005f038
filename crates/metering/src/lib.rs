//! Throughput metering for byte streams.
//!
//! [`Metered`] wraps a reader or writer (sync or tokio) and records how many
//! bytes had crossed it by the end of each time bucket. The resulting
//! [`MeteringLog`] is exported as `bucketStart cumulativeBytes` rows, one per
//! bucket that saw traffic.
//!
//! A single bucket width, [`MeteringConfig::bucket`], applies to every read and
//! write path.

mod clock;
mod samples;
mod metered;

pub use clock::{Clock, SystemClock};
pub use samples::{MeteringLog, ThroughputSample};
pub use metered::Metered;

use std::time::Duration;

/// Default bucket width (10 ms).
pub const DEFAULT_BUCKET: Duration = Duration::from_millis(10);

/// Metering parameters shared by read-side and write-side wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeteringConfig {
    /// Width of one time bucket. Sub-millisecond widths are rounded up to 1 ms.
    pub bucket: Duration,
}

impl MeteringConfig {
    pub fn with_bucket(bucket: Duration) -> Self {
        Self { bucket }
    }

    /// Bucket width in whole milliseconds, at least 1.
    pub fn bucket_millis(&self) -> u64 {
        (self.bucket.as_millis() as u64).max(1)
    }
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bucket_is_ten_millis() {
        assert_eq!(MeteringConfig::default().bucket_millis(), 10);
    }

    #[test]
    fn sub_millisecond_bucket_rounds_up() {
        let config = MeteringConfig::with_bucket(Duration::from_micros(10));
        assert_eq!(config.bucket_millis(), 1);
    }
}
