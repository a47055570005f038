use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Cumulative byte count at the end of one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSample {
    /// Bucket start in milliseconds since the Unix epoch.
    pub bucket_start_ms: u64,
    pub cumulative_bytes: u64,
}

/// Ordered bucket → cumulative-bytes record of one stream.
///
/// Buckets appear in first-seen order and each holds the latest cumulative
/// count recorded in it. A timestamp falling before the newest bucket is
/// folded into that bucket, so exported rows are ordered by time and the
/// byte counts never decrease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteringLog {
    bucket_ms: u64,
    samples: Vec<ThroughputSample>,
}

impl MeteringLog {
    pub fn new(bucket_ms: u64) -> Self {
        Self {
            bucket_ms: bucket_ms.max(1),
            samples: Vec::new(),
        }
    }

    /// Records the cumulative count observed at `timestamp_ms`.
    pub fn record(&mut self, timestamp_ms: u64, cumulative_bytes: u64) {
        let bucket_start_ms = timestamp_ms - timestamp_ms % self.bucket_ms;
        match self.samples.last_mut() {
            Some(last) if bucket_start_ms <= last.bucket_start_ms => {
                last.cumulative_bytes = last.cumulative_bytes.max(cumulative_bytes);
            }
            _ => self.samples.push(ThroughputSample {
                bucket_start_ms,
                cumulative_bytes,
            }),
        }
    }

    pub fn samples(&self) -> &[ThroughputSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn bucket_ms(&self) -> u64 {
        self.bucket_ms
    }

    /// Cumulative count of the newest bucket.
    pub fn total_bytes(&self) -> u64 {
        self.samples.last().map_or(0, |s| s.cumulative_bytes)
    }

    /// Writes one `bucketStart<separator>cumulativeBytes` line per bucket.
    pub fn write_csv<W: Write>(&self, writer: &mut W, separator: char) -> io::Result<()> {
        for sample in &self.samples {
            writeln!(
                writer,
                "{}{}{}",
                sample.bucket_start_ms, separator, sample.cumulative_bytes
            )?;
        }
        Ok(())
    }

    /// Writes the CSV export to `path`, replacing any previous file.
    pub fn save_csv(&self, path: &Path, separator: char) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_csv(&mut writer, separator)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), rows = self.samples.len(), "metering log written");
        Ok(())
    }
}
