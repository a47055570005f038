use std::io::{self, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{Clock, MeteringConfig, MeteringLog, SystemClock};

/// A reader or writer that logs cumulative throughput per time bucket.
///
/// Each successful transfer of `n > 0` bytes adds `n` to the running total
/// and records it under the midpoint of the call's start and end times.
/// Errors and zero-byte transfers leave the log untouched.
#[derive(Debug)]
pub struct Metered<S, C: Clock = SystemClock> {
    inner: S,
    log: MeteringLog,
    bytes: u64,
    clock: C,
}

impl<S> Metered<S, SystemClock> {
    pub fn new(inner: S, config: MeteringConfig) -> Self {
        Self::with_clock(inner, config, SystemClock::new())
    }
}

impl<S, C: Clock> Metered<S, C> {
    pub fn with_clock(inner: S, config: MeteringConfig, clock: C) -> Self {
        Self {
            inner,
            log: MeteringLog::new(config.bucket_millis()),
            bytes: 0,
            clock,
        }
    }

    /// Total bytes transferred so far.
    pub fn byte_count(&self) -> u64 {
        self.bytes
    }

    pub fn log(&self) -> &MeteringLog {
        &self.log
    }

    pub fn into_log(self) -> MeteringLog {
        self.log
    }

    pub fn into_parts(self) -> (S, MeteringLog) {
        (self.inner, self.log)
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    fn record(&mut self, started_ms: u64, n: usize) {
        if n == 0 {
            return;
        }
        let ended_ms = self.clock.now_millis();
        let midpoint = started_ms + ended_ms.saturating_sub(started_ms) / 2;
        self.bytes += n as u64;
        self.log.record(midpoint, self.bytes);
    }
}

impl<R: Read, C: Clock> Read for Metered<R, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let started = self.clock.now_millis();
        let n = self.inner.read(buf)?;
        self.record(started, n);
        Ok(n)
    }
}

impl<W: Write, C: Clock> Write for Metered<W, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let started = self.clock.now_millis();
        let n = self.inner.write(buf)?;
        self.record(started, n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<R: AsyncRead + Unpin, C: Clock + Unpin> AsyncRead for Metered<R, C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let started = this.clock.now_millis();
        let before = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = result {
            let n = buf.filled().len() - before;
            this.record(started, n);
        }
        result
    }
}

impl<W: AsyncWrite + Unpin, C: Clock + Unpin> AsyncWrite for Metered<W, C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let started = this.clock.now_millis();
        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = result {
            this.record(started, n);
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    /// Clock that advances by a fixed step on every reading.
    #[derive(Clone)]
    struct SteppingClock {
        now: Rc<Cell<u64>>,
        step: u64,
    }

    impl SteppingClock {
        fn new(start: u64, step: u64) -> Self {
            Self {
                now: Rc::new(Cell::new(start)),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now_millis(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now + self.step);
            now
        }
    }

    fn config(bucket_ms: u64) -> MeteringConfig {
        MeteringConfig::with_bucket(std::time::Duration::from_millis(bucket_ms))
    }

    #[test]
    fn midpoint_of_call_is_used() {
        // Each read takes two readings: start=1000, end=1008 -> midpoint 1004.
        let data = [1u8; 4];
        let mut metered = Metered::with_clock(&data[..], config(10), SteppingClock::new(1_000, 8));
        let mut buf = [0u8; 4];
        metered.read_exact(&mut buf).unwrap();

        let samples = metered.log().samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].bucket_start_ms, 1_000);
        assert_eq!(samples[0].cumulative_bytes, 4);
    }

    #[test]
    fn cumulative_counts_across_buckets() {
        let data = vec![7u8; 100];
        let mut metered = Metered::with_clock(&data[..], config(10), SteppingClock::new(0, 10));
        let mut buf = [0u8; 10];
        for _ in 0..10 {
            metered.read_exact(&mut buf).unwrap();
        }

        let samples = metered.log().samples();
        assert!(samples.len() > 1);
        assert_eq!(metered.byte_count(), 100);
        assert_eq!(metered.log().total_bytes(), 100);
        for pair in samples.windows(2) {
            assert!(pair[0].bucket_start_ms < pair[1].bucket_start_ms);
            assert!(pair[0].cumulative_bytes <= pair[1].cumulative_bytes);
        }
    }

    #[test]
    fn empty_stream_records_nothing() {
        let mut metered = Metered::new(io::empty(), MeteringConfig::default());
        io::copy(&mut metered, &mut io::sink()).unwrap();
        assert!(metered.log().is_empty());
        assert_eq!(metered.byte_count(), 0);
    }

    #[test]
    fn errors_are_not_recorded() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("boom"))
            }
        }

        let mut metered = Metered::new(Failing, MeteringConfig::default());
        let mut buf = [0u8; 8];
        assert!(metered.read(&mut buf).is_err());
        assert!(metered.log().is_empty());
    }

    #[test]
    fn write_side_meters_written_bytes() {
        let mut metered = Metered::with_clock(Vec::new(), config(10), SteppingClock::new(500, 1));
        metered.write_all(&[0u8; 64]).unwrap();
        metered.write_all(&[0u8; 64]).unwrap();
        let (inner, log) = metered.into_parts();
        assert_eq!(inner.len(), 128);
        assert_eq!(log.total_bytes(), 128);
    }
}
