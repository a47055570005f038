//! Deterministic synthetic payloads.
//!
//! Two generators produce the bytes a benchmark uploads:
//!
//! - [`ConstantSource`] repeats `0xAA`, cheap enough that the generator never
//!   shows up in a throughput profile.
//! - [`BlockRandomSource`] emits runs of `block_size` identical bytes, each
//!   run drawn from a seeded PRNG, so two runs with the same parameters can
//!   be checked against the same checksum without shipping the payload.
//!
//! Both implement [`ByteSource`] and [`std::io::Read`]. They are single-pass:
//! reproducing a sequence means constructing a new source.

mod constant;
mod random;
mod spec;

pub use constant::{CONSTANT_BYTE, ConstantSource};
pub use random::BlockRandomSource;
pub use spec::{PayloadKind, PayloadSpec};

use std::io::Read;

/// Errors produced when constructing a payload source.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// A finite producer of bytes with a read cursor that only moves forward.
///
/// `fill` is the bulk path; the default implementation loops over
/// [`next_byte`](Self::next_byte), generators override it with run fills.
pub trait ByteSource: Read + Send {
    /// Produces the next byte, or `None` once `total_size` bytes were produced.
    fn next_byte(&mut self) -> Option<u8>;

    /// Fills as much of `buf` as the remaining size allows.
    ///
    /// Returns the number of bytes written. `0` means end-of-data only when
    /// `buf` was non-empty.
    fn fill(&mut self, buf: &mut [u8]) -> usize {
        let mut written = 0;
        for slot in buf.iter_mut() {
            match self.next_byte() {
                Some(byte) => {
                    *slot = byte;
                    written += 1;
                }
                None => break,
            }
        }
        written
    }

    /// Total number of bytes this source produces.
    fn total_size(&self) -> u64;

    /// Number of bytes produced so far.
    fn position(&self) -> u64;

    /// Bytes left before end-of-data.
    fn remaining(&self) -> u64 {
        self.total_size() - self.position()
    }
}

/// Clamps a buffer length to the bytes a source still has.
fn clamp_len(buf_len: usize, remaining: u64) -> usize {
    usize::try_from(remaining).map_or(buf_len, |r| r.min(buf_len))
}
