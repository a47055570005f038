use std::io::{self, Read};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{ByteSource, PayloadError, clamp_len};

/// Produces runs of `block_size` identical bytes, each run drawn from a
/// seeded PRNG in `[0, 255)`.
///
/// The output is a pure function of `(total_size, block_size, seed)`.
pub struct BlockRandomSource {
    rng: StdRng,
    total_size: u64,
    block_size: u64,
    /// Cursor position at which the next value is drawn.
    next_draw: u64,
    current: u8,
    position: u64,
}

impl BlockRandomSource {
    /// Creates a source, failing if `block_size` is zero.
    pub fn new(total_size: u64, block_size: u64, seed: u64) -> Result<Self, PayloadError> {
        if block_size < 1 {
            return Err(PayloadError::InvalidArgument(
                "block size must be at least one byte".into(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let current = rng.gen_range(0..255u8);
        Ok(Self {
            rng,
            total_size,
            block_size,
            next_draw: block_size,
            current,
            position: 0,
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    fn advance_block_if_due(&mut self) {
        if self.position == self.next_draw {
            self.current = self.rng.gen_range(0..255u8);
            self.next_draw += self.block_size;
        }
    }
}

impl ByteSource for BlockRandomSource {
    fn next_byte(&mut self) -> Option<u8> {
        if self.position == self.total_size {
            return None;
        }
        self.advance_block_if_due();
        self.position += 1;
        Some(self.current)
    }

    fn fill(&mut self, buf: &mut [u8]) -> usize {
        let want = clamp_len(buf.len(), self.remaining());
        let mut written = 0;
        while written < want {
            self.advance_block_if_due();
            let left_in_block = self.next_draw - self.position;
            let run = left_in_block.min((want - written) as u64) as usize;
            buf[written..written + run].fill(self.current);
            written += run;
            self.position += run as u64;
        }
        written
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn position(&self) -> u64 {
        self.position
    }
}

impl Read for BlockRandomSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.fill(buf))
    }
}

impl std::fmt::Debug for BlockRandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRandomSource")
            .field("total_size", &self.total_size)
            .field("block_size", &self.block_size)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
