use std::io::{self, Read};

use crate::{ByteSource, clamp_len};

/// The byte value every [`ConstantSource`] produces.
pub const CONSTANT_BYTE: u8 = 0xAA;

/// Produces `total_size` copies of [`CONSTANT_BYTE`].
#[derive(Debug, Clone)]
pub struct ConstantSource {
    total_size: u64,
    position: u64,
}

impl ConstantSource {
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            position: 0,
        }
    }
}

impl ByteSource for ConstantSource {
    fn next_byte(&mut self) -> Option<u8> {
        if self.position == self.total_size {
            return None;
        }
        self.position += 1;
        Some(CONSTANT_BYTE)
    }

    fn fill(&mut self, buf: &mut [u8]) -> usize {
        let n = clamp_len(buf.len(), self.remaining());
        buf[..n].fill(CONSTANT_BYTE);
        self.position += n as u64;
        n
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn position(&self) -> u64 {
        self.position
    }
}

impl Read for ConstantSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.fill(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_exactly_total_size() {
        for size in [0u64, 1, 7, 4096, 100_003] {
            let mut source = ConstantSource::new(size);
            let mut out = Vec::new();
            source.read_to_end(&mut out).unwrap();
            assert_eq!(out.len() as u64, size);
            assert!(out.iter().all(|&b| b == CONSTANT_BYTE));
        }
    }

    #[test]
    fn zero_size_is_immediately_exhausted() {
        let mut source = ConstantSource::new(0);
        assert_eq!(source.next_byte(), None);
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_destination_is_not_exhaustion() {
        let mut source = ConstantSource::new(3);
        assert_eq!(source.read(&mut []).unwrap(), 0);
        assert_eq!(source.position(), 0);
        assert_eq!(source.remaining(), 3);

        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn single_byte_and_bulk_paths_agree() {
        let mut single = ConstantSource::new(10);
        let mut bytes = Vec::new();
        while let Some(b) = single.next_byte() {
            bytes.push(b);
        }

        let mut bulk = ConstantSource::new(10);
        let mut buf = [0u8; 4];
        let mut collected = Vec::new();
        loop {
            let n = bulk.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(bytes, collected);
    }

    #[test]
    fn bulk_fill_leaves_tail_untouched() {
        let mut source = ConstantSource::new(2);
        let mut buf = [0u8; 5];
        assert_eq!(source.fill(&mut buf), 2);
        assert_eq!(buf, [0xAA, 0xAA, 0, 0, 0]);
    }
}
