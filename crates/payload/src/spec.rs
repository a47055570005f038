use serde::{Deserialize, Serialize};

use crate::{BlockRandomSource, ByteSource, ConstantSource, PayloadError};

/// Which generator a benchmark run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    #[serde(rename = "constant")]
    Constant,
    #[serde(rename = "block-random")]
    BlockRandom,
}

/// Run parameters for the synthetic payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSpec {
    pub kind: PayloadKind,
    pub size: u64,
    /// PRNG seed; ignored by the constant generator.
    pub seed: u64,
    /// Run length of identical bytes; ignored by the constant generator.
    pub block_size: u64,
}

impl PayloadSpec {
    pub fn constant(size: u64) -> Self {
        Self {
            kind: PayloadKind::Constant,
            size,
            seed: 0,
            block_size: 1,
        }
    }

    pub fn block_random(size: u64, block_size: u64, seed: u64) -> Self {
        Self {
            kind: PayloadKind::BlockRandom,
            size,
            seed,
            block_size,
        }
    }

    /// Constructs a fresh source positioned at byte zero.
    pub fn build(&self) -> Result<Box<dyn ByteSource>, PayloadError> {
        Ok(match self.kind {
            PayloadKind::Constant => Box::new(ConstantSource::new(self.size)),
            PayloadKind::BlockRandom => Box::new(BlockRandomSource::new(
                self.size,
                self.block_size,
                self.seed,
            )?),
        })
    }
}
