//! Compressed id → byte-range table.
//!
//! Used for street names: entry `i` owns the half-open byte range
//! `get_range(i)` of one concatenated character buffer.
//!
//! # Encoding
//!
//! Entries are grouped `BLOCK_SIZE + 1` (17) to a block.  Each block stores
//! one absolute `u32` offset (the start of its first entry) plus 16
//! single-byte lengths for entries `0..16`.  The length of entry 16 is never
//! stored: its end is the next block's offset, or `sum_lengths` for the last
//! block.  This fits 17 ranges in 20 bytes instead of 68.
//!
//! Because each stored length is a `u8`, every input length must be ≤ 255.
//!
//! # Binary layout
//!
//! ```text
//! u32 block_count
//! u32 sum_lengths
//! u32 offsets[block_count]
//! u8  blocks[block_count][16]
//! ```

use std::io::{Read, Write};
use std::ops::Range;

use crate::io::{read_pod_vec, read_u32, write_pod_slice, write_u32};
use crate::{CoreError, CoreResult, Storage};

/// Stored lengths per block; each block addresses `BLOCK_SIZE + 1` entries.
pub const BLOCK_SIZE: usize = 16;

const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE + 1;

/// The differential lengths of one block.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub struct RangeBlock(pub [u8; BLOCK_SIZE]);

/// Immutable compressed range table over owned or mapped storage.
#[derive(Clone, Debug)]
pub struct RangeTable {
    offsets:     Storage<u32>,
    blocks:      Storage<RangeBlock>,
    sum_lengths: u32,
}

impl RangeTable {
    /// Encode `lengths`.  Fails with [`CoreError::MalformedRangeInput`] on the
    /// first length above 255, before anything is built.
    pub fn build(lengths: &[u32]) -> CoreResult<Self> {
        if let Some((index, &length)) = lengths.iter().enumerate().find(|(_, l)| **l > 255) {
            return Err(CoreError::MalformedRangeInput { index, length });
        }

        let block_count = lengths.len() / ENTRIES_PER_BLOCK + 1;
        let mut offsets = Vec::with_capacity(block_count);
        let mut blocks = Vec::with_capacity(block_count);

        let mut block = RangeBlock::default();
        let mut length_sum = 0u32;

        for (i, &length) in lengths.iter().enumerate() {
            let slot = i % ENTRIES_PER_BLOCK;
            if slot == 0 {
                offsets.push(length_sum);
            }
            // The last entry of a block is implied by the next offset.
            if slot < BLOCK_SIZE {
                block.0[slot] = length as u8;
            } else {
                blocks.push(block);
                block = RangeBlock::default();
            }
            length_sum += length;
        }

        // A partial block is flushed as is; input ending exactly on a block
        // boundary gets an all-empty sentinel block starting at the total.
        if lengths.len() % ENTRIES_PER_BLOCK == 0 {
            offsets.push(length_sum);
        }
        blocks.push(block);

        debug_assert_eq!(offsets.len(), block_count);
        debug_assert_eq!(blocks.len(), block_count);

        Ok(Self {
            offsets:     offsets.into(),
            blocks:      blocks.into(),
            sum_lengths: length_sum,
        })
    }

    /// Wrap already-encoded arrays, e.g. views into a shared region.
    pub fn adopt(
        offsets: Storage<u32>,
        blocks: Storage<RangeBlock>,
        sum_lengths: u32,
    ) -> CoreResult<Self> {
        if offsets.len() != blocks.len() {
            return Err(CoreError::InvalidView(format!(
                "range table has {} offsets but {} blocks",
                offsets.len(),
                blocks.len()
            )));
        }
        Ok(Self { offsets, blocks, sum_lengths })
    }

    /// Byte range of entry `id`.
    ///
    /// Fails with [`CoreError::OutOfBounds`] if `id` lies beyond the encoded
    /// blocks.  Ids in the padded tail of the last block resolve to empty
    /// ranges at `sum_lengths`.
    pub fn get_range(&self, id: u32) -> CoreResult<Range<u32>> {
        let id = id as usize;
        let block = id / ENTRIES_PER_BLOCK;
        let slot = id % ENTRIES_PER_BLOCK;

        let capacity = self.capacity();
        if block >= self.offsets.len() {
            return Err(CoreError::OutOfBounds { index: id, len: capacity });
        }

        let lengths = &self.blocks[block].0;
        let begin = self.offsets[block]
            + lengths[..slot.min(BLOCK_SIZE)].iter().map(|&l| l as u32).sum::<u32>();

        let end = if slot < BLOCK_SIZE {
            begin + lengths[slot] as u32
        } else if block + 1 < self.offsets.len() {
            self.offsets[block + 1]
        } else {
            self.sum_lengths
        };

        Ok(begin..end)
    }

    /// Number of addressable ids (`block_count × 17`).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.offsets.len() * ENTRIES_PER_BLOCK
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn sum_lengths(&self) -> u32 {
        self.sum_lengths
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn blocks(&self) -> &[RangeBlock] {
        &self.blocks
    }

    // ── Persistence ───────────────────────────────────────────────────────

    pub fn write_to<W: Write>(&self, writer: &mut W) -> CoreResult<()> {
        let block_count = u32::try_from(self.offsets.len())
            .map_err(|_| CoreError::InvalidView("range table exceeds u32::MAX blocks".into()))?;
        write_u32(writer, block_count)?;
        write_u32(writer, self.sum_lengths)?;
        write_pod_slice(writer, &self.offsets)?;
        write_pod_slice(writer, &self.blocks)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> CoreResult<Self> {
        let block_count = read_u32(reader)? as usize;
        let sum_lengths = read_u32(reader)?;
        let offsets = read_pod_vec::<u32, R>(reader, block_count)?;
        let blocks = read_pod_vec::<RangeBlock, R>(reader, block_count)?;
        Self::adopt(offsets.into(), blocks.into(), sum_lengths)
    }
}
