//! Linear block layout of a data region.
//!
//! A data region holds seventeen logical blocks in a fixed order.  Each
//! block is framed by an 8-byte sentinel before and after its payload, and
//! every sentinel and payload starts on an 8-byte boundary:
//!
//! ```text
//! [SENTINEL][payload of block 0, zero-padded to 8][SENTINEL]
//! [SENTINEL][payload of block 1, zero-padded to 8][SENTINEL]
//! ...
//! ```
//!
//! The [`DataLayout`] record describing the sizes lives in its own small
//! region, so readers can size and validate the data region before touching
//! it.  Sentinels are written when a block is opened for writing and checked
//! every time a block is opened for reading.

use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use bytemuck::Pod;

use nav_core::{ByteRegion, MappedSlice, Storage};
use nav_spatial::RTreeParams;

use crate::{StoreError, StoreResult};

/// Frames every block on both sides.
pub const SENTINEL: [u8; 8] = *b"NAVBLOCK";

const FRAME: usize = SENTINEL.len();

// ── BlockId ───────────────────────────────────────────────────────────────────

/// The logical blocks of a data region, in layout order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum BlockId {
    FileIndexPath,
    NameOffsets,
    NameBlocks,
    NameCharList,
    ViaNodeList,
    NameIdList,
    TravelMode,
    TurnInstruction,
    GeometriesIndicators,
    GeometriesIndex,
    GeometriesList,
    HsgrChecksum,
    GraphNodeList,
    GraphEdgeList,
    RSearchTree,
    CoordinateList,
    Timestamp,
}

pub const BLOCK_COUNT: usize = 17;

impl BlockId {
    pub const ALL: [BlockId; BLOCK_COUNT] = [
        BlockId::FileIndexPath,
        BlockId::NameOffsets,
        BlockId::NameBlocks,
        BlockId::NameCharList,
        BlockId::ViaNodeList,
        BlockId::NameIdList,
        BlockId::TravelMode,
        BlockId::TurnInstruction,
        BlockId::GeometriesIndicators,
        BlockId::GeometriesIndex,
        BlockId::GeometriesList,
        BlockId::HsgrChecksum,
        BlockId::GraphNodeList,
        BlockId::GraphEdgeList,
        BlockId::RSearchTree,
        BlockId::CoordinateList,
        BlockId::Timestamp,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockId::FileIndexPath => "FILE_INDEX_PATH",
            BlockId::NameOffsets => "NAME_OFFSETS",
            BlockId::NameBlocks => "NAME_BLOCKS",
            BlockId::NameCharList => "NAME_CHAR_LIST",
            BlockId::ViaNodeList => "VIA_NODE_LIST",
            BlockId::NameIdList => "NAME_ID_LIST",
            BlockId::TravelMode => "TRAVEL_MODE",
            BlockId::TurnInstruction => "TURN_INSTRUCTION",
            BlockId::GeometriesIndicators => "GEOMETRIES_INDICATORS",
            BlockId::GeometriesIndex => "GEOMETRIES_INDEX",
            BlockId::GeometriesList => "GEOMETRIES_LIST",
            BlockId::HsgrChecksum => "HSGR_CHECKSUM",
            BlockId::GraphNodeList => "GRAPH_NODE_LIST",
            BlockId::GraphEdgeList => "GRAPH_EDGE_LIST",
            BlockId::RSearchTree => "R_SEARCH_TREE",
            BlockId::CoordinateList => "COORDINATE_LIST",
            BlockId::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── DataLayout ────────────────────────────────────────────────────────────────

/// Element counts and sizes of every block, plus the R-tree parameters the
/// tree block was built with.  Stored verbatim in the layout region.
#[derive(Copy, Clone, PartialEq, Eq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct DataLayout {
    num_entries:      [u64; BLOCK_COUNT],
    entry_size:       [u64; BLOCK_COUNT],
    branching_factor: u32,
    leaf_node_size:   u32,
}

/// Placement of one block inside the data region.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BlockFrame {
    pub block:         BlockId,
    pub element_count: usize,
    pub element_size:  usize,
    /// Byte offset of the leading sentinel.
    pub start:         usize,
    /// Byte offset of the payload.
    pub offset:        usize,
    /// Byte offset of the trailing sentinel.
    pub end:           usize,
}

impl BlockFrame {
    pub fn byte_len(&self) -> usize {
        self.element_count * self.element_size
    }
}

#[inline]
fn align8(n: usize) -> usize {
    n.div_ceil(8).saturating_mul(8)
}

impl DataLayout {
    /// An all-empty layout for a tree built with `params`.
    pub fn new(params: RTreeParams) -> Self {
        Self {
            num_entries:      [0; BLOCK_COUNT],
            entry_size:       [0; BLOCK_COUNT],
            branching_factor: params.branching_factor,
            leaf_node_size:   params.leaf_node_size,
        }
    }

    pub fn add_block(&mut self, block: BlockId, element_count: usize, element_size: usize) {
        self.num_entries[block.index()] = element_count as u64;
        self.entry_size[block.index()] = element_size as u64;
    }

    /// [`add_block`](Self::add_block) with the size of `T`.
    pub fn set_block_size<T: Pod>(&mut self, block: BlockId, element_count: usize) {
        self.add_block(block, element_count, size_of::<T>());
    }

    pub fn element_count(&self, block: BlockId) -> usize {
        self.num_entries[block.index()] as usize
    }

    /// Payload bytes of `block`, without padding or sentinels.  Saturates
    /// rather than wrapping; [`from_bytes`](Self::from_bytes) rejects such
    /// layouts.
    pub fn block_size(&self, block: BlockId) -> usize {
        self.element_count(block).saturating_mul(self.entry_size[block.index()] as usize)
    }

    pub fn rtree_params(&self) -> RTreeParams {
        RTreeParams::new(self.branching_factor, self.leaf_node_size)
    }

    /// Every block's placement, in layout order.
    pub fn frames(&self) -> impl Iterator<Item = BlockFrame> + '_ {
        let mut cursor = 0usize;
        BlockId::ALL.into_iter().map(move |block| {
            let start = cursor;
            let offset = start.saturating_add(FRAME);
            let end = align8(offset.saturating_add(self.block_size(block)));
            cursor = end.saturating_add(FRAME);
            BlockFrame {
                block,
                element_count: self.element_count(block),
                element_size: self.entry_size[block.index()] as usize,
                start,
                offset,
                end,
            }
        })
    }

    pub fn frame(&self, block: BlockId) -> BlockFrame {
        // `frames` always yields every block.
        self.frames().nth(block.index()).unwrap_or(BlockFrame {
            block,
            element_count: 0,
            element_size: 0,
            start: 0,
            offset: 0,
            end: 0,
        })
    }

    /// Byte offset of `block`'s payload.
    pub fn block_offset(&self, block: BlockId) -> usize {
        self.frame(block).offset
    }

    /// Size of the data region this layout describes.
    pub fn total_size(&self) -> usize {
        self.frames().last().map_or(0, |f| f.end.saturating_add(FRAME))
    }

    /// [`total_size`](Self::total_size) computed with checked arithmetic;
    /// `None` when some block does not fit in the address space.
    fn checked_total_size(&self) -> Option<usize> {
        let mut cursor = 0usize;
        for block in BlockId::ALL {
            let count = usize::try_from(self.num_entries[block.index()]).ok()?;
            let size = usize::try_from(self.entry_size[block.index()]).ok()?;
            let payload = count.checked_mul(size)?;
            let end = cursor.checked_add(FRAME)?.checked_add(payload)?.checked_next_multiple_of(8)?;
            cursor = end.checked_add(FRAME)?;
        }
        Some(cursor)
    }

    // ── Block access ──────────────────────────────────────────────────────

    /// Open `block` for writing: stamps both sentinels and returns the
    /// payload bytes.
    pub fn block_bytes_mut<'r>(&self, region: &'r mut [u8], block: BlockId) -> StoreResult<&'r mut [u8]> {
        self.check_region_len(region.len())?;
        let frame = self.frame(block);
        region[frame.start..frame.offset].copy_from_slice(&SENTINEL);
        region[frame.end..frame.end + FRAME].copy_from_slice(&SENTINEL);
        Ok(&mut region[frame.offset..frame.offset + frame.byte_len()])
    }

    /// Open `block` for reading: verifies both sentinels.
    pub fn block_bytes<'r>(&self, region: &'r [u8], block: BlockId) -> StoreResult<&'r [u8]> {
        self.check_region_len(region.len())?;
        let frame = self.frame(block);
        if region[frame.start..frame.offset] != SENTINEL || region[frame.end..frame.end + FRAME] != SENTINEL {
            return Err(StoreError::CorruptedBlock { block });
        }
        Ok(&region[frame.offset..frame.offset + frame.byte_len()])
    }

    /// A typed view of `block` sharing `region`, after verifying its
    /// sentinels and element size.
    pub fn view<T: Pod>(&self, region: &Arc<dyn ByteRegion>, block: BlockId) -> StoreResult<Storage<T>> {
        self.block_bytes(region.bytes(), block)?;
        let frame = self.frame(block);
        if frame.element_count > 0 && frame.element_size != size_of::<T>() {
            return Err(StoreError::malformed(
                "layout",
                format!("{block} holds {}-byte elements, expected {}", frame.element_size, size_of::<T>()),
            ));
        }
        let slice = MappedSlice::new(Arc::clone(region), frame.offset, frame.element_count)?;
        Ok(Storage::Mapped(slice))
    }

    fn check_region_len(&self, len: usize) -> StoreResult<()> {
        let expected = self.total_size();
        if len < expected {
            return Err(StoreError::malformed(
                "data region",
                format!("{len} bytes, layout needs {expected}"),
            ));
        }
        Ok(())
    }

    // ── Layout region ─────────────────────────────────────────────────────

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let raw = bytes
            .get(..size_of::<DataLayout>())
            .ok_or_else(|| StoreError::malformed("layout region", format!("only {} bytes", bytes.len())))?;
        let layout: DataLayout = bytemuck::pod_read_unaligned(raw);
        layout.rtree_params().validate()?;
        if layout.checked_total_size().is_none() {
            return Err(StoreError::malformed("layout", "block sizes overflow the address space"));
        }
        Ok(layout)
    }
}
