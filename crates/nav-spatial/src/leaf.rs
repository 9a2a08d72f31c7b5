//! Leaf items and the on-disk leaf file.
//!
//! # Leaf file
//!
//! ```text
//! u64 element_count
//! LeafBlock[leaf_count]     leaf_count = ceil(element_count / leaf_node_size)
//!
//! LeafBlock = u32 object_count, SegmentRecord[leaf_node_size]
//! ```
//!
//! Blocks have a fixed size, so leaf `i` sits at byte
//! `8 + i * (4 + leaf_node_size * 48)`.  Unused record slots in the last
//! block are zero.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use tracing::debug;

use nav_core::io::{read_pod, read_pod_vec};
use nav_core::{NameId, NodeId, TravelMode};

use crate::{RTreeParams, SpatialError, SpatialResult};

/// Size of the leaf file header.
pub const LEAF_FILE_HEADER: u64 = size_of::<u64>() as u64;

// ── SegmentRecord ─────────────────────────────────────────────────────────────

/// One road segment as stored in the spatial index.
///
/// `u`/`v` index the coordinate table.  The routing fields are copied into
/// the [`PhantomNode`](crate::PhantomNode) a query returns.
#[derive(Copy, Clone, PartialEq, Eq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SegmentRecord {
    pub u:                    NodeId,
    pub v:                    NodeId,
    pub forward_node_id:      NodeId,
    pub reverse_node_id:      NodeId,
    pub name_id:              NameId,
    pub forward_weight:       i32,
    pub reverse_weight:       i32,
    pub forward_offset:       i32,
    pub reverse_offset:       i32,
    pub packed_geometry_id:   u32,
    /// `0` for segments of big components, otherwise a tiny-component tag.
    pub component_id:         u32,
    pub fwd_segment_position: u16,
    pub forward_travel_mode:  TravelMode,
    pub backward_travel_mode: TravelMode,
}

impl SegmentRecord {
    /// A segment between `u` and `v` with no routing payload.
    pub fn between(u: NodeId, v: NodeId) -> Self {
        Self {
            u,
            v,
            forward_node_id:      NodeId::INVALID,
            reverse_node_id:      NodeId::INVALID,
            name_id:              NameId::INVALID,
            forward_weight:       0,
            reverse_weight:       0,
            forward_offset:       0,
            reverse_offset:       0,
            packed_geometry_id:   u32::MAX,
            component_id:         0,
            fwd_segment_position: 0,
            forward_travel_mode:  TravelMode::DEFAULT,
            backward_travel_mode: TravelMode::DEFAULT,
        }
    }

    #[inline]
    pub fn is_in_tiny_cc(&self) -> bool {
        self.component_id != 0
    }
}

/// Bytes per leaf block for a given leaf capacity.
#[inline]
pub fn leaf_block_size(leaf_node_size: u32) -> u64 {
    size_of::<u32>() as u64 + leaf_node_size as u64 * size_of::<SegmentRecord>() as u64
}

/// Byte offset of leaf `leaf` in the leaf file.
#[inline]
pub fn leaf_offset(leaf: u32, params: &RTreeParams) -> u64 {
    LEAF_FILE_HEADER + leaf as u64 * leaf_block_size(params.leaf_node_size)
}

// ── LeafReader ────────────────────────────────────────────────────────────────

/// Per-query (or per-worker) handle for paging leaves in from disk.
///
/// Owns one open file stream.  The stream is opened lazily, reopened when
/// a query names a different leaf file (a new dataset was published), and
/// reopened once more if a read fails on a stale handle.
#[derive(Debug, Default)]
pub struct LeafReader {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl LeafReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read leaf `leaf` of the leaf file at `path` into `out`.
    pub fn load(
        &mut self,
        path: &Path,
        leaf: u32,
        params: &RTreeParams,
        out: &mut Vec<SegmentRecord>,
    ) -> SpatialResult<()> {
        if self.path.as_deref() != Some(path) {
            self.file = None;
            self.path = Some(path.to_path_buf());
        }

        match self.try_load(path, leaf, params, out) {
            Err(SpatialError::Io(first)) => {
                debug!(leaf, error = %first, "resetting stale leaf file handle");
                self.file = None;
                self.try_load(path, leaf, params, out).map_err(|e| match e {
                    SpatialError::Io(source) => SpatialError::StaleLeafHandle { leaf, source },
                    other => other,
                })
            }
            other => other,
        }
    }

    fn try_load(
        &mut self,
        path: &Path,
        leaf: u32,
        params: &RTreeParams,
        out: &mut Vec<SegmentRecord>,
    ) -> SpatialResult<()> {
        let file = match &mut self.file {
            Some(file) => file,
            slot @ None => slot.insert(File::open(path)?),
        };
        file.seek(SeekFrom::Start(leaf_offset(leaf, params)))?;
        let count: u32 = read_pod(file)?;
        if count > params.leaf_node_size {
            return Err(SpatialError::CorruptLeaf { leaf, count });
        }
        *out = read_pod_vec(file, count as usize)?;
        Ok(())
    }
}

/// Read the `u64` element count at the head of a leaf file.
pub fn read_element_count<R: Read>(reader: &mut R) -> SpatialResult<u64> {
    Ok(read_pod::<u64, R>(reader)?)
}
