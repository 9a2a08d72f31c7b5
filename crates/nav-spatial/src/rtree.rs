//! Hilbert-packed static R-tree: bulk load, persistence, and attach.
//!
//! # Lifecycle
//!
//! A tree is built once by [`StaticRTree::build`], which writes a tree file
//! and a leaf file and returns nothing queryable.  Query processes then
//! [`attach`](StaticRTree::attach) to the tree file (or
//! [`adopt`](StaticRTree::adopt) a copy of it from a shared region) and
//! page leaves in from the leaf file through a [`LeafReader`].  A tree is
//! never modified after it is written.
//!
//! # Tree file
//!
//! ```text
//! u32 node_count
//! u32 words[node_count * (5 + branching_factor)]
//! ```
//!
//! Each node is `[min_lon, max_lon, min_lat, max_lat, header, children..]`
//! where `header = child_count | on_disk << 31`.  A node with `on_disk` set
//! is the parent of exactly one leaf block, whose index is `children[0]`.
//! The root is node 0.
//!
//! [`LeafReader`]: crate::LeafReader

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use nav_core::coordinate::{COORDINATE_PRECISION, lat_to_mercator_y};
use nav_core::io::{read_pod_vec, read_u32, require_non_empty, write_pod, write_pod_slice, write_u32};
use nav_core::{FixedPointCoordinate, Storage, hilbert_key};

use crate::leaf::{LEAF_FILE_HEADER, leaf_block_size, read_element_count};
use crate::{Rectangle, SegmentRecord, SpatialError, SpatialResult};

// ── Parameters ────────────────────────────────────────────────────────────────

/// Fan-out of internal nodes and capacity of leaf blocks.
///
/// Fixed per tree: a tree must be attached with the parameters it was built
/// with, so they are recorded alongside it in the shared layout.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RTreeParams {
    pub branching_factor: u32,
    pub leaf_node_size:   u32,
}

impl RTreeParams {
    pub const DEFAULT_BRANCHING_FACTOR: u32 = 64;
    pub const DEFAULT_LEAF_NODE_SIZE: u32 = 1024;

    pub fn new(branching_factor: u32, leaf_node_size: u32) -> Self {
        Self { branching_factor, leaf_node_size }
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if !(2..=1 << 16).contains(&self.branching_factor) {
            return Err(SpatialError::InvalidParams(format!(
                "branching factor {} outside 2..=65536",
                self.branching_factor
            )));
        }
        if !(1..=1 << 20).contains(&self.leaf_node_size) {
            return Err(SpatialError::InvalidParams(format!(
                "leaf node size {} outside 1..=1048576",
                self.leaf_node_size
            )));
        }
        Ok(())
    }

    /// Words per serialized tree node.
    #[inline]
    pub fn node_stride(&self) -> usize {
        NODE_HEADER_WORDS + self.branching_factor as usize
    }
}

impl Default for RTreeParams {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BRANCHING_FACTOR, Self::DEFAULT_LEAF_NODE_SIZE)
    }
}

// ── Node words ────────────────────────────────────────────────────────────────

const NODE_HEADER_WORDS: usize = 5;
const ON_DISK_BIT: u32 = 1 << 31;

/// Read-only view of one serialized tree node.
#[derive(Copy, Clone, Debug)]
pub struct TreeNode<'a> {
    words: &'a [u32],
}

impl<'a> TreeNode<'a> {
    #[inline]
    pub fn rect(&self) -> Rectangle {
        Rectangle::from_words([self.words[0], self.words[1], self.words[2], self.words[3]])
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        (self.words[4] & !ON_DISK_BIT) as usize
    }

    /// `true` if `children()[0]` is a leaf block index.
    #[inline]
    pub fn children_on_disk(&self) -> bool {
        self.words[4] & ON_DISK_BIT != 0
    }

    #[inline]
    pub fn children(&self) -> &'a [u32] {
        &self.words[NODE_HEADER_WORDS..NODE_HEADER_WORDS + self.child_count()]
    }
}

/// Mutable node under construction.
struct BuildNode {
    rect:     Rectangle,
    on_disk:  bool,
    children: Vec<u32>,
}

impl BuildNode {
    fn write_words(&self, stride: usize, out: &mut Vec<u32>) {
        let start = out.len();
        out.extend_from_slice(&self.rect.to_words());
        let mut header = self.children.len() as u32;
        if self.on_disk {
            header |= ON_DISK_BIT;
        }
        out.push(header);
        out.extend_from_slice(&self.children);
        out.resize(start + stride, 0);
    }
}

// ── StaticRTree ───────────────────────────────────────────────────────────────

/// A persisted R-tree attached for querying.
///
/// Internal nodes live in memory (owned or mapped); leaves stay in the leaf
/// file.  The tree also holds the coordinate table its segments index into.
pub struct StaticRTree {
    pub(crate) nodes:         Storage<u32>,
    pub(crate) node_count:    usize,
    pub(crate) params:        RTreeParams,
    pub(crate) leaf_path:     PathBuf,
    pub(crate) element_count: u64,
    pub(crate) coordinates:   Storage<FixedPointCoordinate>,
}

impl StaticRTree {
    /// Bulk-load `items` and write the tree and leaf files.
    ///
    /// Items are ordered along the Hilbert curve by the Mercator-projected
    /// midpoint of their endpoints, packed `leaf_node_size` to a leaf, and
    /// grouped bottom-up `branching_factor` to a parent.  Returns the number
    /// of tree nodes written.
    pub fn build(
        items: &[SegmentRecord],
        coordinates: &[FixedPointCoordinate],
        params: RTreeParams,
        tree_path: &Path,
        leaf_path: &Path,
    ) -> SpatialResult<usize> {
        params.validate()?;
        if items.is_empty() || coordinates.is_empty() {
            return Err(SpatialError::EmptyInput);
        }
        for (index, item) in items.iter().enumerate() {
            for node in [item.u, item.v] {
                if node.index() >= coordinates.len() {
                    return Err(SpatialError::InvalidSegment { index, node });
                }
            }
        }

        let order = hilbert_order(items, coordinates);

        // ── Leaves ────────────────────────────────────────────────────────
        let leaf_size = params.leaf_node_size as usize;
        let mut leaf_writer = BufWriter::new(File::create(leaf_path)?);
        write_pod(&mut leaf_writer, &(items.len() as u64))?;

        let mut build_nodes: Vec<BuildNode> = Vec::with_capacity(order.len().div_ceil(leaf_size));
        let mut block: Vec<SegmentRecord> = Vec::with_capacity(leaf_size);
        for (leaf_id, chunk) in order.chunks(leaf_size).enumerate() {
            block.clear();
            block.extend(chunk.iter().map(|&i| items[i as usize]));

            let mut rect = Rectangle::EMPTY;
            for item in &block {
                rect.extend(coordinates[item.u.index()]);
                rect.extend(coordinates[item.v.index()]);
            }

            write_u32(&mut leaf_writer, block.len() as u32)?;
            write_pod_slice(&mut leaf_writer, &block)?;
            let padding = (leaf_size - block.len()) * size_of::<SegmentRecord>();
            leaf_writer.write_all(&vec![0u8; padding])?;

            build_nodes.push(BuildNode { rect, on_disk: true, children: vec![leaf_id as u32] });
        }
        leaf_writer.flush()?;

        // ── Upper levels ──────────────────────────────────────────────────
        let branching = params.branching_factor as usize;
        let mut level = 0..build_nodes.len();
        while level.len() > 1 {
            let next_start = build_nodes.len();
            for group_start in level.clone().step_by(branching) {
                let group_end = (group_start + branching).min(level.end);
                let mut rect = Rectangle::EMPTY;
                for child in &build_nodes[group_start..group_end] {
                    rect.merge(&child.rect);
                }
                let children = (group_start as u32..group_end as u32).collect();
                build_nodes.push(BuildNode { rect, on_disk: false, children });
            }
            level = next_start..build_nodes.len();
        }

        // Root was appended last; reverse so it becomes node 0.
        let total = build_nodes.len() as u32;
        build_nodes.reverse();
        for node in build_nodes.iter_mut().filter(|n| !n.on_disk) {
            for child in node.children.iter_mut() {
                *child = total - *child - 1;
            }
        }

        let stride = params.node_stride();
        let mut words = Vec::with_capacity(build_nodes.len() * stride);
        for node in &build_nodes {
            node.write_words(stride, &mut words);
        }
        let mut tree_writer = BufWriter::new(File::create(tree_path)?);
        write_u32(&mut tree_writer, total)?;
        write_pod_slice(&mut tree_writer, &words)?;
        tree_writer.flush()?;

        info!(
            elements = items.len(),
            leaves = order.len().div_ceil(leaf_size),
            nodes = total,
            tree = %tree_path.display(),
            "built static R-tree"
        );
        Ok(total as usize)
    }

    /// Load the tree file into memory and attach to the leaf file.
    pub fn attach(
        tree_path: &Path,
        leaf_path: &Path,
        coordinates: Storage<FixedPointCoordinate>,
        params: RTreeParams,
    ) -> SpatialResult<Self> {
        params.validate()?;
        let file_len = require_non_empty(tree_path)?;
        let mut reader = BufReader::new(File::open(tree_path)?);
        let words = read_tree_words(&mut reader, file_len, &params)?;
        Self::adopt(words.into(), leaf_path, coordinates, params)
    }

    /// Wrap already-loaded node words, e.g. a block of a shared region.
    ///
    /// Validates the node structure against the leaf file so that queries
    /// can index without further checks.
    pub fn adopt(
        nodes: Storage<u32>,
        leaf_path: &Path,
        coordinates: Storage<FixedPointCoordinate>,
        params: RTreeParams,
    ) -> SpatialResult<Self> {
        params.validate()?;
        let leaf_len = require_non_empty(leaf_path)?;
        let element_count = read_element_count(&mut File::open(leaf_path)?)?;
        let leaf_count = element_count.div_ceil(params.leaf_node_size as u64);
        let expected_len = LEAF_FILE_HEADER + leaf_count * leaf_block_size(params.leaf_node_size);
        if leaf_len != expected_len {
            return Err(SpatialError::CorruptTree(format!(
                "leaf file is {leaf_len} bytes, expected {expected_len} for {element_count} elements"
            )));
        }

        let stride = params.node_stride();
        if nodes.is_empty() || nodes.len() % stride != 0 {
            return Err(SpatialError::CorruptTree(format!(
                "{} node words do not divide into nodes of {stride} words",
                nodes.len()
            )));
        }

        let tree = Self {
            node_count: nodes.len() / stride,
            nodes,
            params,
            leaf_path: leaf_path.to_path_buf(),
            element_count,
            coordinates,
        };
        tree.validate_structure(leaf_count)?;

        if let Some(bad) = tree.coordinates.iter().position(|c| !c.is_valid()) {
            warn!(index = bad, "coordinate table holds an out-of-range coordinate");
        }
        Ok(tree)
    }

    fn validate_structure(&self, leaf_count: u64) -> SpatialResult<()> {
        for id in 0..self.node_count as u32 {
            let node = self.node(id);
            let children = node.child_count();
            if children > self.params.branching_factor as usize {
                return Err(SpatialError::CorruptTree(format!("node {id} has {children} children")));
            }
            if node.children_on_disk() {
                if children != 1 || node.children()[0] as u64 >= leaf_count {
                    return Err(SpatialError::CorruptTree(format!("node {id} has a bad leaf reference")));
                }
            } else if node.children().iter().any(|&c| c as usize >= self.node_count || c <= id) {
                return Err(SpatialError::CorruptTree(format!("node {id} has a bad child reference")));
            }
        }
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn node(&self, id: u32) -> TreeNode<'_> {
        let stride = self.params.node_stride();
        let start = id as usize * stride;
        TreeNode { words: &self.nodes[start..start + stride] }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    pub fn params(&self) -> RTreeParams {
        self.params
    }

    pub fn leaf_path(&self) -> &Path {
        &self.leaf_path
    }

    /// Raw node words as stored in the tree file, for copying into a region.
    pub fn node_words(&self) -> &[u32] {
        &self.nodes
    }

    pub fn coordinates(&self) -> &[FixedPointCoordinate] {
        &self.coordinates
    }
}

impl std::fmt::Debug for StaticRTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticRTree")
            .field("nodes", &self.node_count)
            .field("elements", &self.element_count)
            .field("params", &self.params)
            .field("leaf_path", &self.leaf_path)
            .finish()
    }
}

/// Read the node words of a tree file of `file_len` bytes, checking the
/// declared node count against the file size first.
pub fn read_tree_words<R: Read>(reader: &mut R, file_len: u64, params: &RTreeParams) -> SpatialResult<Vec<u32>> {
    let node_count = read_u32(reader)? as u64;
    let word_count = node_count * params.node_stride() as u64;
    let expected = size_of::<u32>() as u64 * (1 + word_count);
    if file_len != expected {
        return Err(SpatialError::CorruptTree(format!(
            "tree file is {file_len} bytes, expected {expected} for {node_count} nodes"
        )));
    }
    Ok(read_pod_vec(reader, word_count as usize)?)
}

/// Item indices in Hilbert order of their projected midpoints; ties keep
/// input order.
fn hilbert_order(items: &[SegmentRecord], coordinates: &[FixedPointCoordinate]) -> Vec<u32> {
    let key_of = |item: &SegmentRecord| {
        let mid = FixedPointCoordinate::centroid(coordinates[item.u.index()], coordinates[item.v.index()]);
        let projected_lat = (lat_to_mercator_y(mid.lat_deg()) * COORDINATE_PRECISION) as i32;
        hilbert_key(FixedPointCoordinate::new(projected_lat, mid.lon))
    };

    #[cfg(feature = "parallel")]
    let keyed: Vec<(u64, u32)> = {
        use rayon::prelude::*;
        let mut keyed: Vec<(u64, u32)> =
            items.par_iter().enumerate().map(|(i, item)| (key_of(item), i as u32)).collect();
        keyed.par_sort_unstable();
        keyed
    };

    #[cfg(not(feature = "parallel"))]
    let keyed: Vec<(u64, u32)> = {
        let mut keyed: Vec<(u64, u32)> =
            items.iter().enumerate().map(|(i, item)| (key_of(item), i as u32)).collect();
        keyed.sort_unstable();
        keyed
    };

    keyed.into_iter().map(|(_, i)| i).collect()
}
