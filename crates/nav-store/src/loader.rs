//! Loading a dataset into a fresh region pair and publishing it.
//!
//! ```text
//! validate config ─▶ pick idle pair ─▶ size blocks from file headers
//!     ─▶ write layout region ─▶ stream artifacts into data region
//!     ─▶ publish (waits for readers of the old pair) ─▶ delete old pair
//! ```
//!
//! Everything after validation runs under the directory's update lock, so
//! two loaders never pick the same pair.
//!
//! The data region is filled by reading each artifact straight into its
//! block; nothing but the edge columns and coordinates is staged in
//! between.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::mem::size_of;
use std::path::Path;

use nav_core::io::{read_u32, require_non_empty};
use nav_core::{FixedPointCoordinate, NameId, NodeId, RangeBlock, TravelMode};
use nav_graph::{GraphNodeEntry, HsgrHeader, QueryEdge};
use nav_graph::hsgr::open_hsgr;
use nav_spatial::{RTreeParams, SpatialError};
use tracing::{debug, info, warn};

use crate::artifacts::{self, NamesHeader, OriginalEdgeData, QueryNode};
use crate::dataset::{EdgeColumns, indicator_words};
use crate::{
    BlockId, DataLayout, DataStoreConfig, Publication, PublishedSnapshot, RegionId, RegionStore,
    SnapshotDirectory, StoreError, StoreResult,
};

// ── Region pair selection ─────────────────────────────────────────────────────

/// The pair a load writes, and the pair it retires afterwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RegionPlan {
    pub layout:          RegionId,
    pub data:            RegionId,
    pub previous_layout: RegionId,
    pub previous_data:   RegionId,
}

const PAIR_1: RegionPlan = RegionPlan {
    layout:          RegionId::Layout1,
    data:            RegionId::Data1,
    previous_layout: RegionId::Layout2,
    previous_data:   RegionId::Data2,
};

const PAIR_2: RegionPlan = RegionPlan {
    layout:          RegionId::Layout2,
    data:            RegionId::Data2,
    previous_layout: RegionId::Layout1,
    previous_data:   RegionId::Data1,
};

/// Pair 1 if `LAYOUT_2` exists, pair 2 otherwise; never the live pair.
pub fn select_regions<S: RegionStore + ?Sized>(regions: &S, current: Option<PublishedSnapshot>) -> RegionPlan {
    let plan = if regions.exists(RegionId::Layout2) { PAIR_1 } else { PAIR_2 };
    match current {
        Some(live) if live.layout == plan.layout => {
            if plan == PAIR_1 { PAIR_2 } else { PAIR_1 }
        }
        _ => plan,
    }
}

// ── Sizing ────────────────────────────────────────────────────────────────────

/// Header counts of every artifact, read before anything is allocated.
#[derive(Clone, Debug)]
struct Sources {
    leaf_path:      String,
    hsgr:           HsgrHeader,
    names:          NamesHeader,
    edge_count:     usize,
    geometry_index: usize,
    geometry_list:  usize,
    node_count:     usize,
    tree_words:     usize,
    timestamp:      String,
}

impl Sources {
    fn read(config: &DataStoreConfig) -> StoreResult<Self> {
        let leaf_path = fs::canonicalize(&config.file_index)?
            .to_str()
            .map(str::to_owned)
            .ok_or_else(|| StoreError::Config(format!("{} is not valid UTF-8", config.file_index.display())))?;
        let (hsgr, _) = open_hsgr(&config.hsgr)?;
        let (geometry_index, geometry_list) = artifacts::read_geometry_header(&config.geometry)?;

        Ok(Self {
            leaf_path,
            hsgr,
            names: artifacts::read_names_header(&config.names)?,
            edge_count: artifacts::read_count::<OriginalEdgeData>(&config.edges)?,
            geometry_index,
            geometry_list,
            node_count: artifacts::read_count::<QueryNode>(&config.nodes)?,
            tree_words: tree_word_count(&config.ram_index, &config.rtree)?,
            timestamp: artifacts::read_timestamp(config.timestamp.as_deref()),
        })
    }

    fn layout(&self, params: RTreeParams) -> DataLayout {
        let mut layout = DataLayout::new(params);
        layout.set_block_size::<u8>(BlockId::FileIndexPath, self.leaf_path.len());
        layout.set_block_size::<u32>(BlockId::NameOffsets, self.names.block_count);
        layout.set_block_size::<RangeBlock>(BlockId::NameBlocks, self.names.block_count);
        layout.set_block_size::<u8>(BlockId::NameCharList, self.names.char_count);
        layout.set_block_size::<NodeId>(BlockId::ViaNodeList, self.edge_count);
        layout.set_block_size::<NameId>(BlockId::NameIdList, self.edge_count);
        layout.set_block_size::<TravelMode>(BlockId::TravelMode, self.edge_count);
        layout.set_block_size::<u8>(BlockId::TurnInstruction, self.edge_count);
        layout.set_block_size::<u32>(BlockId::GeometriesIndicators, indicator_words(self.edge_count));
        layout.set_block_size::<u32>(BlockId::GeometriesIndex, self.geometry_index);
        layout.set_block_size::<NodeId>(BlockId::GeometriesList, self.geometry_list);
        layout.set_block_size::<u32>(BlockId::HsgrChecksum, 1);
        layout.set_block_size::<GraphNodeEntry>(BlockId::GraphNodeList, self.hsgr.node_count as usize);
        layout.set_block_size::<QueryEdge>(BlockId::GraphEdgeList, self.hsgr.edge_count as usize);
        layout.set_block_size::<u32>(BlockId::RSearchTree, self.tree_words);
        layout.set_block_size::<FixedPointCoordinate>(BlockId::CoordinateList, self.node_count);
        layout.set_block_size::<u8>(BlockId::Timestamp, self.timestamp.len());
        layout
    }
}

/// Node words in a tree file, after checking its size.
fn tree_word_count(path: &Path, params: &RTreeParams) -> StoreResult<usize> {
    let file_len = require_non_empty(path)?;
    let node_count = read_u32(&mut File::open(path)?)? as u64;
    let words = node_count * params.node_stride() as u64;
    let expected = size_of::<u32>() as u64 * (1 + words);
    if file_len != expected {
        return Err(SpatialError::CorruptTree(format!(
            "tree file is {file_len} bytes, expected {expected} for {node_count} nodes"
        ))
        .into());
    }
    Ok(words as usize)
}

// ── Filling ───────────────────────────────────────────────────────────────────

fn copy_into(layout: &DataLayout, region: &mut [u8], block: BlockId, bytes: &[u8]) -> StoreResult<()> {
    let target = layout.block_bytes_mut(region, block)?;
    if target.len() != bytes.len() {
        return Err(StoreError::malformed(
            "artifact",
            format!("{block} sized for {} bytes, source has {}", target.len(), bytes.len()),
        ));
    }
    target.copy_from_slice(bytes);
    Ok(())
}

fn read_into<R: Read>(layout: &DataLayout, region: &mut [u8], block: BlockId, reader: &mut R) -> StoreResult<()> {
    reader.read_exact(layout.block_bytes_mut(region, block)?)?;
    Ok(())
}

fn fill_data(
    layout: &DataLayout,
    config: &DataStoreConfig,
    sources: &Sources,
    region: &mut [u8],
) -> StoreResult<()> {
    // Stamp every frame first, including blocks that stay empty.
    for block in BlockId::ALL {
        layout.block_bytes_mut(region, block)?;
    }

    copy_into(layout, region, BlockId::FileIndexPath, sources.leaf_path.as_bytes())?;
    copy_into(layout, region, BlockId::Timestamp, sources.timestamp.as_bytes())?;
    copy_into(layout, region, BlockId::HsgrChecksum, bytemuck::bytes_of(&sources.hsgr.checksum))?;

    let mut names = BufReader::new(File::open(&config.names)?);
    read_u32(&mut names)?;
    read_u32(&mut names)?;
    read_into(layout, region, BlockId::NameOffsets, &mut names)?;
    read_into(layout, region, BlockId::NameBlocks, &mut names)?;
    read_u32(&mut names)?;
    read_into(layout, region, BlockId::NameCharList, &mut names)?;

    let columns = EdgeColumns::from_edges(&artifacts::read_edges(&config.edges)?);
    copy_into(layout, region, BlockId::ViaNodeList, bytemuck::cast_slice(&columns.via_nodes))?;
    copy_into(layout, region, BlockId::NameIdList, bytemuck::cast_slice(&columns.name_ids))?;
    copy_into(layout, region, BlockId::TravelMode, bytemuck::cast_slice(&columns.travel_modes))?;
    copy_into(layout, region, BlockId::TurnInstruction, &columns.turn_instructions)?;
    copy_into(layout, region, BlockId::GeometriesIndicators, bytemuck::cast_slice(&columns.geometry_indicators))?;

    let mut geometry = BufReader::new(File::open(&config.geometry)?);
    read_u32(&mut geometry)?;
    read_into(layout, region, BlockId::GeometriesIndex, &mut geometry)?;
    read_u32(&mut geometry)?;
    read_into(layout, region, BlockId::GeometriesList, &mut geometry)?;

    let (_, mut graph) = open_hsgr(&config.hsgr)?;
    read_into(layout, region, BlockId::GraphNodeList, &mut graph)?;
    read_into(layout, region, BlockId::GraphEdgeList, &mut graph)?;

    let mut tree = BufReader::new(File::open(&config.ram_index)?);
    read_u32(&mut tree)?;
    read_into(layout, region, BlockId::RSearchTree, &mut tree)?;

    let coordinates: Vec<FixedPointCoordinate> =
        artifacts::read_nodes(&config.nodes)?.iter().map(QueryNode::coordinate).collect();
    copy_into(layout, region, BlockId::CoordinateList, bytemuck::cast_slice(&coordinates))?;

    debug!(bytes = region.len(), "filled data region");
    Ok(())
}

// ── DataLoader ────────────────────────────────────────────────────────────────

/// Writes datasets into a [`RegionStore`] and publishes them through a
/// [`SnapshotDirectory`].
pub struct DataLoader<'a, S: ?Sized, D: ?Sized> {
    regions:   &'a S,
    directory: &'a D,
}

impl<'a, S, D> DataLoader<'a, S, D>
where
    S: RegionStore + ?Sized,
    D: SnapshotDirectory + ?Sized,
{
    pub fn new(regions: &'a S, directory: &'a D) -> Self {
        Self { regions, directory }
    }

    /// Load the dataset named by `config` and make it the live snapshot.
    ///
    /// Fails before anything is allocated if a required file is missing or
    /// empty, or if another load holds the directory's update lock.  The
    /// lock is held from pair selection until the previously live pair is
    /// deleted; a failed delete is logged and otherwise ignored.
    pub fn load(&self, config: &DataStoreConfig) -> StoreResult<Publication> {
        config.validate()?;
        let update = self.directory.begin_update()?;
        let plan = select_regions(self.regions, self.directory.current()?);
        info!(layout = %plan.layout, data = %plan.data, "loading dataset");

        let sources = Sources::read(config)?;
        let layout = sources.layout(config.rtree);
        info!(
            nodes = sources.hsgr.node_count,
            edges = sources.hsgr.edge_count,
            coordinates = sources.node_count,
            bytes = layout.total_size(),
            "computed data layout"
        );

        self.regions.create(plan.layout, size_of::<DataLayout>(), &mut |bytes: &mut [u8]| {
            bytes.copy_from_slice(layout.as_bytes());
            Ok(())
        })?;
        self.regions.create(plan.data, layout.total_size(), &mut |bytes: &mut [u8]| {
            fill_data(&layout, config, &sources, bytes)
        })?;
        info!(region = %plan.data, "data region written");

        let publication = self.directory.publish_under(&update, plan.layout, plan.data)?;
        info!(snapshot = %publication.snapshot, checksum = sources.hsgr.checksum, "dataset is live");

        for id in [plan.previous_data, plan.previous_layout] {
            match self.regions.remove(id) {
                Ok(true) => debug!(region = %id, "removed previous region"),
                Ok(false) => {}
                Err(e) => warn!(region = %id, error = %e, "could not remove previous region"),
            }
        }
        drop(update);
        Ok(publication)
    }
}
