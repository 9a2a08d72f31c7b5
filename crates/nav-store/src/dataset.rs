//! `Dataset` — typed read-only views over one loaded dataset.
//!
//! The same type serves both deployment modes: [`Dataset::from_region`]
//! places views over a published data region, [`Dataset::load_files`]
//! reads the artifacts into owned storage.  Every accessor works the same
//! over either backing.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nav_core::{ByteRegion, EdgeId, FixedPointCoordinate, NameId, NodeId, RangeTable, Storage, TravelMode};
use nav_graph::{QueryEdge, QueryEdgeData, StaticGraph, read_hsgr};
use nav_spatial::{LeafReader, PhantomNode, StaticRTree};
use tracing::info;

use crate::artifacts::{self, OriginalEdgeData};
use crate::{BlockId, DataLayout, DataStoreConfig, StoreError, StoreResult};

// ── Edge columns ──────────────────────────────────────────────────────────────

/// The `.edges` records split into one column per shared block.
#[derive(Clone, Debug, Default)]
pub(crate) struct EdgeColumns {
    pub via_nodes:           Vec<NodeId>,
    pub name_ids:            Vec<NameId>,
    pub travel_modes:        Vec<TravelMode>,
    pub turn_instructions:   Vec<u8>,
    pub geometry_indicators: Vec<u32>,
}

/// Words needed to hold one compression bit per edge.
#[inline]
pub(crate) fn indicator_words(edge_count: usize) -> usize {
    edge_count.div_ceil(32)
}

impl EdgeColumns {
    pub fn from_edges(edges: &[OriginalEdgeData]) -> Self {
        let mut columns = Self {
            via_nodes:           Vec::with_capacity(edges.len()),
            name_ids:            Vec::with_capacity(edges.len()),
            travel_modes:        Vec::with_capacity(edges.len()),
            turn_instructions:   Vec::with_capacity(edges.len()),
            geometry_indicators: vec![0; indicator_words(edges.len())],
        };
        for (i, edge) in edges.iter().enumerate() {
            columns.via_nodes.push(edge.via_node);
            columns.name_ids.push(edge.name_id);
            columns.travel_modes.push(edge.travel_mode);
            columns.turn_instructions.push(edge.turn_instruction);
            if edge.is_compressed() {
                columns.geometry_indicators[i / 32] |= 1 << (i % 32);
            }
        }
        columns
    }
}

// ── Dataset ───────────────────────────────────────────────────────────────────

/// One complete, immutable dataset.
pub struct Dataset {
    graph:               StaticGraph<QueryEdge>,
    checksum:            u32,
    via_nodes:           Storage<NodeId>,
    name_ids:            Storage<NameId>,
    travel_modes:        Storage<TravelMode>,
    turn_instructions:   Storage<u8>,
    geometry_indicators: Storage<u32>,
    geometry_index:      Storage<u32>,
    geometry_list:       Storage<NodeId>,
    names:               RangeTable,
    name_chars:          Storage<u8>,
    rtree:               StaticRTree,
    timestamp:           String,
}

impl Dataset {
    /// Views over a data region described by `layout`.
    ///
    /// Every block's sentinels are verified before any view is built; the
    /// first mismatch fails with [`StoreError::CorruptedBlock`].
    pub fn from_region(layout: &DataLayout, region: Arc<dyn ByteRegion>) -> StoreResult<Self> {
        for block in BlockId::ALL {
            layout.block_bytes(region.bytes(), block)?;
        }

        let path_bytes = layout.block_bytes(region.bytes(), BlockId::FileIndexPath)?;
        let leaf_path = std::str::from_utf8(path_bytes)
            .map(PathBuf::from)
            .map_err(|e| StoreError::malformed("leaf file path", e.to_string()))?;

        let checksum = layout
            .view::<u32>(&region, BlockId::HsgrChecksum)?
            .first()
            .copied()
            .ok_or_else(|| StoreError::malformed("layout", "empty checksum block"))?;
        let timestamp =
            String::from_utf8_lossy(layout.block_bytes(region.bytes(), BlockId::Timestamp)?).into_owned();

        let graph = StaticGraph::adopt(
            layout.view(&region, BlockId::GraphNodeList)?,
            layout.view(&region, BlockId::GraphEdgeList)?,
        )?;

        let name_chars: Storage<u8> = layout.view(&region, BlockId::NameCharList)?;
        let names = RangeTable::adopt(
            layout.view(&region, BlockId::NameOffsets)?,
            layout.view(&region, BlockId::NameBlocks)?,
            name_chars.len() as u32,
        )?;

        let rtree = StaticRTree::adopt(
            layout.view(&region, BlockId::RSearchTree)?,
            &leaf_path,
            layout.view(&region, BlockId::CoordinateList)?,
            layout.rtree_params(),
        )?;

        let dataset = Self {
            graph,
            checksum,
            via_nodes: layout.view(&region, BlockId::ViaNodeList)?,
            name_ids: layout.view(&region, BlockId::NameIdList)?,
            travel_modes: layout.view(&region, BlockId::TravelMode)?,
            turn_instructions: layout.view(&region, BlockId::TurnInstruction)?,
            geometry_indicators: layout.view(&region, BlockId::GeometriesIndicators)?,
            geometry_index: layout.view(&region, BlockId::GeometriesIndex)?,
            geometry_list: layout.view(&region, BlockId::GeometriesList)?,
            names,
            name_chars,
            rtree,
            timestamp,
        };
        dataset.check_columns()?;
        Ok(dataset)
    }

    /// Read every artifact named by `config` into owned storage.
    pub fn load_files(config: &DataStoreConfig) -> StoreResult<Self> {
        config.validate()?;

        let (header, graph) = read_hsgr(&config.hsgr)?;
        let coordinates: Vec<FixedPointCoordinate> =
            artifacts::read_nodes(&config.nodes)?.iter().map(|n| n.coordinate()).collect();
        let columns = EdgeColumns::from_edges(&artifacts::read_edges(&config.edges)?);
        let geometry = artifacts::read_geometry(&config.geometry)?;
        let (names, name_chars) = artifacts::read_names(&config.names)?;
        let rtree = StaticRTree::attach(&config.ram_index, &config.file_index, coordinates.into(), config.rtree)?;

        let dataset = Self {
            graph,
            checksum: header.checksum,
            via_nodes: columns.via_nodes.into(),
            name_ids: columns.name_ids.into(),
            travel_modes: columns.travel_modes.into(),
            turn_instructions: columns.turn_instructions.into(),
            geometry_indicators: columns.geometry_indicators.into(),
            geometry_index: geometry.index.into(),
            geometry_list: geometry.list.into(),
            names,
            name_chars: name_chars.into(),
            rtree,
            timestamp: artifacts::read_timestamp(config.timestamp.as_deref()),
        };
        dataset.check_columns()?;
        info!(
            nodes = dataset.node_count(),
            edges = dataset.edge_count(),
            checksum = dataset.checksum,
            "loaded dataset into process memory"
        );
        Ok(dataset)
    }

    fn check_columns(&self) -> StoreResult<()> {
        let n = self.via_nodes.len();
        let lens = [self.name_ids.len(), self.travel_modes.len(), self.turn_instructions.len()];
        if lens.iter().any(|&len| len != n) || self.geometry_indicators.len() != indicator_words(n) {
            return Err(StoreError::malformed(
                "edge columns",
                format!("{n} via nodes but column lengths {lens:?}, {} indicator words", self.geometry_indicators.len()),
            ));
        }
        if self.name_chars.len() != self.names.sum_lengths() as usize {
            return Err(StoreError::malformed("names", "character count differs from range table"));
        }
        Ok(())
    }

    // ── Graph ─────────────────────────────────────────────────────────────

    pub fn graph(&self) -> &StaticGraph<QueryEdge> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn out_degree(&self, node: NodeId) -> usize {
        self.graph.out_degree(node)
    }

    pub fn target(&self, edge: EdgeId) -> NodeId {
        self.graph.target(edge)
    }

    pub fn edge_data(&self, edge: EdgeId) -> QueryEdgeData {
        self.graph.edge_data(edge)
    }

    pub fn adjacent_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + use<> {
        self.graph.adjacent_edges(node)
    }

    pub fn find_edge(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.graph.find_edge(from, to)
    }

    pub fn find_edge_either_direction(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.graph.find_edge_either_direction(from, to)
    }

    pub fn find_edge_indicate_if_reverse(&self, from: NodeId, to: NodeId) -> Option<(EdgeId, bool)> {
        self.graph.find_edge_indicate_if_reverse(from, to)
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    // ── Per-edge data ─────────────────────────────────────────────────────
    //
    // Indexed by the edge-based id carried in `QueryEdgeData::id`.

    pub fn coordinate_of_node(&self, node: NodeId) -> Option<FixedPointCoordinate> {
        self.rtree.coordinates().get(node.index()).copied()
    }

    pub fn edge_is_compressed(&self, id: u32) -> bool {
        let id = id as usize;
        id < self.via_nodes.len() && self.geometry_indicators[id / 32] & (1 << (id % 32)) != 0
    }

    /// For a compressed edge, the id of its geometry; otherwise its via
    /// node.
    pub fn geometry_index_for_edge(&self, id: u32) -> Option<u32> {
        self.via_nodes.get(id as usize).map(|n| n.0)
    }

    /// The nodes of compressed geometry `geometry_id`.  Empty if the id is
    /// out of range.
    pub fn uncompressed_geometry(&self, geometry_id: u32) -> &[NodeId] {
        let i = geometry_id as usize;
        match (self.geometry_index.get(i), self.geometry_index.get(i + 1)) {
            (Some(&begin), Some(&end)) => self.geometry_list.get(begin as usize..end as usize).unwrap_or(&[]),
            _ => &[],
        }
    }

    pub fn turn_instruction_for_edge(&self, id: u32) -> Option<u8> {
        self.turn_instructions.get(id as usize).copied()
    }

    pub fn travel_mode_for_edge(&self, id: u32) -> Option<TravelMode> {
        self.travel_modes.get(id as usize).copied()
    }

    pub fn name_index_for_edge(&self, id: u32) -> Option<NameId> {
        self.name_ids.get(id as usize).copied()
    }

    // ── Names and metadata ────────────────────────────────────────────────

    /// The street name of `name_id`; `""` for [`NameId::INVALID`].
    pub fn get_name_for_id(&self, name_id: NameId) -> StoreResult<Cow<'_, str>> {
        if !name_id.is_valid() {
            return Ok(Cow::Borrowed(""));
        }
        let range = self.names.get_range(name_id.0)?;
        let bytes = self
            .name_chars
            .get(range.start as usize..range.end as usize)
            .ok_or_else(|| StoreError::malformed("names", format!("range {range:?} of name {}", name_id.0)))?;
        Ok(String::from_utf8_lossy(bytes))
    }

    pub fn names(&self) -> &RangeTable {
        &self.names
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    // ── Spatial ───────────────────────────────────────────────────────────

    pub fn rtree(&self) -> &StaticRTree {
        &self.rtree
    }

    pub fn leaf_path(&self) -> &Path {
        self.rtree.leaf_path()
    }

    pub fn locate_closest_endpoint(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        zoom: u32,
    ) -> StoreResult<Option<FixedPointCoordinate>> {
        Ok(self.rtree.locate_closest_endpoint(reader, coordinate, zoom)?)
    }

    pub fn find_phantom_node(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        zoom: u32,
    ) -> StoreResult<Option<PhantomNode>> {
        Ok(self.rtree.find_phantom_node(reader, coordinate, zoom)?)
    }

    pub fn incremental_find_phantom_nodes(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        max_results: usize,
    ) -> StoreResult<Vec<PhantomNode>> {
        Ok(self.rtree.incremental_find_phantom_nodes(reader, coordinate, max_results)?)
    }

    pub fn incremental_find_phantom_nodes_with_distance(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        max_distance: f64,
        min_results: usize,
        max_results: usize,
    ) -> StoreResult<Vec<(PhantomNode, f64)>> {
        Ok(self.rtree.incremental_find_phantom_nodes_with_distance(
            reader,
            coordinate,
            max_distance,
            min_results,
            max_results,
        )?)
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("checksum", &self.checksum)
            .field("timestamp", &self.timestamp)
            .field("rtree", &self.rtree)
            .finish()
    }
}
