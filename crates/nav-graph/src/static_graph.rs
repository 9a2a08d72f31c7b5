//! Immutable routing graph in CSR layout.
//!
//! # Data layout
//!
//! The graph is two flat arrays.  The node array has `node_count + 1`
//! entries; the last is a sentinel so that the outgoing edges of node `n`
//! are always
//!
//! ```text
//! edges[ nodes[n].first_edge .. nodes[n + 1].first_edge ]
//! ```
//!
//! Each edge record stores its target and a payload.  Both arrays are
//! `Pod` and live in a [`Storage`], so the same graph type serves a freshly
//! built in-memory graph and a view adopted from a shared region.

use std::fmt::Debug;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use nav_core::{EdgeId, NodeId, Storage};

use crate::{GraphError, GraphResult};

// ── Records ───────────────────────────────────────────────────────────────────

/// CSR row pointer.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct GraphNodeEntry {
    pub first_edge: u32,
}

/// An edge record that can live in a [`StaticGraph`].
pub trait EdgeRecord: Pod + Send + Sync {
    type Data: Copy + PartialEq + Debug;

    fn from_parts(target: NodeId, data: Self::Data) -> Self;
    fn target(&self) -> NodeId;
    fn data(&self) -> Self::Data;
}

/// Edge payloads with a routing weight, for
/// [`find_smallest_edge`](StaticGraph::find_smallest_edge).
pub trait EdgeDistance {
    fn distance(&self) -> i32;
}

/// Payload of a query-graph edge.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct QueryEdgeData {
    /// Edge-based node id, or the middle node of a shortcut.
    pub id:       u32,
    pub distance: i32,
    /// Bit set of `QueryEdgeData::SHORTCUT | FORWARD | BACKWARD`.
    pub flags:    u32,
}

impl QueryEdgeData {
    pub const SHORTCUT: u32 = 1;
    pub const FORWARD:  u32 = 1 << 1;
    pub const BACKWARD: u32 = 1 << 2;

    pub fn new(id: u32, distance: i32, shortcut: bool, forward: bool, backward: bool) -> Self {
        let mut flags = 0;
        if shortcut { flags |= Self::SHORTCUT; }
        if forward  { flags |= Self::FORWARD; }
        if backward { flags |= Self::BACKWARD; }
        Self { id, distance, flags }
    }

    #[inline] pub fn shortcut(&self) -> bool { self.flags & Self::SHORTCUT != 0 }
    #[inline] pub fn forward(&self)  -> bool { self.flags & Self::FORWARD != 0 }
    #[inline] pub fn backward(&self) -> bool { self.flags & Self::BACKWARD != 0 }
}

impl EdgeDistance for QueryEdgeData {
    #[inline]
    fn distance(&self) -> i32 {
        self.distance
    }
}

/// Edge record of the query graph stored in `.hsgr` files.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct QueryEdge {
    pub target: NodeId,
    pub data:   QueryEdgeData,
}

impl EdgeRecord for QueryEdge {
    type Data = QueryEdgeData;

    #[inline]
    fn from_parts(target: NodeId, data: QueryEdgeData) -> Self {
        Self { target, data }
    }

    #[inline]
    fn target(&self) -> NodeId {
        self.target
    }

    #[inline]
    fn data(&self) -> QueryEdgeData {
        self.data
    }
}

/// A directed edge handed to [`StaticGraph::build`].
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct InputEdge<D> {
    pub source: NodeId,
    pub target: NodeId,
    pub data:   D,
}

// ── StaticGraph ───────────────────────────────────────────────────────────────

/// Immutable adjacency graph; safe to query from any number of threads.
pub struct StaticGraph<E: EdgeRecord> {
    nodes: Storage<GraphNodeEntry>,
    edges: Storage<E>,
}

impl<E: EdgeRecord> StaticGraph<E> {
    /// Build from an unsorted edge list.
    ///
    /// Edges are stably sorted by `(source, target)`, so parallel edges keep
    /// their input order.  Fails if an endpoint is `>= node_count`.
    pub fn build(node_count: usize, mut input: Vec<InputEdge<E::Data>>) -> GraphResult<Self> {
        if let Some(bad) = input
            .iter()
            .flat_map(|e| [e.source, e.target])
            .find(|n| n.index() >= node_count)
        {
            return Err(GraphError::NodeOutOfRange { node: bad, node_count });
        }
        u32::try_from(input.len())
            .map_err(|_| GraphError::InvalidLayout("more than u32::MAX edges".into()))?;

        input.sort_by_key(|e| (e.source, e.target));

        // Row pointer: count per source, then prefix-sum.
        let mut nodes = vec![GraphNodeEntry::default(); node_count + 1];
        for e in &input {
            nodes[e.source.index() + 1].first_edge += 1;
        }
        for i in 1..=node_count {
            nodes[i].first_edge += nodes[i - 1].first_edge;
        }
        debug_assert_eq!(nodes[node_count].first_edge as usize, input.len());

        let edges: Vec<E> = input.iter().map(|e| E::from_parts(e.target, e.data)).collect();

        Ok(Self { nodes: nodes.into(), edges: edges.into() })
    }

    /// Wrap already-built, already-sorted arrays without copying.
    ///
    /// Only the array lengths are checked: the node array must hold the
    /// sentinel entry and the sentinel must equal the edge count.
    pub fn adopt(nodes: Storage<GraphNodeEntry>, edges: Storage<E>) -> GraphResult<Self> {
        let Some(last) = nodes.last() else {
            return Err(GraphError::InvalidLayout("node array lacks the sentinel entry".into()));
        };
        if last.first_edge as usize != edges.len() {
            return Err(GraphError::InvalidLayout(format!(
                "sentinel points at edge {} but {} edges are present",
                last.first_edge,
                edges.len()
            )));
        }
        Ok(Self { nodes, edges })
    }

    // ── Dimensions ────────────────────────────────────────────────────────

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[GraphNodeEntry] {
        &self.nodes
    }

    pub fn edges(&self) -> &[E] {
        &self.edges
    }

    // ── Adjacency ─────────────────────────────────────────────────────────

    #[inline]
    pub fn begin_edges(&self, node: NodeId) -> EdgeId {
        EdgeId(self.nodes[node.index()].first_edge)
    }

    #[inline]
    pub fn end_edges(&self, node: NodeId) -> EdgeId {
        EdgeId(self.nodes[node.index() + 1].first_edge)
    }

    /// Contiguous range of raw edge indices leaving `node`.
    #[inline]
    pub fn adjacent_edge_range(&self, node: NodeId) -> Range<u32> {
        self.begin_edges(node).0..self.end_edges(node).0
    }

    /// The outgoing edges of `node`.  No heap allocation.
    #[inline]
    pub fn adjacent_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + use<E> {
        self.adjacent_edge_range(node).map(EdgeId)
    }

    #[inline]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.adjacent_edge_range(node).len()
    }

    #[inline]
    pub fn target(&self, edge: EdgeId) -> NodeId {
        self.edges[edge.index()].target()
    }

    #[inline]
    pub fn edge_data(&self, edge: EdgeId) -> E::Data {
        self.edges[edge.index()].data()
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    /// First edge `from → to` in adjacency order.
    pub fn find_edge(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.adjacent_edges(from).find(|&e| self.target(e) == to)
    }

    /// `find_edge(from, to)`, falling back to `find_edge(to, from)`.
    pub fn find_edge_either_direction(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.find_edge(from, to).or_else(|| self.find_edge(to, from))
    }

    /// Like [`find_edge_either_direction`](Self::find_edge_either_direction),
    /// also reporting whether the edge found runs `to → from`.
    pub fn find_edge_indicate_if_reverse(&self, from: NodeId, to: NodeId) -> Option<(EdgeId, bool)> {
        self.find_edge(from, to)
            .map(|e| (e, false))
            .or_else(|| self.find_edge(to, from).map(|e| (e, true)))
    }
}

impl<E> StaticGraph<E>
where
    E: EdgeRecord,
    E::Data: EdgeDistance,
{
    /// Among parallel edges `from → to`, the one with the least distance.
    /// The first one wins on ties.
    pub fn find_smallest_edge(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        let mut best: Option<(EdgeId, i32)> = None;
        for e in self.adjacent_edges(from) {
            if self.target(e) != to {
                continue;
            }
            let distance = self.edge_data(e).distance();
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((e, distance));
            }
        }
        best.map(|(e, _)| e)
    }
}

impl<E: EdgeRecord> Clone for StaticGraph<E> {
    fn clone(&self) -> Self {
        Self { nodes: self.nodes.clone(), edges: self.edges.clone() }
    }
}

impl<E: EdgeRecord> std::fmt::Debug for StaticGraph<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
