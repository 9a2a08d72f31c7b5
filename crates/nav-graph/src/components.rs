//! Strongly connected components of the road network.
//!
//! [`ComponentClassifier`] runs an iterative Tarjan traversal over the
//! directed node-based graph.  Moves that a turn restriction forbids are not
//! followed, and a barrier node (bollard, gate) entered from a neighbour can
//! only be left back towards that neighbour.  Components smaller than the
//! tiny threshold are fragments the spatial index should avoid snapping to
//! when something better is in reach.
//!
//! The classification is advisory: it never removes nodes or edges.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use nav_core::coordinate::euclidean_distance;
use nav_core::{EdgeId, FixedPointCoordinate, NodeId};

use crate::{EdgeRecord, GraphError, GraphResult, InputEdge, NodeBasedEdge, StaticGraph};

/// Components with fewer members than this are "tiny".
pub const TINY_COMPONENT_THRESHOLD: u32 = 1000;

// ── Turn restrictions ─────────────────────────────────────────────────────────

/// Forbids (or, with `is_only`, mandates) the move `from → via → to`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TurnRestriction {
    pub from:    NodeId,
    pub via:     NodeId,
    pub to:      NodeId,
    pub is_only: bool,
}

/// `(from, via)` → restricted continuations.
///
/// An `only` restriction replaces every earlier entry for its `(from, via)`
/// pair, and later entries for that pair are ignored.
#[derive(Default, Debug)]
pub struct RestrictionMap {
    map: FxHashMap<(NodeId, NodeId), Vec<(NodeId, bool)>>,
}

impl RestrictionMap {
    pub fn new(restrictions: &[TurnRestriction]) -> Self {
        let mut map = Self::default();
        for r in restrictions {
            map.insert(*r);
        }
        map
    }

    pub fn insert(&mut self, r: TurnRestriction) {
        let entries = self.map.entry((r.from, r.via)).or_default();
        if entries.iter().any(|&(_, only)| only) {
            return;
        }
        if r.is_only {
            entries.clear();
        }
        entries.push((r.to, r.is_only));
    }

    /// Whether arriving at `via` from `from` may continue to `to`.
    pub fn allows(&self, from: NodeId, via: NodeId, to: NodeId) -> bool {
        let Some(entries) = self.map.get(&(from, via)) else {
            return true;
        };
        match entries.iter().find(|&&(_, only)| only) {
            Some(&(only_to, _)) => only_to == to,
            None => entries.iter().all(|&(t, _)| t != to),
        }
    }

    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ── ComponentInfo ─────────────────────────────────────────────────────────────

/// Per-node component membership produced by [`ComponentClassifier::run`].
#[derive(Clone, Debug)]
pub struct ComponentInfo {
    component_id:        Vec<u32>,
    component_size:      Vec<u32>,
    tiny_threshold:      u32,
    /// Number of components found.
    pub component_count: u32,
    /// Components with exactly one member.
    pub size_one_count:  u32,
    /// Length of all road segments in metres, each segment counted once.
    pub total_length_m:  f64,
}

impl ComponentInfo {
    #[inline]
    pub fn component_of(&self, node: NodeId) -> u32 {
        self.component_id[node.index()]
    }

    /// Member count of `node`'s component.
    #[inline]
    pub fn size_of(&self, node: NodeId) -> u32 {
        self.component_size[self.component_of(node) as usize]
    }

    #[inline]
    pub fn is_tiny(&self, node: NodeId) -> bool {
        self.size_of(node) < self.tiny_threshold
    }

    /// Component tag stored on the spatial segment `u → v`.
    ///
    /// `0` when both endpoints lie in big components; otherwise one more
    /// than the id of the smaller of the two components, so that a
    /// non-zero tag always marks a tiny fragment.
    pub fn segment_component_id(&self, u: NodeId, v: NodeId) -> u32 {
        let (size_u, size_v) = (self.size_of(u), self.size_of(v));
        if size_u.min(size_v) >= self.tiny_threshold {
            return 0;
        }
        let smaller = if size_v < size_u { v } else { u };
        self.component_of(smaller) + 1
    }

    pub fn node_count(&self) -> usize {
        self.component_id.len()
    }
}

// ── ComponentClassifier ───────────────────────────────────────────────────────

/// Adjacency record for the traversal graph.
#[derive(Copy, Clone, PartialEq, Eq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ComponentEdge {
    pub target: NodeId,
    pub weight: i32,
}

impl EdgeRecord for ComponentEdge {
    type Data = i32;

    fn from_parts(target: NodeId, weight: i32) -> Self {
        Self { target, weight }
    }

    fn target(&self) -> NodeId {
        self.target
    }

    fn data(&self) -> i32 {
        self.weight
    }
}

const UNVISITED: u32 = u32::MAX;

/// One DFS level: the node, the node it was entered from, and the next
/// outgoing edge to try.
struct Frame {
    node:      NodeId,
    parent:    NodeId,
    next_edge: u32,
}

/// Configure with the builder methods, then call [`run`](Self::run).
pub struct ComponentClassifier<'a> {
    coordinates:    &'a [FixedPointCoordinate],
    edges:          &'a [NodeBasedEdge],
    restrictions:   RestrictionMap,
    barriers:       FxHashSet<NodeId>,
    tiny_threshold: u32,
}

impl<'a> ComponentClassifier<'a> {
    /// `coordinates` defines the node set; `edges` should already be
    /// normalised.
    pub fn new(coordinates: &'a [FixedPointCoordinate], edges: &'a [NodeBasedEdge]) -> Self {
        Self {
            coordinates,
            edges,
            restrictions:   RestrictionMap::default(),
            barriers:       FxHashSet::default(),
            tiny_threshold: TINY_COMPONENT_THRESHOLD,
        }
    }

    pub fn with_restrictions(mut self, restrictions: &[TurnRestriction]) -> Self {
        self.restrictions = RestrictionMap::new(restrictions);
        self
    }

    pub fn with_barriers(mut self, barriers: impl IntoIterator<Item = NodeId>) -> Self {
        self.barriers = barriers.into_iter().collect();
        self
    }

    pub fn with_tiny_threshold(mut self, threshold: u32) -> Self {
        self.tiny_threshold = threshold;
        self
    }

    pub fn run(&self) -> GraphResult<ComponentInfo> {
        let node_count = self.coordinates.len();
        if let Some(bad) = self
            .edges
            .iter()
            .flat_map(|e| [e.source, e.target])
            .find(|n| n.index() >= node_count)
        {
            return Err(GraphError::NodeOutOfRange { node: bad, node_count });
        }
        let graph = self.traversal_graph(node_count)?;

        let mut index = vec![UNVISITED; node_count];
        let mut lowlink = vec![0u32; node_count];
        let mut on_stack = vec![false; node_count];
        let mut stack: Vec<NodeId> = Vec::new();
        let mut calls: Vec<Frame> = Vec::new();
        let mut next_index = 0u32;

        let mut component_id = vec![0u32; node_count];
        let mut component_size: Vec<u32> = Vec::new();

        for root in 0..node_count as u32 {
            let root = NodeId(root);
            if index[root.index()] != UNVISITED {
                continue;
            }

            index[root.index()] = next_index;
            lowlink[root.index()] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root.index()] = true;
            calls.push(Frame { node: root, parent: root, next_edge: graph.begin_edges(root).0 });

            while let Some(frame) = calls.last_mut() {
                let v = frame.node;

                if frame.next_edge < graph.end_edges(v).0 {
                    let e = EdgeId(frame.next_edge);
                    frame.next_edge += 1;
                    let w = graph.target(e);
                    if !self.may_continue(frame.parent, v, w) {
                        continue;
                    }
                    if index[w.index()] == UNVISITED {
                        index[w.index()] = next_index;
                        lowlink[w.index()] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w.index()] = true;
                        calls.push(Frame { node: w, parent: v, next_edge: graph.begin_edges(w).0 });
                    } else if on_stack[w.index()] {
                        lowlink[v.index()] = lowlink[v.index()].min(index[w.index()]);
                    }
                    continue;
                }

                calls.pop();
                if let Some(caller) = calls.last() {
                    let u = caller.node.index();
                    lowlink[u] = lowlink[u].min(lowlink[v.index()]);
                }

                if lowlink[v.index()] == index[v.index()] {
                    let id = component_size.len() as u32;
                    let mut size = 0u32;
                    while let Some(w) = stack.pop() {
                        on_stack[w.index()] = false;
                        component_id[w.index()] = id;
                        size += 1;
                        if w == v {
                            break;
                        }
                    }
                    component_size.push(size);
                }
            }
        }

        let component_count = component_size.len() as u32;
        let size_one_count = component_size.iter().filter(|&&s| s == 1).count() as u32;
        let total_length_m = self
            .edges
            .iter()
            .map(|e| {
                euclidean_distance(self.coordinates[e.source.index()], self.coordinates[e.target.index()])
                    as f64
            })
            .sum();

        info!(
            nodes = node_count,
            components = component_count,
            size_one = size_one_count,
            total_length_km = total_length_m / 1000.0,
            "classified connected components"
        );

        Ok(ComponentInfo {
            component_id,
            component_size,
            tiny_threshold: self.tiny_threshold,
            component_count,
            size_one_count,
            total_length_m,
        })
    }

    /// Directed adjacency honouring each edge's open directions.
    fn traversal_graph(&self, node_count: usize) -> GraphResult<StaticGraph<ComponentEdge>> {
        let mut input = Vec::with_capacity(self.edges.len() * 2);
        for e in self.edges {
            if e.is_self_loop() {
                continue;
            }
            if e.forward {
                input.push(InputEdge { source: e.source, target: e.target, data: e.weight });
            }
            if e.backward {
                input.push(InputEdge { source: e.target, target: e.source, data: e.weight });
            }
        }
        StaticGraph::build(node_count, input)
    }

    /// Whether the traversal, standing at `via` after arriving from `from`,
    /// may move on to `to`.  The root of a DFS tree has `from == via`.
    fn may_continue(&self, from: NodeId, via: NodeId, to: NodeId) -> bool {
        if from == via {
            return true;
        }
        if self.barriers.contains(&via) {
            return to == from;
        }
        self.restrictions.allows(from, via, to)
    }
}
