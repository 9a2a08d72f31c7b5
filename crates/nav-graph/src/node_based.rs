//! Node-based road edges and their normalisation.
//!
//! Ingestion emits one record per way segment in whatever orientation the
//! source data used, including duplicates where ways overlap.
//! [`normalize_edges`] turns that into the canonical form the component
//! classifier and the spatial index are built from:
//!
//! 1. orient every edge so `source <= target`, swapping its direction flags;
//! 2. drop self-loops and edges open in neither direction;
//! 3. sort by `(source, target)`;
//! 4. merge parallel edges: per direction the cheapest open edge wins.  A
//!    pair whose cheapest forward and backward edges coincide (or agree in
//!    weight, name and mode) stays one bidirectional edge; otherwise it is
//!    split into two one-way edges.

use nav_core::{NameId, NodeId, TravelMode};

/// One road segment between two graph nodes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct NodeBasedEdge {
    pub source:      NodeId,
    pub target:      NodeId,
    pub weight:      i32,
    pub name_id:     NameId,
    pub forward:     bool,
    pub backward:    bool,
    pub travel_mode: TravelMode,
}

impl NodeBasedEdge {
    pub fn new(source: NodeId, target: NodeId, weight: i32) -> Self {
        Self {
            source,
            target,
            weight,
            name_id: NameId::INVALID,
            forward: true,
            backward: true,
            travel_mode: TravelMode::DEFAULT,
        }
    }

    pub fn one_way(source: NodeId, target: NodeId, weight: i32) -> Self {
        Self { backward: false, ..Self::new(source, target, weight) }
    }

    /// The same segment seen from the other end.
    pub fn reversed(self) -> Self {
        Self {
            source: self.target,
            target: self.source,
            forward: self.backward,
            backward: self.forward,
            ..self
        }
    }

    #[inline]
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    fn same_attributes(&self, other: &Self) -> bool {
        self.weight == other.weight
            && self.name_id == other.name_id
            && self.travel_mode == other.travel_mode
    }
}

/// Canonicalise an ingestion edge list.  See the module docs.
pub fn normalize_edges(mut edges: Vec<NodeBasedEdge>) -> Vec<NodeBasedEdge> {
    for e in edges.iter_mut() {
        if e.source > e.target {
            *e = e.reversed();
        }
    }
    edges.retain(|e| !e.is_self_loop() && (e.forward || e.backward));
    edges.sort_by_key(|e| (e.source, e.target));

    let mut out = Vec::with_capacity(edges.len());
    for group in edges.chunk_by(|a, b| (a.source, a.target) == (b.source, b.target)) {
        merge_parallel(group, &mut out);
    }
    out
}

fn merge_parallel(group: &[NodeBasedEdge], out: &mut Vec<NodeBasedEdge>) {
    let cheapest = |open: fn(&NodeBasedEdge) -> bool| {
        group
            .iter()
            .enumerate()
            .filter(|(_, e)| open(e))
            .min_by_key(|(i, e)| (e.weight, *i))
            .map(|(i, _)| i)
    };
    let best_forward = cheapest(|e| e.forward);
    let best_backward = cheapest(|e| e.backward);

    match (best_forward, best_backward) {
        (Some(f), Some(b)) if f == b || group[f].same_attributes(&group[b]) => {
            out.push(NodeBasedEdge { forward: true, backward: true, ..group[f] });
        }
        (f, b) => {
            if let Some(f) = f {
                out.push(NodeBasedEdge { forward: true, backward: false, ..group[f] });
            }
            if let Some(b) = b {
                out.push(NodeBasedEdge { forward: false, backward: true, ..group[b] });
            }
        }
    }
}
