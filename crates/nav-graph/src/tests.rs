//! Unit tests for nav-graph.
//!
//! Graphs are hand-built so each test can state its expected adjacency.

#[cfg(test)]
mod helpers {
    use nav_core::{FixedPointCoordinate, NodeId};

    use crate::{InputEdge, QueryEdgeData};

    pub fn edge(source: u32, target: u32, distance: i32) -> InputEdge<QueryEdgeData> {
        InputEdge {
            source: NodeId(source),
            target: NodeId(target),
            data:   QueryEdgeData::new(target * 10, distance, false, true, false),
        }
    }

    /// Nodes on a line of latitude 0, one millidegree apart.
    pub fn line_coordinates(n: u32) -> Vec<FixedPointCoordinate> {
        (0..n).map(|i| FixedPointCoordinate::new(0, i as i32 * 1000)).collect()
    }
}

// ── StaticGraph ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod static_graph {
    use std::sync::Arc;

    use nav_core::{ByteRegion, EdgeId, HeapRegion, MappedSlice, NodeId};
    use proptest::prelude::*;

    use super::helpers::edge;
    use crate::{GraphError, GraphNodeEntry, QueryEdge, StaticGraph};

    fn diamond() -> StaticGraph<QueryEdge> {
        // 0 → 1, 0 → 2, 1 → 3, 2 → 3, plus a heavier parallel 0 → 1.
        StaticGraph::build(
            4,
            vec![edge(2, 3, 5), edge(0, 2, 7), edge(0, 1, 9), edge(1, 3, 1), edge(0, 1, 4)],
        )
        .unwrap()
    }

    #[test]
    fn empty_graph() {
        let g = StaticGraph::<QueryEdge>::build(0, Vec::new()).unwrap();
        assert_eq!(g.node_count(), 0);
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.nodes().len(), 1);
    }

    #[test]
    fn csr_layout() {
        let g = diamond();
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 5);
        assert_eq!(g.out_degree(NodeId(0)), 3);
        assert_eq!(g.out_degree(NodeId(3)), 0);
        for n in 0..4 {
            assert_eq!(g.end_edges(NodeId(n)), g.begin_edges(NodeId(n + 1)));
        }
        let targets: Vec<_> = g.adjacent_edges(NodeId(0)).map(|e| g.target(e)).collect();
        assert_eq!(targets, vec![NodeId(1), NodeId(1), NodeId(2)]);
    }

    #[test]
    fn find_edge_returns_first_match() {
        let g = diamond();
        let e = g.find_edge(NodeId(0), NodeId(1)).unwrap();
        assert_eq!(g.edge_data(e).distance, 9);
        assert_eq!(g.find_edge(NodeId(3), NodeId(0)), None);
    }

    #[test]
    fn find_smallest_edge_among_parallels() {
        let g = diamond();
        let e = g.find_smallest_edge(NodeId(0), NodeId(1)).unwrap();
        assert_eq!(g.edge_data(e).distance, 4);
    }

    #[test]
    fn either_direction_lookup() {
        let g = diamond();
        let e = g.find_edge_either_direction(NodeId(3), NodeId(1)).unwrap();
        assert_eq!(g.target(e), NodeId(3));
        assert_eq!(
            g.find_edge_indicate_if_reverse(NodeId(3), NodeId(1)),
            Some((e, true))
        );
        let fwd = g.find_edge(NodeId(1), NodeId(3)).unwrap();
        assert_eq!(g.find_edge_indicate_if_reverse(NodeId(1), NodeId(3)), Some((fwd, false)));
        assert_eq!(g.find_edge_either_direction(NodeId(1), NodeId(2)), None);
    }

    #[test]
    fn out_of_range_endpoint_rejected() {
        let err = StaticGraph::<QueryEdge>::build(2, vec![edge(0, 5, 1)]).unwrap_err();
        assert!(matches!(err, GraphError::NodeOutOfRange { node: NodeId(5), node_count: 2 }));
    }

    #[test]
    fn adopt_checks_sentinel() {
        let g = diamond();
        let mut nodes = g.nodes().to_vec();
        nodes.last_mut().unwrap().first_edge = 4;
        let err = StaticGraph::adopt(nodes.into(), g.edges().to_vec().into()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidLayout(_)));

        let err = StaticGraph::<QueryEdge>::adopt(Vec::new().into(), Vec::new().into()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidLayout(_)));
    }

    #[test]
    fn adopt_over_mapped_region() {
        let g = diamond();
        let node_bytes: &[u8] = bytemuck::cast_slice(g.nodes());
        let edge_bytes: &[u8] = bytemuck::cast_slice(g.edges());
        let edge_offset = node_bytes.len().next_multiple_of(8);

        let mut region = HeapRegion::zeroed(edge_offset + edge_bytes.len());
        region.bytes_mut()[..node_bytes.len()].copy_from_slice(node_bytes);
        region.bytes_mut()[edge_offset..].copy_from_slice(edge_bytes);
        let region: Arc<dyn ByteRegion> = Arc::new(region);

        let nodes = MappedSlice::<GraphNodeEntry>::new(Arc::clone(&region), 0, g.nodes().len()).unwrap();
        let edges = MappedSlice::<QueryEdge>::new(region, edge_offset, g.edge_count()).unwrap();
        let mapped = StaticGraph::adopt(nodes.into(), edges.into()).unwrap();

        assert_eq!(mapped.out_degree(NodeId(0)), 3);
        assert_eq!(mapped.target(EdgeId(4)), NodeId(3));
    }

    fn arb_graph() -> impl Strategy<Value = (usize, Vec<(u32, u32, i32)>)> {
        (1usize..20).prop_flat_map(|n| {
            let node = 0..n as u32;
            (Just(n), prop::collection::vec((node.clone(), node, -100i32..100), 0..80))
        })
    }

    proptest! {
        #[test]
        fn adjacency_fidelity((n, raw) in arb_graph()) {
            let input = raw.iter().map(|&(s, t, d)| edge(s, t, d)).collect::<Vec<_>>();
            let g = StaticGraph::<QueryEdge>::build(n, input.clone()).unwrap();

            for e in &input {
                let found = g
                    .adjacent_edges(e.source)
                    .find(|&id| g.target(id) == e.target && g.edge_data(id) == e.data);
                prop_assert!(found.is_some());
                let first = g.find_edge(e.source, e.target).unwrap();
                prop_assert_eq!(g.target(first), e.target);
            }
            for s in 0..n as u32 {
                let expected = raw.iter().filter(|r| r.0 == s).count();
                prop_assert_eq!(g.out_degree(NodeId(s)), expected);
            }
        }
    }
}

// ── .hsgr artifact ────────────────────────────────────────────────────────────

#[cfg(test)]
mod hsgr {
    use nav_core::{CoreError, Fingerprint, NodeId};

    use super::helpers::edge;
    use crate::hsgr::open_hsgr;
    use crate::{GraphError, QueryEdge, StaticGraph, read_hsgr, write_hsgr};

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("berlin.hsgr");
        let g = StaticGraph::<QueryEdge>::build(3, vec![edge(0, 1, 3), edge(1, 2, 4)]).unwrap();
        write_hsgr(&path, 0xC0FFEE, &g).unwrap();

        let (header, back) = read_hsgr(&path).unwrap();
        assert_eq!(header.checksum, 0xC0FFEE);
        assert_eq!(header.fingerprint, Fingerprint::current());
        assert_eq!(header.node_count, 4);
        assert_eq!(header.edge_count, 2);
        assert_eq!(back.edges(), g.edges());
        assert_eq!(back.find_edge(NodeId(1), NodeId(2)), g.find_edge(NodeId(1), NodeId(2)));
    }

    #[test]
    fn header_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.hsgr");
        let g = StaticGraph::<QueryEdge>::build(1, Vec::new()).unwrap();
        write_hsgr(&path, 7, &g).unwrap();
        let (header, _) = open_hsgr(&path).unwrap();
        assert_eq!((header.checksum, header.node_count, header.edge_count), (7, 2, 0));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_hsgr(&dir.path().join("nope.hsgr")).unwrap_err();
        assert!(matches!(err, GraphError::Core(CoreError::MissingOrEmptyFile { .. })));
    }

    #[test]
    fn truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.hsgr");
        let g = StaticGraph::<QueryEdge>::build(3, vec![edge(0, 1, 3), edge(1, 2, 4)]).unwrap();
        write_hsgr(&path, 1, &g).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();
        assert!(matches!(read_hsgr(&path), Err(GraphError::Io(_))));
    }
}

// ── Node-based edges ──────────────────────────────────────────────────────────

#[cfg(test)]
mod node_based {
    use nav_core::NodeId;

    use crate::{NodeBasedEdge, normalize_edges};

    #[test]
    fn orients_and_swaps_flags() {
        let out = normalize_edges(vec![NodeBasedEdge::one_way(NodeId(5), NodeId(2), 10)]);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].source, out[0].target), (NodeId(2), NodeId(5)));
        assert!(!out[0].forward);
        assert!(out[0].backward);
    }

    #[test]
    fn drops_self_loops_and_closed_edges() {
        let closed = NodeBasedEdge { forward: false, backward: false, ..NodeBasedEdge::new(NodeId(0), NodeId(1), 1) };
        let out = normalize_edges(vec![NodeBasedEdge::new(NodeId(3), NodeId(3), 1), closed]);
        assert!(out.is_empty());
    }

    #[test]
    fn equal_flags_keep_cheapest() {
        let out = normalize_edges(vec![
            NodeBasedEdge::new(NodeId(0), NodeId(1), 20),
            NodeBasedEdge::new(NodeId(1), NodeId(0), 12),
            NodeBasedEdge::new(NodeId(0), NodeId(1), 15),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].weight, 12);
        assert!(out[0].forward && out[0].backward);
    }

    #[test]
    fn cheaper_one_way_splits_bidirectional() {
        let out = normalize_edges(vec![
            NodeBasedEdge::new(NodeId(0), NodeId(1), 10),
            NodeBasedEdge::one_way(NodeId(0), NodeId(1), 5),
        ]);
        assert_eq!(out.len(), 2);
        assert!(out[0].forward && !out[0].backward);
        assert_eq!(out[0].weight, 5);
        assert!(!out[1].forward && out[1].backward);
        assert_eq!(out[1].weight, 10);
    }

    #[test]
    fn dearer_one_way_is_absorbed() {
        let out = normalize_edges(vec![
            NodeBasedEdge::one_way(NodeId(0), NodeId(1), 50),
            NodeBasedEdge::new(NodeId(0), NodeId(1), 10),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].weight, 10);
        assert!(out[0].forward && out[0].backward);
    }

    #[test]
    fn output_is_sorted() {
        let out = normalize_edges(vec![
            NodeBasedEdge::new(NodeId(4), NodeId(3), 1),
            NodeBasedEdge::new(NodeId(0), NodeId(9), 1),
            NodeBasedEdge::new(NodeId(2), NodeId(1), 1),
        ]);
        let keys: Vec<_> = out.iter().map(|e| (e.source.0, e.target.0)).collect();
        assert_eq!(keys, vec![(0, 9), (1, 2), (3, 4)]);
    }
}

// ── Component classification ──────────────────────────────────────────────────

#[cfg(test)]
mod components {
    use nav_core::NodeId;

    use super::helpers::line_coordinates;
    use crate::{ComponentClassifier, NodeBasedEdge, RestrictionMap, TurnRestriction};

    fn one_way_cycle() -> Vec<NodeBasedEdge> {
        vec![
            NodeBasedEdge::one_way(NodeId(0), NodeId(1), 1),
            NodeBasedEdge::one_way(NodeId(1), NodeId(2), 1),
            NodeBasedEdge::one_way(NodeId(2), NodeId(0), 1),
        ]
    }

    #[test]
    fn cycle_and_dangling_one_way() {
        let coords = line_coordinates(4);
        let mut edges = one_way_cycle();
        edges.push(NodeBasedEdge::one_way(NodeId(3), NodeId(0), 1));

        let info = ComponentClassifier::new(&coords, &edges).run().unwrap();
        assert_eq!(info.component_count, 2);
        assert_eq!(info.size_one_count, 1);
        assert_eq!(info.component_of(NodeId(0)), info.component_of(NodeId(2)));
        assert_eq!(info.size_of(NodeId(1)), 3);
        assert_eq!(info.size_of(NodeId(3)), 1);
    }

    #[test]
    fn isolated_nodes_are_their_own_components() {
        let coords = line_coordinates(3);
        let info = ComponentClassifier::new(&coords, &[]).run().unwrap();
        assert_eq!(info.component_count, 3);
        assert_eq!(info.size_one_count, 3);
        assert_eq!(info.total_length_m, 0.0);
    }

    #[test]
    fn restriction_breaks_cycle() {
        let coords = line_coordinates(3);
        let edges = one_way_cycle();
        let no_left = [TurnRestriction { from: NodeId(0), via: NodeId(1), to: NodeId(2), is_only: false }];

        let free = ComponentClassifier::new(&coords, &edges).run().unwrap();
        assert_eq!(free.component_count, 1);

        let restricted = ComponentClassifier::new(&coords, &edges)
            .with_restrictions(&no_left)
            .run()
            .unwrap();
        assert_eq!(restricted.component_count, 3);
    }

    #[test]
    fn only_restriction_wins() {
        let r = |to, is_only| TurnRestriction { from: NodeId(0), via: NodeId(1), to: NodeId(to), is_only };
        let map = RestrictionMap::new(&[r(2, false), r(3, true), r(4, false)]);
        assert_eq!(map.len(), 1);
        assert!(map.allows(NodeId(0), NodeId(1), NodeId(3)));
        assert!(!map.allows(NodeId(0), NodeId(1), NodeId(2)));
        assert!(!map.allows(NodeId(0), NodeId(1), NodeId(4)));
        assert!(map.allows(NodeId(9), NodeId(1), NodeId(2)));
    }

    #[test]
    fn barrier_allows_only_turning_back() {
        let coords = line_coordinates(3);
        let edges = vec![
            NodeBasedEdge::new(NodeId(0), NodeId(1), 1),
            NodeBasedEdge::new(NodeId(1), NodeId(2), 1),
        ];
        let open = ComponentClassifier::new(&coords, &edges).run().unwrap();
        assert_eq!(open.component_count, 1);

        let info = ComponentClassifier::new(&coords, &edges)
            .with_barriers([NodeId(1)])
            .run()
            .unwrap();
        assert_eq!(info.component_count, 2);
        assert_eq!(info.component_of(NodeId(0)), info.component_of(NodeId(1)));
        assert_ne!(info.component_of(NodeId(2)), info.component_of(NodeId(1)));
    }

    #[test]
    fn segment_tags_mark_tiny_fragments() {
        let coords = line_coordinates(7);
        let mut edges: Vec<_> = (0..5)
            .map(|i| NodeBasedEdge::new(NodeId(i), NodeId((i + 1) % 5), 1))
            .collect();
        edges.push(NodeBasedEdge::new(NodeId(5), NodeId(6), 1));
        let edges = crate::normalize_edges(edges);

        let info = ComponentClassifier::new(&coords, &edges)
            .with_tiny_threshold(3)
            .run()
            .unwrap();
        assert!(!info.is_tiny(NodeId(0)));
        assert!(info.is_tiny(NodeId(6)));
        assert_eq!(info.segment_component_id(NodeId(0), NodeId(1)), 0);

        let tag = info.segment_component_id(NodeId(5), NodeId(6));
        assert_eq!(tag, info.component_of(NodeId(5)) + 1);
        assert_eq!(info.segment_component_id(NodeId(0), NodeId(6)), tag);
    }

    #[test]
    fn total_length_counts_each_segment_once() {
        let coords = vec![
            nav_core::FixedPointCoordinate::from_degrees(30.0, -88.0),
            nav_core::FixedPointCoordinate::from_degrees(31.0, -88.0),
        ];
        let edges = vec![NodeBasedEdge::new(NodeId(0), NodeId(1), 1)];
        let info = ComponentClassifier::new(&coords, &edges).run().unwrap();
        assert!((info.total_length_m - 111_226.0).abs() < 500.0, "got {}", info.total_length_m);
    }

    #[test]
    fn unknown_node_rejected() {
        let coords = line_coordinates(2);
        let edges = vec![NodeBasedEdge::new(NodeId(0), NodeId(7), 1)];
        assert!(ComponentClassifier::new(&coords, &edges).run().is_err());
    }

    /// Mutual reachability by breadth-first search from every node.
    fn reachability(n: usize, edges: &[NodeBasedEdge]) -> Vec<Vec<bool>> {
        let mut adjacency = vec![Vec::new(); n];
        for e in edges {
            if e.forward {
                adjacency[e.source.index()].push(e.target.index());
            }
            if e.backward {
                adjacency[e.target.index()].push(e.source.index());
            }
        }
        (0..n)
            .map(|start| {
                let mut seen = vec![false; n];
                let mut queue = std::collections::VecDeque::from([start]);
                seen[start] = true;
                while let Some(v) = queue.pop_front() {
                    for &w in &adjacency[v] {
                        if !seen[w] {
                            seen[w] = true;
                            queue.push_back(w);
                        }
                    }
                }
                seen
            })
            .collect()
    }

    #[test]
    fn agrees_with_reachability_on_random_networks() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..20 {
            let n = rng.gen_range(1..40u32);
            let coords = line_coordinates(n);
            let edges: Vec<NodeBasedEdge> = (0..rng.gen_range(0..n * 2))
                .map(|_| {
                    let (u, v) = (NodeId(rng.gen_range(0..n)), NodeId(rng.gen_range(0..n)));
                    if rng.gen_bool(0.5) { NodeBasedEdge::one_way(u, v, 1) } else { NodeBasedEdge::new(u, v, 1) }
                })
                .collect();

            let info = ComponentClassifier::new(&coords, &edges).run().unwrap();
            let reach = reachability(n as usize, &edges);
            for u in 0..n {
                for v in 0..n {
                    let same = info.component_of(NodeId(u)) == info.component_of(NodeId(v));
                    let mutual = reach[u as usize][v as usize] && reach[v as usize][u as usize];
                    assert_eq!(same, mutual, "nodes {u} and {v}");
                }
            }
            let sizes: u32 = (0..info.component_count)
                .map(|c| (0..n).filter(|&u| info.component_of(NodeId(u)) == c).count() as u32)
                .sum();
            assert_eq!(sizes, n);
        }
    }
}
