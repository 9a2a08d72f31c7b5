//! Unit tests for nav-spatial.
//!
//! Query answers are checked against linear scans over the same segments.

#[cfg(test)]
mod helpers {
    use nav_core::coordinate::{euclidean_distance, perpendicular_distance};
    use nav_core::{FixedPointCoordinate, NodeId};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    use crate::{RTreeParams, SegmentRecord, StaticRTree};

    /// Segment `id` between nodes `u` and `v`; the id doubles as both
    /// routing node ids so results can be traced back.
    pub fn segment(id: u32, u: u32, v: u32) -> SegmentRecord {
        SegmentRecord {
            forward_node_id: NodeId(id),
            reverse_node_id: NodeId(id),
            forward_weight: 100,
            reverse_weight: 100,
            ..SegmentRecord::between(NodeId(u), NodeId(v))
        }
    }

    pub struct Fixture {
        pub dir:  TempDir,
        pub tree: StaticRTree,
    }

    impl Fixture {
        pub fn tree_path(&self) -> std::path::PathBuf {
            self.dir.path().join("test.ramIndex")
        }

        pub fn leaf_path(&self) -> std::path::PathBuf {
            self.dir.path().join("test.fileIndex")
        }
    }

    pub fn build(coordinates: &[FixedPointCoordinate], segments: &[SegmentRecord], params: RTreeParams) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tree_path = dir.path().join("test.ramIndex");
        let leaf_path = dir.path().join("test.fileIndex");
        StaticRTree::build(segments, coordinates, params, &tree_path, &leaf_path).unwrap();
        let tree = StaticRTree::attach(&tree_path, &leaf_path, coordinates.to_vec().into(), params).unwrap();
        Fixture { dir, tree }
    }

    /// A random walk near Berlin with each node linked to its next one to
    /// three successors.
    pub fn random_network(seed: u64, nodes: usize) -> (Vec<FixedPointCoordinate>, Vec<SegmentRecord>) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let (mut lat, mut lon) = (52.5, 13.4);
        let mut coordinates = Vec::with_capacity(nodes);
        for _ in 0..nodes {
            lat += rng.gen_range(-0.002..0.002);
            lon += rng.gen_range(-0.002..0.002);
            coordinates.push(FixedPointCoordinate::from_degrees(lat, lon));
        }
        let mut segments = Vec::new();
        for u in 0..nodes as u32 - 1 {
            let reach = rng.gen_range(1..=3u32);
            for v in (u + 1..=u + reach).filter(|&v| v < nodes as u32) {
                segments.push(segment(segments.len() as u32, u, v));
            }
        }
        (coordinates, segments)
    }

    pub fn random_queries(seed: u64, count: usize) -> Vec<FixedPointCoordinate> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..count)
            .map(|_| FixedPointCoordinate::from_degrees(rng.gen_range(52.45..52.55), rng.gen_range(13.35..13.45)))
            .collect()
    }

    pub fn segment_distance(
        coordinates: &[FixedPointCoordinate],
        segment: &SegmentRecord,
        query: FixedPointCoordinate,
    ) -> f32 {
        perpendicular_distance(coordinates[segment.u.index()], coordinates[segment.v.index()], query).distance
    }

    /// Sorted distances from `query` to every segment.
    pub fn linear_segment_distances(
        coordinates: &[FixedPointCoordinate],
        segments: &[SegmentRecord],
        query: FixedPointCoordinate,
    ) -> Vec<f32> {
        let mut d: Vec<f32> = segments.iter().map(|s| segment_distance(coordinates, s, query)).collect();
        d.sort_by(f32::total_cmp);
        d
    }

    pub fn linear_endpoint_distance(
        coordinates: &[FixedPointCoordinate],
        segments: &[SegmentRecord],
        query: FixedPointCoordinate,
    ) -> f32 {
        segments
            .iter()
            .flat_map(|s| [s.u, s.v])
            .map(|n| euclidean_distance(query, coordinates[n.index()]))
            .fold(f32::MAX, f32::min)
    }
}

// ── Rectangle ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod rectangle {
    use nav_core::FixedPointCoordinate;
    use nav_core::coordinate::euclidean_distance;
    use proptest::prelude::*;

    use crate::Rectangle;

    fn rect(min_lat: i32, max_lat: i32, min_lon: i32, max_lon: i32) -> Rectangle {
        Rectangle { min_lon, max_lon, min_lat, max_lat }
    }

    #[test]
    fn empty_rectangle_merges_as_identity() {
        let mut r = Rectangle::EMPTY;
        assert!(r.is_empty());
        let other = rect(1, 2, 3, 4);
        r.merge(&other);
        assert_eq!(r, other);
        assert!(other.contains_rect(&Rectangle::EMPTY));
    }

    #[test]
    fn extend_covers_points() {
        let mut r = Rectangle::EMPTY;
        r.extend(FixedPointCoordinate::new(10, -5));
        r.extend(FixedPointCoordinate::new(-3, 7));
        assert_eq!(r, rect(-3, 10, -5, 7));
        assert!(r.contains(FixedPointCoordinate::new(0, 0)));
        assert!(!r.contains(FixedPointCoordinate::new(11, 0)));
        assert_eq!(r.centroid(), FixedPointCoordinate::new(3, 1));
    }

    #[test]
    fn intersection() {
        let a = rect(0, 10, 0, 10);
        assert!(a.intersects(&rect(10, 20, 10, 20)));
        assert!(!a.intersects(&rect(11, 20, 0, 10)));
    }

    #[test]
    fn min_dist_is_zero_inside() {
        let r = rect(52_000_000, 52_100_000, 13_000_000, 13_100_000);
        assert_eq!(r.min_dist(FixedPointCoordinate::new(52_050_000, 13_050_000)), 0.0);
    }

    #[test]
    fn point_rectangle_bounds_equal_point_distance() {
        let p = FixedPointCoordinate::from_degrees(52.52, 13.40);
        let q = FixedPointCoordinate::from_degrees(52.50, 13.45);
        let r = Rectangle::from_point(p);
        let d = euclidean_distance(q, p);
        assert!((r.min_dist(q) - d).abs() < 1e-3);
        assert!((r.min_max_dist(q) - d).abs() < 1e-3);
    }

    #[test]
    fn words_round_trip() {
        let r = rect(-1, 2, -3, 4);
        assert_eq!(Rectangle::from_words(r.to_words()), r);
    }

    proptest! {
        #[test]
        fn bounds_bracket_point_distances(
            lat0 in -60_000_000i32..60_000_000, lon0 in -170_000_000i32..170_000_000,
            h in 0i32..2_000_000, w in 0i32..2_000_000,
            fy in 0.0f64..=1.0, fx in 0.0f64..=1.0,
            qlat in -60_000_000i32..60_000_000, qlon in -170_000_000i32..170_000_000,
        ) {
            let r = rect(lat0, lat0 + h, lon0, lon0 + w);
            let inside = FixedPointCoordinate::new(lat0 + (h as f64 * fy) as i32, lon0 + (w as f64 * fx) as i32);
            let q = FixedPointCoordinate::new(qlat, qlon);
            let lower = r.min_dist(q);
            prop_assert!(lower <= euclidean_distance(q, inside) + 1e-3);
            prop_assert!(lower <= r.min_max_dist(q) + 1e-3);
        }
    }
}

// ── UpperBound ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod upper_bound {
    use crate::UpperBound;

    #[test]
    fn unbounded_until_full() {
        let mut b = UpperBound::new(3);
        assert_eq!(b.get(), f32::MAX);
        b.insert(5.0);
        b.insert(1.0);
        assert_eq!(b.get(), f32::MAX);
        b.insert(3.0);
        assert_eq!(b.get(), 5.0);
    }

    #[test]
    fn keeps_k_smallest() {
        let mut b = UpperBound::new(2);
        for v in [9.0, 4.0, 7.0, 2.0, 8.0] {
            b.insert(v);
        }
        assert_eq!(b.len(), 2);
        assert_eq!(b.get(), 4.0);
    }

    #[test]
    fn zero_capacity_never_bounds() {
        let mut b = UpperBound::new(0);
        b.insert(1.0);
        assert!(b.is_empty());
        assert_eq!(b.get(), f32::MAX);
    }
}

// ── Build & attach ────────────────────────────────────────────────────────────

#[cfg(test)]
mod build {
    use std::fs;

    use nav_core::{CoreError, FixedPointCoordinate, NodeId};
    use proptest::prelude::*;

    use super::helpers::{build, segment};
    use crate::{LeafReader, RTreeParams, Rectangle, SegmentRecord, SpatialError, StaticRTree};

    fn points() -> Vec<FixedPointCoordinate> {
        [(0, 0), (10, 0), (0, 10), (500, 500)].iter().map(|&(lat, lon)| FixedPointCoordinate::new(lat, lon)).collect()
    }

    fn point_segments(n: u32) -> Vec<SegmentRecord> {
        (0..n).map(|i| segment(i, i, i)).collect()
    }

    #[test]
    fn node_count_for_two_leaves() {
        let f = build(&points(), &point_segments(4), RTreeParams::new(2, 2));
        assert_eq!(f.tree.node_count(), 3);
        assert_eq!(f.tree.element_count(), 4);
        let root = f.tree.node(0);
        assert!(!root.children_on_disk());
        assert_eq!(root.child_count(), 2);
        assert!(root.children().iter().all(|&c| f.tree.node(c).children_on_disk()));
    }

    #[test]
    fn single_leaf_is_the_root() {
        let f = build(&points(), &point_segments(4), RTreeParams::default());
        assert_eq!(f.tree.node_count(), 1);
        assert!(f.tree.node(0).children_on_disk());
        assert_eq!(f.tree.node(0).children(), &[0]);
    }

    #[test]
    fn empty_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = StaticRTree::build(
            &[],
            &points(),
            RTreeParams::default(),
            &dir.path().join("t"),
            &dir.path().join("l"),
        )
        .unwrap_err();
        assert!(matches!(err, SpatialError::EmptyInput));
    }

    #[test]
    fn dangling_segment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = StaticRTree::build(
            &[segment(0, 0, 1), segment(1, 1, 9)],
            &points(),
            RTreeParams::default(),
            &dir.path().join("t"),
            &dir.path().join("l"),
        )
        .unwrap_err();
        assert!(matches!(err, SpatialError::InvalidSegment { index: 1, node } if node == NodeId(9)));
    }

    #[test]
    fn bad_params_are_rejected() {
        assert!(RTreeParams::new(1, 8).validate().is_err());
        assert!(RTreeParams::new(4, 0).validate().is_err());
        assert!(RTreeParams::default().validate().is_ok());
    }

    #[test]
    fn missing_tree_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StaticRTree::attach(
            &dir.path().join("absent.ramIndex"),
            &dir.path().join("absent.fileIndex"),
            points().into(),
            RTreeParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SpatialError::Core(CoreError::MissingOrEmptyFile { .. })));
    }

    #[test]
    fn attach_with_other_params_fails() {
        let f = build(&points(), &point_segments(4), RTreeParams::new(2, 2));
        let err = StaticRTree::attach(&f.tree_path(), &f.leaf_path(), points().into(), RTreeParams::new(4, 2))
            .unwrap_err();
        assert!(matches!(err, SpatialError::CorruptTree(_)));
    }

    #[test]
    fn truncated_tree_file_fails() {
        let f = build(&points(), &point_segments(4), RTreeParams::new(2, 2));
        let bytes = fs::read(f.tree_path()).unwrap();
        fs::write(f.tree_path(), &bytes[..bytes.len() - 4]).unwrap();
        let err = StaticRTree::attach(&f.tree_path(), &f.leaf_path(), points().into(), RTreeParams::new(2, 2))
            .unwrap_err();
        assert!(matches!(err, SpatialError::CorruptTree(_)));
    }

    #[test]
    fn adopt_from_node_words() {
        let f = build(&points(), &point_segments(4), RTreeParams::new(2, 2));
        let words = f.tree.node_words().to_vec();
        let adopted =
            StaticRTree::adopt(words.into(), &f.leaf_path(), points().into(), RTreeParams::new(2, 2)).unwrap();
        assert_eq!(adopted.node_count(), 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn parents_contain_children(
            raw in prop::collection::vec((-1_000_000i32..1_000_000, -1_000_000i32..1_000_000), 2..40),
        ) {
            let coordinates: Vec<_> = raw.iter().map(|&(lat, lon)| FixedPointCoordinate::new(lat, lon)).collect();
            let n = coordinates.len() as u32;
            let segments: Vec<_> = (0..n).map(|i| segment(i, i, (i + 1) % n)).collect();
            let params = RTreeParams::new(3, 2);
            let f = build(&coordinates, &segments, params);

            let mut reader = LeafReader::new();
            let mut leaf = Vec::new();
            let mut seen = 0usize;
            for id in 0..f.tree.node_count() as u32 {
                let node = f.tree.node(id);
                let rect = node.rect();
                if node.children_on_disk() {
                    reader.load(f.tree.leaf_path(), node.children()[0], &params, &mut leaf).unwrap();
                    seen += leaf.len();
                    for s in &leaf {
                        prop_assert!(rect.contains(coordinates[s.u.index()]));
                        prop_assert!(rect.contains(coordinates[s.v.index()]));
                    }
                } else {
                    for &child in node.children() {
                        prop_assert!(child > id);
                        prop_assert!(rect.contains_rect(&f.tree.node(child).rect()));
                    }
                }
            }
            prop_assert_eq!(seen, segments.len());

            let mut all = Rectangle::EMPTY;
            coordinates.iter().for_each(|&c| all.extend(c));
            prop_assert_eq!(f.tree.node(0).rect(), all);
        }
    }
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod queries {
    use nav_core::{FixedPointCoordinate, NodeId};

    use proptest::prelude::*;

    use super::helpers::{
        build, linear_endpoint_distance, linear_segment_distances, random_network, random_queries, segment,
        segment_distance,
    };
    use crate::{LeafReader, RTreeParams, SegmentRecord};

    /// Fixed-point offsets of about five kilometres around central Berlin.
    fn near_berlin(spread: i32) -> impl Strategy<Value = FixedPointCoordinate> {
        (-spread..spread, -spread..spread)
            .prop_map(|(dlat, dlon)| FixedPointCoordinate::new(52_500_000 + dlat, 13_400_000 + dlon))
    }

    #[test]
    fn four_points_with_small_leaves() {
        let coordinates: Vec<_> = [(0, 0), (10, 0), (0, 10), (500, 500)]
            .iter()
            .map(|&(lat, lon)| FixedPointCoordinate::new(lat, lon))
            .collect();
        let segments: Vec<_> = (0..4).map(|i| segment(i, i, i)).collect();
        let f = build(&coordinates, &segments, RTreeParams::new(64, 2));
        let mut reader = LeafReader::new();

        let near_origin = f.tree.locate_closest_endpoint(&mut reader, FixedPointCoordinate::new(1, 1), 18).unwrap();
        assert_eq!(near_origin, Some(FixedPointCoordinate::new(0, 0)));

        let far = f.tree.locate_closest_endpoint(&mut reader, FixedPointCoordinate::new(505, 505), 18).unwrap();
        assert_eq!(far, Some(FixedPointCoordinate::new(500, 500)));

        let phantom = f.tree.find_phantom_node(&mut reader, FixedPointCoordinate::new(505, 505), 18).unwrap().unwrap();
        assert_eq!(phantom.forward_node_id, NodeId(3));
    }

    #[test]
    fn gap_between_clusters() {
        // Two clusters of short segments along the equator, 0.5° apart.
        let mut coordinates = Vec::new();
        for i in 0..6 {
            coordinates.push(FixedPointCoordinate::new(0, i * 10_000));
        }
        for i in 0..6 {
            coordinates.push(FixedPointCoordinate::new(0, 500_000 + i * 10_000));
        }
        let segments: Vec<_> =
            (0..11u32).filter(|&i| i != 5).enumerate().map(|(id, i)| segment(id as u32, i, i + 1)).collect();
        let f = build(&coordinates, &segments, RTreeParams::new(2, 3));
        let mut reader = LeafReader::new();

        for lon in (0..600_000).step_by(25_000) {
            for lat in [-20_000, 3_000, 40_000] {
                let q = FixedPointCoordinate::new(lat, lon);
                let expected = linear_segment_distances(&coordinates, &segments, q)[0];
                let phantom = f.tree.find_phantom_node(&mut reader, q, 18).unwrap().unwrap();
                let got = segment_distance(&coordinates, &segments[phantom.forward_node_id.index()], q);
                assert!((got - expected).abs() < 0.01, "query {q:?}: {got} vs {expected}");
            }
        }
    }

    #[test]
    fn best_first_matches_linear_scan() {
        let (coordinates, segments) = random_network(42, 400);
        let f = build(&coordinates, &segments, RTreeParams::new(4, 8));
        let mut reader = LeafReader::new();

        for q in random_queries(43, 60) {
            let endpoint = f.tree.locate_closest_endpoint(&mut reader, q, 18).unwrap().unwrap();
            let expected = linear_endpoint_distance(&coordinates, &segments, q);
            let got = nav_core::coordinate::euclidean_distance(q, endpoint);
            assert!((got - expected).abs() < 1e-3, "endpoint for {q:?}: {got} vs {expected}");

            let phantom = f.tree.find_phantom_node(&mut reader, q, 18).unwrap().unwrap();
            let expected = linear_segment_distances(&coordinates, &segments, q)[0];
            let got = segment_distance(&coordinates, &segments[phantom.forward_node_id.index()], q);
            assert!((got - expected).abs() < 0.01, "segment for {q:?}: {got} vs {expected}");
        }
    }

    #[test]
    fn incremental_returns_k_nearest_in_order() {
        let (coordinates, segments) = random_network(42, 300);
        let f = build(&coordinates, &segments, RTreeParams::new(8, 16));
        let mut reader = LeafReader::new();

        for q in random_queries(7, 30) {
            let found = f
                .tree
                .incremental_find_phantom_nodes_with_distance(&mut reader, q, f64::MAX, 1, 5)
                .unwrap();
            let expected = linear_segment_distances(&coordinates, &segments, q);
            assert_eq!(found.len(), 5);
            for (i, (phantom, d)) in found.iter().enumerate() {
                assert!((*d as f32 - expected[i]).abs() < 1e-4, "rank {i} for {q:?}");
                let own = segment_distance(&coordinates, &segments[phantom.forward_node_id.index()], q);
                assert!((own - *d as f32).abs() < 1e-4);
            }

            let plain = f.tree.incremental_find_phantom_nodes(&mut reader, q, 5).unwrap();
            assert_eq!(plain.len(), 5);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn k_nearest_match_linear_scan_on_random_points(
            coordinates in prop::collection::vec(near_berlin(50_000), 2..30),
            links in prop::collection::vec(any::<(prop::sample::Index, prop::sample::Index)>(), 1..40),
            q in near_berlin(60_000),
            (branching, leaf) in prop::sample::select(vec![(3u32, 2u32), (4, 8), (8, 16)]),
            k in 1usize..8,
        ) {
            let n = coordinates.len();
            let segments: Vec<SegmentRecord> = links
                .iter()
                .enumerate()
                .map(|(id, (a, b))| {
                    let u = a.index(n);
                    let v = if b.index(n) == u { (u + 1) % n } else { b.index(n) };
                    segment(id as u32, u as u32, v as u32)
                })
                .collect();
            let f = build(&coordinates, &segments, RTreeParams::new(branching, leaf));
            let expected = linear_segment_distances(&coordinates, &segments, q);
            let k = k.min(segments.len());
            let mut reader = LeafReader::new();

            let found = f
                .tree
                .incremental_find_phantom_nodes_with_distance(&mut reader, q, f64::MAX, 1, k)
                .unwrap();
            prop_assert_eq!(found.len(), k);
            for (rank, (phantom, d)) in found.iter().enumerate() {
                let tolerance = 1e-4 * expected[rank].max(1.0);
                prop_assert!((*d as f32 - expected[rank]).abs() <= tolerance, "rank {} of {:?}", rank, q);
                let own = segment_distance(&coordinates, &segments[phantom.forward_node_id.index()], q);
                prop_assert!((own - *d as f32).abs() <= tolerance);
            }

            let nearest = f.tree.find_phantom_node(&mut reader, q, 18).unwrap().unwrap();
            let got = segment_distance(&coordinates, &segments[nearest.forward_node_id.index()], q);
            prop_assert!((got - expected[0]).abs() <= 0.01_f32.max(1e-4 * expected[0]), "{} vs {}", got, expected[0]);
        }
    }

    #[test]
    fn distance_variant_stops_at_radius() {
        let (coordinates, segments) = random_network(42, 300);
        let f = build(&coordinates, &segments, RTreeParams::new(8, 16));
        let mut reader = LeafReader::new();
        let q = random_queries(11, 1)[0];
        let expected = linear_segment_distances(&coordinates, &segments, q);

        let radius = expected[3] as f64;
        let within = expected.iter().filter(|&&d| (d as f64) < radius).count().max(1);
        let found = f.tree.incremental_find_phantom_nodes_with_distance(&mut reader, q, radius, 1, 10).unwrap();
        assert_eq!(found.len(), within);
        assert!(found.iter().skip(1).all(|&(_, d)| d < radius));

        // A zero radius still yields the minimum count.
        let found = f.tree.incremental_find_phantom_nodes_with_distance(&mut reader, q, 0.0, 3, 10).unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn inspection_cap_limits_results() {
        let (coordinates, segments) = random_network(42, 300);
        let f = build(&coordinates, &segments, RTreeParams::new(8, 16));
        let mut reader = LeafReader::new();
        let q = random_queries(3, 1)[0];
        let found = f.tree.incremental_find_phantom_nodes_with_limit(&mut reader, q, 50, 4).unwrap();
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn every_segment_midpoint_snaps_onto_a_segment() {
        let (coordinates, segments) = random_network(42, 200);
        let f = build(&coordinates, &segments, RTreeParams::new(4, 8));
        let mut reader = LeafReader::new();
        for s in &segments {
            let mid = FixedPointCoordinate::centroid(coordinates[s.u.index()], coordinates[s.v.index()]);
            let phantom = f.tree.find_phantom_node(&mut reader, mid, 18).unwrap().unwrap();
            let d = segment_distance(&coordinates, &segments[phantom.forward_node_id.index()], mid);
            assert!(d < 1.0, "midpoint of {:?} snapped {d} m away", s.forward_node_id);
        }
    }

    #[test]
    fn weights_split_at_snapped_position() {
        let coordinates = vec![FixedPointCoordinate::new(0, 0), FixedPointCoordinate::new(0, 10_000)];
        let mut one_way = segment(0, 0, 1);
        one_way.reverse_node_id = NodeId::INVALID;
        let f = build(&coordinates, &[segment(0, 0, 1)], RTreeParams::default());
        let mut reader = LeafReader::new();

        let phantom =
            f.tree.find_phantom_node(&mut reader, FixedPointCoordinate::new(2_000, 2_500), 18).unwrap().unwrap();
        assert_eq!(phantom.location, FixedPointCoordinate::new(0, 2_500));
        assert!((phantom.forward_weight - 25).abs() <= 1);
        assert!((phantom.reverse_weight - 75).abs() <= 1);

        let f = build(&coordinates, &[one_way], RTreeParams::default());
        let phantom =
            f.tree.find_phantom_node(&mut reader, FixedPointCoordinate::new(2_000, 2_500), 18).unwrap().unwrap();
        assert!((phantom.forward_weight - 25).abs() <= 1);
        assert_eq!(phantom.reverse_weight, 100);
    }

    #[test]
    fn off_by_one_unit_snaps_to_input() {
        let coordinates = vec![FixedPointCoordinate::new(0, 0), FixedPointCoordinate::new(0, 10_000)];
        let f = build(&coordinates, &[segment(0, 0, 1)], RTreeParams::default());
        let mut reader = LeafReader::new();
        let q = FixedPointCoordinate::new(1, 5_000);
        let phantom = f.tree.find_phantom_node(&mut reader, q, 18).unwrap().unwrap();
        assert_eq!(phantom.location, q);
        assert!(phantom.is_valid());
    }

    #[test]
    fn reader_follows_a_new_leaf_file() {
        let coordinates = vec![FixedPointCoordinate::new(0, 0), FixedPointCoordinate::new(0, 10_000)];
        let first = build(&coordinates, &[segment(0, 0, 1)], RTreeParams::default());
        let second = build(&coordinates, &[segment(7, 0, 1)], RTreeParams::default());
        let mut reader = LeafReader::new();
        let q = FixedPointCoordinate::new(500, 500);
        let a = first.tree.find_phantom_node(&mut reader, q, 18).unwrap().unwrap();
        let b = second.tree.find_phantom_node(&mut reader, q, 18).unwrap().unwrap();
        assert_eq!(a.forward_node_id, NodeId(0));
        assert_eq!(b.forward_node_id, NodeId(7));
    }
}

// ── Tiny components ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tiny_components {
    use nav_core::{FixedPointCoordinate, NodeId};

    use super::helpers::{build, segment};
    use crate::{LeafReader, RTreeParams, SegmentRecord};

    /// Nodes 0..4 form a big street along lat 0.01°; nodes 4-5 are an
    /// isolated stub right next to the query point at the origin.
    fn network() -> (Vec<FixedPointCoordinate>, Vec<SegmentRecord>) {
        let coordinates = vec![
            FixedPointCoordinate::new(10_000, -3_000),
            FixedPointCoordinate::new(10_000, -1_000),
            FixedPointCoordinate::new(10_000, 1_500),
            FixedPointCoordinate::new(10_000, 3_000),
            FixedPointCoordinate::new(100, -500),
            FixedPointCoordinate::new(100, 500),
        ];
        let mut stub = segment(3, 4, 5);
        stub.component_id = 1;
        (coordinates, vec![segment(0, 0, 1), segment(1, 1, 2), segment(2, 2, 3), stub])
    }

    #[test]
    fn low_zoom_prefers_big_component() {
        let (coordinates, segments) = network();
        let f = build(&coordinates, &segments, RTreeParams::new(2, 1));
        let mut reader = LeafReader::new();
        let origin = FixedPointCoordinate::new(0, 0);

        let phantom = f.tree.find_phantom_node(&mut reader, origin, 10).unwrap().unwrap();
        assert!(!phantom.is_in_tiny_cc());
        assert_eq!(phantom.forward_node_id, NodeId(1));

        let endpoint = f.tree.locate_closest_endpoint(&mut reader, origin, 10).unwrap().unwrap();
        assert_eq!(endpoint, FixedPointCoordinate::new(10_000, -1_000));
    }

    #[test]
    fn high_zoom_takes_the_nearest_fragment() {
        let (coordinates, segments) = network();
        let f = build(&coordinates, &segments, RTreeParams::new(2, 1));
        let mut reader = LeafReader::new();
        let phantom = f.tree.find_phantom_node(&mut reader, FixedPointCoordinate::new(0, 0), 18).unwrap().unwrap();
        assert!(phantom.is_in_tiny_cc());
    }

    #[test]
    fn incremental_keeps_fragment_as_fallback() {
        let (coordinates, segments) = network();
        let f = build(&coordinates, &segments, RTreeParams::new(2, 1));
        let mut reader = LeafReader::new();
        let origin = FixedPointCoordinate::new(0, 0);

        let found = f.tree.incremental_find_phantom_nodes(&mut reader, origin, 2).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].is_in_tiny_cc());
        assert!(!found[1].is_in_tiny_cc());
        assert_eq!(found[1].forward_node_id, NodeId(1));

        // One requested result: the fragment is all that is in range.
        let found = f.tree.incremental_find_phantom_nodes(&mut reader, origin, 1).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_in_tiny_cc());
    }

    #[test]
    fn fragment_alone_is_still_found() {
        let (coordinates, segments) = network();
        let f = build(&coordinates, &segments[3..], RTreeParams::default());
        let mut reader = LeafReader::new();
        let found = f.tree.incremental_find_phantom_nodes(&mut reader, FixedPointCoordinate::new(0, 0), 1).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_in_tiny_cc());
    }
}

// ── Leaf file ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod leaf_file {
    use std::fs::OpenOptions;

    use nav_core::FixedPointCoordinate;

    use super::helpers::{build, segment};
    use crate::leaf::{LEAF_FILE_HEADER, leaf_block_size};
    use crate::{LeafReader, RTreeParams, SpatialError};

    #[test]
    fn record_is_48_bytes() {
        assert_eq!(std::mem::size_of::<crate::SegmentRecord>(), 48);
        assert_eq!(leaf_block_size(2), 100);
    }

    #[test]
    fn file_size_matches_block_count() {
        let coordinates: Vec<_> = (0..5).map(|i| FixedPointCoordinate::new(0, i * 1_000)).collect();
        let segments: Vec<_> = (0..4).map(|i| segment(i, i, i + 1)).collect();
        let f = build(&coordinates, &segments, RTreeParams::new(2, 3));
        let len = std::fs::metadata(f.leaf_path()).unwrap().len();
        assert_eq!(len, LEAF_FILE_HEADER + 2 * leaf_block_size(3));
    }

    #[test]
    fn unreadable_leaf_after_reopen_is_reported() {
        let coordinates: Vec<_> = (0..5).map(|i| FixedPointCoordinate::new(0, i * 1_000)).collect();
        let segments: Vec<_> = (0..4).map(|i| segment(i, i, i + 1)).collect();
        let params = RTreeParams::new(2, 1);
        let f = build(&coordinates, &segments, params);

        let mut reader = LeafReader::new();
        let mut leaf = Vec::new();
        reader.load(&f.leaf_path(), 3, &params, &mut leaf).unwrap();
        assert_eq!(leaf.len(), 1);

        OpenOptions::new().write(true).open(f.leaf_path()).unwrap().set_len(LEAF_FILE_HEADER).unwrap();
        let err = reader.load(&f.leaf_path(), 3, &params, &mut leaf).unwrap_err();
        assert!(matches!(err, SpatialError::StaleLeafHandle { leaf: 3, .. }));
    }
}
