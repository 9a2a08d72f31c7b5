//! Nearest-segment queries over an attached [`StaticRTree`].
//!
//! Two search strategies:
//!
//! - **Best-first** ([`locate_closest_endpoint`], [`find_phantom_node`]):
//!   one answer.  A subtree is expanded only while its MINDIST lower bound
//!   can still beat the best distance found and the tightest MINMAXDIST
//!   bound seen among its siblings.
//! - **Incremental** ([`incremental_find_phantom_nodes`] and variants):
//!   ranked answers.  Tree nodes and resolved segments share one priority
//!   queue keyed by distance, so segments come out in ascending order.
//!   Segments of tiny components are always queued but only returned
//!   while no big-component segment has been found.
//!
//! Every query takes the caller's [`LeafReader`]; the tree itself is
//! immutable and can be shared across threads.
//!
//! [`locate_closest_endpoint`]: StaticRTree::locate_closest_endpoint
//! [`find_phantom_node`]: StaticRTree::find_phantom_node
//! [`incremental_find_phantom_nodes`]: StaticRTree::incremental_find_phantom_nodes

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nav_core::coordinate::{PerpendicularFoot, euclidean_distance, perpendicular_distance_from_projected};
use nav_core::{FixedPointCoordinate, ProjectedPoint};

use crate::{LeafReader, PhantomNode, SegmentRecord, SpatialResult, StaticRTree, TreeNode, UpperBound};

/// At or below this zoom level, segments of tiny components are ignored by
/// the best-first queries.
pub const TINY_COMPONENT_MAX_ZOOM: u32 = 14;

// ── Min-queue ─────────────────────────────────────────────────────────────────

/// Entry ordered by ascending distance, then insertion order.
struct Queued<T> {
    distance: f32,
    seq:      u64,
    entry:    T,
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Queued<T> {}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Queued<T> {
    // Reversed: `BinaryHeap` pops the greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance.total_cmp(&self.distance).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct MinQueue<T> {
    heap:     BinaryHeap<Queued<T>>,
    next_seq: u64,
}

impl<T> MinQueue<T> {
    fn new() -> Self {
        Self { heap: BinaryHeap::new(), next_seq: 0 }
    }

    fn push(&mut self, distance: f32, entry: T) {
        self.heap.push(Queued { distance, seq: self.next_seq, entry });
        self.next_seq += 1;
    }

    fn pop(&mut self) -> Option<(f32, T)> {
        self.heap.pop().map(|q| (q.distance, q.entry))
    }
}

enum Candidate {
    Node(u32),
    Segment(SegmentRecord, PerpendicularFoot),
}

// ── Queries ───────────────────────────────────────────────────────────────────

impl StaticRTree {
    /// Default cap on segments inspected by an incremental query.
    pub fn default_max_checked(&self) -> usize {
        4 * self.params.leaf_node_size as usize
    }

    /// The segment endpoint nearest to `coordinate`.
    ///
    /// At zoom levels up to [`TINY_COMPONENT_MAX_ZOOM`] segments of tiny
    /// components are skipped.  `None` if nothing qualifies.
    pub fn locate_closest_endpoint(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        zoom: u32,
    ) -> SpatialResult<Option<FixedPointCoordinate>> {
        let ignore_tiny = zoom <= TINY_COMPONENT_MAX_ZOOM;
        let mut min_dist = f32::MAX;
        let mut min_max_dist = f32::MAX;
        let mut best = None;
        let mut leaf = Vec::new();

        let mut queue = MinQueue::new();
        queue.push(self.node(0).rect().min_dist(coordinate), 0u32);

        while let Some((lower, id)) = queue.pop() {
            if lower >= min_dist {
                continue;
            }
            let node = self.node(id);
            if !node.children_on_disk() {
                min_max_dist =
                    self.explore(node, coordinate, min_dist, min_max_dist, !ignore_tiny, &mut queue);
                continue;
            }

            reader.load(&self.leaf_path, node.children()[0], &self.params, &mut leaf)?;
            for segment in leaf.iter().filter(|s| !(ignore_tiny && s.is_in_tiny_cc())) {
                for endpoint in [segment.u, segment.v] {
                    let location = self.coordinates[endpoint.index()];
                    let d = euclidean_distance(coordinate, location);
                    if d < min_dist {
                        min_dist = d;
                        best = Some(location);
                    }
                }
            }
        }
        Ok(best)
    }

    /// Snap `coordinate` onto the nearest segment.
    ///
    /// Zoom handling as for
    /// [`locate_closest_endpoint`](Self::locate_closest_endpoint).  Of two
    /// segments at (nearly) equal distance the first one found wins.
    pub fn find_phantom_node(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        zoom: u32,
    ) -> SpatialResult<Option<PhantomNode>> {
        let ignore_tiny = zoom <= TINY_COMPONENT_MAX_ZOOM;
        let projected = coordinate.project();
        let mut min_dist = f32::MAX;
        let mut min_max_dist = f32::MAX;
        let mut best: Option<(SegmentRecord, PerpendicularFoot)> = None;
        let mut leaf = Vec::new();

        let mut queue = MinQueue::new();
        queue.push(self.node(0).rect().min_dist(coordinate), 0u32);

        while let Some((lower, id)) = queue.pop() {
            if lower > min_dist || lower > min_max_dist {
                continue;
            }
            let node = self.node(id);
            if !node.children_on_disk() {
                min_max_dist =
                    self.explore(node, coordinate, min_dist, min_max_dist, !ignore_tiny, &mut queue);
                continue;
            }

            reader.load(&self.leaf_path, node.children()[0], &self.params, &mut leaf)?;
            for segment in leaf.iter().filter(|s| !(ignore_tiny && s.is_in_tiny_cc())) {
                let foot = self.foot_on(segment, coordinate, projected);
                if foot.distance < min_dist && (foot.distance - min_dist).abs() >= f32::EPSILON {
                    min_dist = foot.distance;
                    best = Some((*segment, foot));
                }
            }
        }

        Ok(best.map(|(segment, foot)| self.make_phantom(&segment, foot, coordinate)))
    }

    /// Up to `max_results` snapped positions in ascending distance, with
    /// the default inspection cap.
    pub fn incremental_find_phantom_nodes(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        max_results: usize,
    ) -> SpatialResult<Vec<PhantomNode>> {
        self.incremental_find_phantom_nodes_with_limit(reader, coordinate, max_results, self.default_max_checked())
    }

    /// As [`incremental_find_phantom_nodes`](Self::incremental_find_phantom_nodes)
    /// but stops after `max_checked` segments have been inspected.
    ///
    /// The search ends once `max_results` positions are found and at least
    /// one of them is on a big component.  Tiny-component segments are
    /// returned as long as no big one has turned up, up to `max_results`.
    pub fn incremental_find_phantom_nodes_with_limit(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        max_results: usize,
        max_checked: usize,
    ) -> SpatialResult<Vec<PhantomNode>> {
        let mut results = Vec::new();
        let mut search = IncrementalSearch::new(self, coordinate, max_results);
        while let Some((segment, foot)) = search.next_segment(reader)? {
            search.inspected += 1;
            let surplus_tiny = search.big == 0 && search.tiny >= max_results && segment.is_in_tiny_cc();
            if !surplus_tiny {
                results.push(self.make_phantom(&segment, foot, coordinate));
                search.count(&segment);
            }

            if (results.len() >= max_results && search.big > 0) || search.inspected >= max_checked {
                break;
            }
        }
        Ok(results)
    }

    /// Snapped positions with their distances: at least `min_results` when
    /// that many exist, more while they are within `max_distance` metres,
    /// never more than `max_results`.
    pub fn incremental_find_phantom_nodes_with_distance(
        &self,
        reader: &mut LeafReader,
        coordinate: FixedPointCoordinate,
        max_distance: f64,
        min_results: usize,
        max_results: usize,
    ) -> SpatialResult<Vec<(PhantomNode, f64)>> {
        let max_checked = self.default_max_checked();
        let mut results: Vec<(PhantomNode, f64)> = Vec::new();
        let mut search = IncrementalSearch::new(self, coordinate, max_results);
        while let Some((segment, foot)) = search.next_segment(reader)? {
            search.inspected += 1;
            let surplus_tiny =
                search.big == 0 && search.tiny >= max_results.saturating_sub(1) && segment.is_in_tiny_cc();
            if !surplus_tiny {
                let distance = foot.distance as f64;
                if search.big > 0 && results.len() >= min_results && distance >= max_distance {
                    break;
                }
                results.push((self.make_phantom(&segment, foot, coordinate), distance));
                search.count(&segment);
            }

            if (results.len() >= max_results && search.big > 0) || search.inspected >= max_checked {
                break;
            }
        }
        Ok(results)
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    /// Queue the children of `node` that may still hold a better answer;
    /// returns the tightened MINMAXDIST.
    fn explore(
        &self,
        node: TreeNode<'_>,
        coordinate: FixedPointCoordinate,
        min_dist: f32,
        min_max_dist: f32,
        use_min_max: bool,
        queue: &mut MinQueue<u32>,
    ) -> f32 {
        let mut new_min_max = min_max_dist;
        for &child in node.children() {
            let rect = self.node(child).rect();
            let lower = rect.min_dist(coordinate);
            if use_min_max {
                new_min_max = new_min_max.min(rect.min_max_dist(coordinate));
                if lower > new_min_max {
                    continue;
                }
            }
            if lower > min_dist {
                continue;
            }
            queue.push(lower, child);
        }
        new_min_max
    }

    fn foot_on(
        &self,
        segment: &SegmentRecord,
        coordinate: FixedPointCoordinate,
        projected: ProjectedPoint,
    ) -> PerpendicularFoot {
        perpendicular_distance_from_projected(
            self.coordinates[segment.u.index()],
            self.coordinates[segment.v.index()],
            coordinate,
            projected,
        )
    }

    fn make_phantom(
        &self,
        segment: &SegmentRecord,
        foot: PerpendicularFoot,
        input: FixedPointCoordinate,
    ) -> PhantomNode {
        let mut phantom = PhantomNode::from_segment(segment, foot.foot);
        phantom.fix_up_rounding(input);

        let source = self.coordinates[segment.u.index()];
        let target = self.coordinates[segment.v.index()];
        let ratio = euclidean_distance(source, phantom.location) / euclidean_distance(source, target);
        phantom.split_weights(ratio);
        phantom
    }
}

// ── Incremental search state ──────────────────────────────────────────────────

/// Shared traversal of the incremental queries.  Yields resolved segments
/// in ascending distance; the callers decide what to keep.
struct IncrementalSearch<'t> {
    tree:       &'t StaticRTree,
    coordinate: FixedPointCoordinate,
    projected:  ProjectedPoint,
    queue:      MinQueue<Candidate>,
    bound:      UpperBound,
    leaf:       Vec<SegmentRecord>,
    inspected:  usize,
    big:        usize,
    tiny:       usize,
}

impl<'t> IncrementalSearch<'t> {
    fn new(tree: &'t StaticRTree, coordinate: FixedPointCoordinate, max_results: usize) -> Self {
        let mut queue = MinQueue::new();
        queue.push(0.0, Candidate::Node(0));
        Self {
            tree,
            coordinate,
            projected: coordinate.project(),
            queue,
            bound: UpperBound::new(max_results),
            leaf: Vec::new(),
            inspected: 0,
            big: 0,
            tiny: 0,
        }
    }

    fn count(&mut self, segment: &SegmentRecord) {
        if segment.is_in_tiny_cc() {
            self.tiny += 1;
        } else {
            self.big += 1;
        }
    }

    fn next_segment(
        &mut self,
        reader: &mut LeafReader,
    ) -> SpatialResult<Option<(SegmentRecord, PerpendicularFoot)>> {
        while let Some((_, candidate)) = self.queue.pop() {
            let id = match candidate {
                Candidate::Segment(segment, foot) => return Ok(Some((segment, foot))),
                Candidate::Node(id) => id,
            };
            let tree = self.tree;
            let node = tree.node(id);
            if node.children_on_disk() {
                reader.load(&tree.leaf_path, node.children()[0], &tree.params, &mut self.leaf)?;
                for segment in &self.leaf {
                    let foot = tree.foot_on(segment, self.coordinate, self.projected);
                    if self.bound.get() >= foot.distance || segment.is_in_tiny_cc() {
                        self.bound.insert(foot.distance);
                        self.queue.push(foot.distance, Candidate::Segment(*segment, foot));
                    }
                }
            } else {
                for &child in node.children() {
                    let lower = tree.node(child).rect().min_dist(self.coordinate);
                    self.queue.push(lower, Candidate::Node(child));
                }
            }
        }
        Ok(None)
    }
}
