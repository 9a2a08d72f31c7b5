//! `build-index`: CSV road network → tree file + leaf file.
//!
//! # CSV formats
//!
//! Nodes, one row per coordinate; the row number is the node id:
//!
//! ```csv
//! lat,lon
//! 52.520008,13.404954
//! 52.519400,13.406200
//! ```
//!
//! Segments, one row per road segment between two node ids.  `oneway`,
//! `name_id` and `weight` are optional:
//!
//! ```csv
//! u,v,weight,oneway,name_id
//! 0,1,12,false,3
//! ```
//!
//! The row number of a segment becomes its edge-based node id.  Segments in
//! components smaller than the tiny threshold are tagged so that low-zoom
//! queries skip them.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{info, warn};

use nav_core::{FixedPointCoordinate, NameId, NodeId};
use nav_graph::{ComponentClassifier, NodeBasedEdge, normalize_edges};
use nav_spatial::{RTreeParams, SegmentRecord, StaticRTree};

// ── CSV records ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NodeRecord {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct SegmentRow {
    u:       u32,
    v:       u32,
    #[serde(default)]
    weight:  i32,
    #[serde(default)]
    oneway:  bool,
    #[serde(default)]
    name_id: Option<u32>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

fn read_nodes(path: &Path) -> Result<Vec<FixedPointCoordinate>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut coordinates = Vec::new();
    for (row, record) in csv::Reader::from_reader(file).deserialize::<NodeRecord>().enumerate() {
        let record = record.with_context(|| format!("{} row {}", path.display(), row + 1))?;
        let coordinate = FixedPointCoordinate::from_degrees(record.lat, record.lon);
        if !coordinate.is_valid() {
            bail!("{} row {}: ({}, {}) is not a valid coordinate", path.display(), row + 1, record.lat, record.lon);
        }
        coordinates.push(coordinate);
    }
    Ok(coordinates)
}

fn read_segments(path: &Path) -> Result<Vec<SegmentRow>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    csv::Reader::from_reader(file)
        .deserialize()
        .enumerate()
        .map(|(row, record)| record.with_context(|| format!("{} row {}", path.display(), row + 1)))
        .collect()
}

// ── Build ─────────────────────────────────────────────────────────────────────

/// Options of one `build-index` run.
pub struct IndexJob<'a> {
    pub nodes:          &'a Path,
    pub segments:       &'a Path,
    pub tree_path:      &'a Path,
    pub leaf_path:      &'a Path,
    pub params:         RTreeParams,
    pub tiny_threshold: u32,
}

pub fn build_index(job: &IndexJob<'_>) -> Result<()> {
    let coordinates = read_nodes(job.nodes)?;
    let rows = read_segments(job.segments)?;
    info!(nodes = coordinates.len(), segments = rows.len(), "read road network");

    let edges: Vec<NodeBasedEdge> = rows
        .iter()
        .map(|row| {
            let edge = if row.oneway {
                NodeBasedEdge::one_way(NodeId(row.u), NodeId(row.v), row.weight)
            } else {
                NodeBasedEdge::new(NodeId(row.u), NodeId(row.v), row.weight)
            };
            NodeBasedEdge { name_id: row.name_id.map_or(NameId::INVALID, NameId), ..edge }
        })
        .collect();
    let edges = normalize_edges(edges);
    let components = ComponentClassifier::new(&coordinates, &edges)
        .with_tiny_threshold(job.tiny_threshold)
        .run()
        .context("classifying connected components")?;
    info!(
        components = components.component_count,
        size_one = components.size_one_count,
        length_km = components.total_length_m / 1000.0,
        "classified components"
    );

    let mut tiny = 0usize;
    let segments: Vec<SegmentRecord> = rows
        .iter()
        .enumerate()
        .map(|(id, row)| {
            let (u, v) = (NodeId(row.u), NodeId(row.v));
            let component_id = components.segment_component_id(u, v);
            if component_id != 0 {
                tiny += 1;
            }
            SegmentRecord {
                forward_node_id: NodeId(id as u32),
                reverse_node_id: if row.oneway { NodeId::INVALID } else { NodeId(id as u32) },
                forward_weight: row.weight,
                reverse_weight: if row.oneway { 0 } else { row.weight },
                name_id: row.name_id.map_or(NameId::INVALID, NameId),
                component_id,
                ..SegmentRecord::between(u, v)
            }
        })
        .collect();
    if tiny > 0 {
        warn!(tiny, "segments lie in tiny components and are hidden at low zoom");
    }

    let tree_nodes = StaticRTree::build(&segments, &coordinates, job.params, job.tree_path, job.leaf_path)
        .context("building spatial index")?;
    info!(
        tree_nodes,
        tree = %job.tree_path.display(),
        leaves = %job.leaf_path.display(),
        "wrote spatial index"
    );
    Ok(())
}
