//! `.hsgr` query-graph artifact.
//!
//! ```text
//! Fingerprint          (16 bytes)
//! u32 checksum
//! u32 node_count       (including the CSR sentinel)
//! u32 edge_count
//! GraphNodeEntry[node_count]
//! QueryEdge[edge_count]
//! ```
//!
//! The header can be read on its own so a loader can size shared blocks
//! before copying the arrays straight into them.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nav_core::io::{read_pod, read_pod_vec, read_u32, require_non_empty, write_pod, write_pod_slice, write_u32};
use nav_core::Fingerprint;
use tracing::{debug, warn};

use crate::{GraphError, GraphNodeEntry, GraphResult, QueryEdge, StaticGraph};

/// Everything in front of the two arrays.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HsgrHeader {
    pub fingerprint: Fingerprint,
    pub checksum:    u32,
    pub node_count:  u32,
    pub edge_count:  u32,
}

impl HsgrHeader {
    pub fn read_from<R: Read>(reader: &mut R) -> GraphResult<Self> {
        let fingerprint: Fingerprint = read_pod(reader)?;
        check_fingerprint(&fingerprint);
        Ok(Self {
            fingerprint,
            checksum:   read_u32(reader)?,
            node_count: read_u32(reader)?,
            edge_count: read_u32(reader)?,
        })
    }
}

/// Build signatures that differ are logged and tolerated.
fn check_fingerprint(found: &Fingerprint) {
    let expected = Fingerprint::current();
    if found.is_compatible_with(&expected) {
        debug!(%found, "graph fingerprint ok");
    } else {
        warn!(%found, %expected, "graph was built by a different version; continuing");
    }
}

/// Open `path` and read its header, leaving the reader at the node array.
pub fn open_hsgr(path: &Path) -> GraphResult<(HsgrHeader, BufReader<File>)> {
    require_non_empty(path)?;
    let mut reader = BufReader::new(File::open(path)?);
    let header = HsgrHeader::read_from(&mut reader)?;
    Ok((header, reader))
}

/// Read the two arrays into caller-provided slices sized from the header.
pub fn read_hsgr_arrays<R: Read>(
    reader: &mut R,
    nodes: &mut [GraphNodeEntry],
    edges: &mut [QueryEdge],
) -> GraphResult<()> {
    reader.read_exact(bytemuck::cast_slice_mut(nodes))?;
    reader.read_exact(bytemuck::cast_slice_mut(edges))?;
    Ok(())
}

/// Load a whole `.hsgr` file into an owned graph.
pub fn read_hsgr(path: &Path) -> GraphResult<(HsgrHeader, StaticGraph<QueryEdge>)> {
    let (header, mut reader) = open_hsgr(path)?;
    let nodes: Vec<GraphNodeEntry> = read_pod_vec(&mut reader, header.node_count as usize)?;
    let edges: Vec<QueryEdge> = read_pod_vec(&mut reader, header.edge_count as usize)?;
    let graph = StaticGraph::adopt(nodes.into(), edges.into())?;
    Ok((header, graph))
}

/// Write `graph` with the current build fingerprint.
pub fn write_hsgr(path: &Path, checksum: u32, graph: &StaticGraph<QueryEdge>) -> GraphResult<()> {
    let too_large = |what: &str| GraphError::InvalidLayout(format!("{what} exceed u32::MAX"));
    let node_count = u32::try_from(graph.nodes().len()).map_err(|_| too_large("nodes"))?;
    let edge_count = u32::try_from(graph.edges().len()).map_err(|_| too_large("edges"))?;

    let mut writer = BufWriter::new(File::create(path)?);
    write_pod(&mut writer, &Fingerprint::current())?;
    write_u32(&mut writer, checksum)?;
    write_u32(&mut writer, node_count)?;
    write_u32(&mut writer, edge_count)?;
    write_pod_slice(&mut writer, graph.nodes())?;
    write_pod_slice(&mut writer, graph.edges())?;
    writer.flush()?;
    Ok(())
}
