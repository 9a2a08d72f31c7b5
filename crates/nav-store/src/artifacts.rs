//! On-disk dataset artifacts besides the graph and the R-tree.
//!
//! | File         | Contents                                                  |
//! |--------------|-----------------------------------------------------------|
//! | `.nodes`     | `u32 n`, `n × QueryNode`                                  |
//! | `.edges`     | `u32 n`, `n × OriginalEdgeData`                           |
//! | `.geometry`  | `u32 i`, `i × u32` index, `u32 l`, `l × u32` node list    |
//! | `.names`     | range table, `u32 char_count`, `char_count` bytes         |
//! | `.timestamp` | text; only the first line is used                         |
//!
//! Each format has a header reader that returns the counts without reading
//! the payload, so the loader can size a region before filling it.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::path::Path;

use nav_core::io::{read_counted, read_pod_vec, read_u32, require_non_empty, write_counted, write_pod_slice, write_u32};
use nav_core::{FixedPointCoordinate, NameId, NodeId, RangeBlock, RangeTable, TravelMode};
use tracing::warn;

use crate::{StoreError, StoreResult};

/// Longest timestamp kept, in bytes.
pub const MAX_TIMESTAMP_LEN: usize = 25;

/// Timestamp used when none is available.
pub const DEFAULT_TIMESTAMP: &str = "n/a";

// ── Records ───────────────────────────────────────────────────────────────────

/// One routing node of the `.nodes` file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct QueryNode {
    pub lat:     i32,
    pub lon:     i32,
    /// External (OSM) id; not used by queries.
    pub node_id: u64,
}

impl QueryNode {
    pub fn coordinate(&self) -> FixedPointCoordinate {
        FixedPointCoordinate::new(self.lat, self.lon)
    }
}

/// Per-edge payload of the `.edges` file, indexed by the edge-based node id
/// stored in graph edges.
#[derive(Copy, Clone, PartialEq, Eq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct OriginalEdgeData {
    /// For compressed edges, the index into the geometry table; otherwise
    /// the node the edge passes through.
    pub via_node:            NodeId,
    pub name_id:             NameId,
    pub travel_mode:         TravelMode,
    pub turn_instruction:    u8,
    /// Non-zero if `via_node` is a geometry index.
    pub compressed_geometry: u8,
    pub _pad:                u8,
}

impl OriginalEdgeData {
    pub fn new(via_node: NodeId, name_id: NameId, turn_instruction: u8, compressed: bool) -> Self {
        Self {
            via_node,
            name_id,
            travel_mode: TravelMode::DEFAULT,
            turn_instruction,
            compressed_geometry: compressed as u8,
            _pad: 0,
        }
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compressed_geometry != 0
    }
}

// ── Counted files ─────────────────────────────────────────────────────────────

/// The leading `u32` record count of a counted file, after checking the
/// file is large enough to hold that many `T`.
pub fn read_count<T>(path: &Path) -> StoreResult<usize> {
    let len = require_non_empty(path)?;
    let count = read_u32(&mut File::open(path)?)? as usize;
    let needed = (size_of::<u32>() + count * size_of::<T>()) as u64;
    if len < needed {
        return Err(nav_core::CoreError::Truncated { what: "counted file", expected: needed, found: len }.into());
    }
    Ok(count)
}

pub fn read_nodes(path: &Path) -> StoreResult<Vec<QueryNode>> {
    require_non_empty(path)?;
    Ok(read_counted(&mut BufReader::new(File::open(path)?))?)
}

pub fn write_nodes(path: &Path, nodes: &[QueryNode]) -> StoreResult<()> {
    write_counted_file(path, nodes)
}

pub fn read_edges(path: &Path) -> StoreResult<Vec<OriginalEdgeData>> {
    require_non_empty(path)?;
    Ok(read_counted(&mut BufReader::new(File::open(path)?))?)
}

pub fn write_edges(path: &Path, edges: &[OriginalEdgeData]) -> StoreResult<()> {
    write_counted_file(path, edges)
}

fn write_counted_file<T: bytemuck::Pod>(path: &Path, values: &[T]) -> StoreResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_counted(&mut writer, values)?;
    writer.flush()?;
    Ok(())
}

// ── Geometry ──────────────────────────────────────────────────────────────────

/// Compressed edge geometries: entry `i` is
/// `list[index[i] .. index[i + 1]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryTable {
    pub index: Vec<u32>,
    pub list:  Vec<NodeId>,
}

impl GeometryTable {
    /// Build from one node sequence per compressed edge.
    pub fn from_sequences<'a>(sequences: impl IntoIterator<Item = &'a [NodeId]>) -> Self {
        let mut table = Self { index: vec![0], list: Vec::new() };
        for sequence in sequences {
            table.list.extend_from_slice(sequence);
            table.index.push(table.list.len() as u32);
        }
        table
    }
}

/// `(index_len, list_len)` of a geometry file.
pub fn read_geometry_header(path: &Path) -> StoreResult<(usize, usize)> {
    require_non_empty(path)?;
    let mut reader = BufReader::new(File::open(path)?);
    let index_len = read_u32(&mut reader)? as usize;
    reader.seek(SeekFrom::Current((index_len * size_of::<u32>()) as i64))?;
    let list_len = read_u32(&mut reader)? as usize;
    Ok((index_len, list_len))
}

pub fn read_geometry(path: &Path) -> StoreResult<GeometryTable> {
    require_non_empty(path)?;
    let mut reader = BufReader::new(File::open(path)?);
    let index = read_counted(&mut reader)?;
    let list = read_counted(&mut reader)?;
    Ok(GeometryTable { index, list })
}

pub fn write_geometry(path: &Path, table: &GeometryTable) -> StoreResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_counted(&mut writer, &table.index)?;
    write_counted(&mut writer, &table.list)?;
    writer.flush()?;
    Ok(())
}

// ── Names ─────────────────────────────────────────────────────────────────────

/// Counts of a names file.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct NamesHeader {
    pub block_count: usize,
    pub sum_lengths: u32,
    pub char_count:  usize,
}

pub fn read_names_header(path: &Path) -> StoreResult<NamesHeader> {
    require_non_empty(path)?;
    let mut reader = BufReader::new(File::open(path)?);
    let block_count = read_u32(&mut reader)? as usize;
    let sum_lengths = read_u32(&mut reader)?;
    let skip = block_count * (size_of::<u32>() + size_of::<RangeBlock>());
    reader.seek(SeekFrom::Current(skip as i64))?;
    let char_count = read_u32(&mut reader)? as usize;
    if char_count != sum_lengths as usize {
        return Err(StoreError::malformed(
            "names file",
            format!("range table covers {sum_lengths} bytes but {char_count} are stored"),
        ));
    }
    Ok(NamesHeader { block_count, sum_lengths, char_count })
}

pub fn read_names(path: &Path) -> StoreResult<(RangeTable, Vec<u8>)> {
    let header = read_names_header(path)?;
    let mut reader = BufReader::new(File::open(path)?);
    let table = RangeTable::read_from(&mut reader)?;
    read_u32(&mut reader)?;
    let chars = read_pod_vec(&mut reader, header.char_count)?;
    Ok((table, chars))
}

/// Encode `names` (id = position) and write them.
pub fn write_names<S: AsRef<str>>(path: &Path, names: &[S]) -> StoreResult<()> {
    let lengths: Vec<u32> = names.iter().map(|n| n.as_ref().len() as u32).collect();
    let table = RangeTable::build(&lengths)?;
    let chars: Vec<u8> = names.iter().flat_map(|n| n.as_ref().bytes()).collect();

    let mut writer = BufWriter::new(File::create(path)?);
    table.write_to(&mut writer)?;
    write_u32(&mut writer, chars.len() as u32)?;
    write_pod_slice(&mut writer, &chars)?;
    writer.flush()?;
    Ok(())
}

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// First line of the timestamp file, at most [`MAX_TIMESTAMP_LEN`] bytes.
///
/// A missing file, unreadable file or empty first line yields
/// [`DEFAULT_TIMESTAMP`].
pub fn read_timestamp(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_TIMESTAMP.to_owned();
    };
    let mut line = String::new();
    let read = File::open(path).and_then(|f| BufReader::new(f).read_line(&mut line));
    if let Err(e) = read {
        warn!(path = %path.display(), error = %e, "timestamp file unreadable; using default");
        return DEFAULT_TIMESTAMP.to_owned();
    }
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return DEFAULT_TIMESTAMP.to_owned();
    }
    truncate_at_char_boundary(line, MAX_TIMESTAMP_LEN).to_owned()
}

pub fn write_timestamp(path: &Path, timestamp: &str) -> StoreResult<()> {
    fs::write(path, format!("{timestamp}\n"))?;
    Ok(())
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
