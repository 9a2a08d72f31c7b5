//! Spatial-subsystem error type.

use thiserror::Error;

use nav_core::{CoreError, NodeId};

/// Errors produced by `nav-spatial`.
///
/// A query that finds nothing is not an error; it returns `None` or an
/// empty vector.
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("cannot build an index over zero segments")]
    EmptyInput,

    #[error("segment {index} references node {node} outside the coordinate table")]
    InvalidSegment { index: usize, node: NodeId },

    #[error("invalid R-tree parameters: {0}")]
    InvalidParams(String),

    #[error("corrupt R-tree: {0}")]
    CorruptTree(String),

    #[error("leaf {leaf} claims {count} segments")]
    CorruptLeaf { leaf: u32, count: u32 },

    /// The leaf file could not be read even after reopening it.
    #[error("leaf {leaf} unreadable after reopening the leaf file: {source}")]
    StaleLeafHandle {
        leaf:   u32,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SpatialResult<T> = Result<T, SpatialError>;
