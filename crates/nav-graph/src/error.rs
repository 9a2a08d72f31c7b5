//! Graph-subsystem error type.

use thiserror::Error;

use nav_core::{CoreError, NodeId};

/// Errors produced by `nav-graph`.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node {node} out of range (graph has {node_count} nodes)")]
    NodeOutOfRange { node: NodeId, node_count: usize },

    /// CSR arrays that do not describe a graph.
    #[error("inconsistent graph layout: {0}")]
    InvalidLayout(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;
