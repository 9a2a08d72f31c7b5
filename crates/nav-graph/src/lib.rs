//! `nav-graph` — the immutable routing graph and its companions.
//!
//! # Crate layout
//!
//! | Module           | Contents                                                 |
//! |------------------|----------------------------------------------------------|
//! | [`static_graph`] | `StaticGraph` (CSR), `EdgeRecord`, `QueryEdge`           |
//! | [`hsgr`]         | `.hsgr` header, reader and writer                        |
//! | [`node_based`]   | `NodeBasedEdge`, `normalize_edges`                       |
//! | [`components`]   | `ComponentClassifier` (Tarjan SCC), `TurnRestriction`    |
//! | [`error`]        | `GraphError`, `GraphResult<T>`                           |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Forwards `serde` to `nav-core`.                              |

pub mod components;
pub mod error;
pub mod hsgr;
pub mod node_based;
pub mod static_graph;

#[cfg(test)]
mod tests;

pub use components::{
    ComponentClassifier, ComponentInfo, RestrictionMap, TINY_COMPONENT_THRESHOLD, TurnRestriction,
};
pub use error::{GraphError, GraphResult};
pub use hsgr::{HsgrHeader, read_hsgr, write_hsgr};
pub use node_based::{NodeBasedEdge, normalize_edges};
pub use static_graph::{
    EdgeDistance, EdgeRecord, GraphNodeEntry, InputEdge, QueryEdge, QueryEdgeData, StaticGraph,
};
