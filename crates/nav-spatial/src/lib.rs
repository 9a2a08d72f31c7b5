//! `nav-spatial` — a static, Hilbert-packed R-tree over road segments.
//!
//! The tree is bulk-loaded once into two files: a small tree file holding
//! the internal nodes (kept in memory by query processes) and a leaf file
//! holding the segments themselves (paged in per query).  Queries snap a
//! coordinate onto the nearest segment and return a [`PhantomNode`].
//!
//! # Crate layout
//!
//! | Module          | Contents                                                  |
//! |-----------------|-----------------------------------------------------------|
//! | [`rtree`]       | `StaticRTree` build/attach/adopt, `RTreeParams`           |
//! | [`query`]       | best-first and incremental nearest-segment queries        |
//! | [`rectangle`]   | `Rectangle` with MINDIST / MINMAXDIST bounds              |
//! | [`leaf`]        | `SegmentRecord`, leaf file format, `LeafReader`           |
//! | [`phantom`]     | `PhantomNode`                                             |
//! | [`upper_bound`] | `UpperBound`, the k-th best distance tracker              |
//! | [`error`]       | `SpatialError`, `SpatialResult<T>`                        |
//!
//! # Feature flags
//!
//! | Flag       | Effect                                                    |
//! |------------|-----------------------------------------------------------|
//! | `parallel` | Compute and sort Hilbert keys with Rayon during build.    |
//! | `serde`    | Derive `Serialize`/`Deserialize` on value types.          |

pub mod error;
pub mod leaf;
pub mod phantom;
pub mod query;
pub mod rectangle;
pub mod rtree;
pub mod upper_bound;

#[cfg(test)]
mod tests;

pub use error::{SpatialError, SpatialResult};
pub use leaf::{LeafReader, SegmentRecord};
pub use phantom::PhantomNode;
pub use query::TINY_COMPONENT_MAX_ZOOM;
pub use rectangle::Rectangle;
pub use rtree::{RTreeParams, StaticRTree, TreeNode};
pub use upper_bound::UpperBound;
