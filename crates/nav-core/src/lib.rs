//! `nav-core` — foundational types for the `navstore` routing data store.
//!
//! Every other `nav-*` crate depends on this one.  It has no `nav-*`
//! dependencies and few external ones (`bytemuck`, `thiserror`, plus an
//! optional `serde`).
//!
//! # What lives here
//!
//! | Module            | Contents                                              |
//! |-------------------|-------------------------------------------------------|
//! | [`ids`]           | `NodeId`, `EdgeId`, `NameId`                          |
//! | [`coordinate`]    | `FixedPointCoordinate`, Mercator, distance metrics    |
//! | [`hilbert`]       | `hilbert_key` space-filling-curve encoder             |
//! | [`range_table`]   | `RangeTable` compressed id → byte-range codec         |
//! | [`travel_mode`]   | `TravelMode` byte tag                                 |
//! | [`fingerprint`]   | `Fingerprint` build signature                         |
//! | [`storage`]       | `Storage<T>` owned-or-mapped backing, `ByteRegion`    |
//! | [`io`]            | fixed-record file helpers                             |
//! | [`error`]         | `CoreError`, `CoreResult`                             |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to the public value types.  |

pub mod coordinate;
pub mod error;
pub mod fingerprint;
pub mod hilbert;
pub mod ids;
pub mod io;
pub mod range_table;
pub mod storage;
pub mod travel_mode;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use coordinate::{FixedPointCoordinate, PerpendicularFoot, ProjectedPoint};
pub use error::{CoreError, CoreResult};
pub use fingerprint::Fingerprint;
pub use hilbert::hilbert_key;
pub use ids::{EdgeId, NameId, NodeId};
pub use range_table::{RangeBlock, RangeTable};
pub use storage::{ByteRegion, HeapRegion, MappedSlice, Storage};
pub use travel_mode::TravelMode;
