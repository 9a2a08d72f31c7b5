//! `nav-store` — loading, publishing and serving complete datasets.
//!
//! A dataset (graph, coordinates, names, geometries, R-tree) is copied into
//! one data region laid out by a [`DataLayout`].  A loader writes it into
//! whichever region pair is idle and publishes it; query processes attach
//! through a [`SharedDataFacade`] and switch to the new pair on their next
//! session, while sessions still running on the old pair finish undisturbed.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                    |
//! |---------------|-------------------------------------------------------------|
//! | [`layout`]    | `BlockId`, `DataLayout`, sentinel-framed block access        |
//! | [`region`]    | `RegionId`, `RegionStore`, heap and memory-mapped stores     |
//! | [`snapshot`]  | `PublishedSnapshot`, `SnapshotDirectory` implementations     |
//! | [`loader`]    | `DataLoader`, region pair selection                          |
//! | [`dataset`]   | `Dataset`, typed views and accessors                         |
//! | [`facade`]    | `SharedDataFacade`, `QuerySession`, `InternalDataFacade`     |
//! | [`artifacts`] | `.nodes`, `.edges`, `.geometry`, `.names`, `.timestamp`      |
//! | [`config`]    | `DataStoreConfig`                                            |
//! | [`error`]     | `StoreError`, `StoreResult<T>`                               |

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod facade;
pub mod layout;
pub mod loader;
pub mod region;
pub mod snapshot;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::DataStoreConfig;
pub use dataset::Dataset;
pub use error::{StoreError, StoreResult};
pub use facade::{InternalDataFacade, QuerySession, SharedDataFacade};
pub use layout::{BlockFrame, BlockId, DataLayout, SENTINEL};
pub use loader::{DataLoader, RegionPlan, select_regions};
pub use region::{FileRegions, InProcessRegions, RegionId, RegionStore};
pub use snapshot::{
    FileDirectory, InProcessDirectory, Publication, PublishedSnapshot, SnapshotDirectory, UpdateGuard,
};
