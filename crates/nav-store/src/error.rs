//! Data-store error type.

use std::path::PathBuf;

use thiserror::Error;

use nav_core::CoreError;
use nav_graph::GraphError;
use nav_spatial::SpatialError;

use crate::{BlockId, RegionId};

/// Errors produced by `nav-store`.
///
/// Everything here is fatal for the dataset being loaded or attached: a
/// process that hits one of these refuses to serve that dataset.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A sentinel around a shared block does not match.
    #[error("shared block {block} is corrupted (sentinel mismatch)")]
    CorruptedBlock { block: BlockId },

    #[error("no dataset has been published yet")]
    NoDataPublished,

    #[error("region {region} does not exist")]
    RegionMissing { region: RegionId },

    /// Another loader holds the update lock.
    #[error("another update is in progress (lock file {path})")]
    UpdateInProgress { path: PathBuf },

    /// An artifact or region whose contents disagree with its own header.
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Spatial(#[from] SpatialError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Malformed { what, detail: detail.into() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
