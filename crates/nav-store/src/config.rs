//! Dataset configuration: which artifact files make up one dataset.
//!
//! Usually derived from a common base path with [`DataStoreConfig::from_base`];
//! can also be read from TOML:
//!
//! ```toml
//! hsgr       = "berlin.osrm.hsgr"
//! ram_index  = "berlin.osrm.ramIndex"
//! file_index = "berlin.osrm.fileIndex"
//! nodes      = "berlin.osrm.nodes"
//! edges      = "berlin.osrm.edges"
//! names      = "berlin.osrm.names"
//! geometry   = "berlin.osrm.geometry"
//! timestamp  = "berlin.osrm.timestamp"   # optional
//!
//! [rtree]
//! branching_factor = 64
//! leaf_node_size   = 1024
//! ```
//!
//! Relative paths in a file are resolved against the file's directory.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use nav_core::io::require_non_empty;
use nav_spatial::RTreeParams;

use crate::{StoreError, StoreResult};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataStoreConfig {
    pub hsgr:       PathBuf,
    /// Tree file with the internal R-tree nodes.
    pub ram_index:  PathBuf,
    /// Leaf file of the R-tree; stays on disk.
    pub file_index: PathBuf,
    pub nodes:      PathBuf,
    pub edges:      PathBuf,
    pub names:      PathBuf,
    pub geometry:   PathBuf,
    #[serde(default)]
    pub timestamp:  Option<PathBuf>,
    #[serde(default)]
    pub rtree:      RTreeParams,
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl DataStoreConfig {
    /// The conventional `<base>.hsgr`, `<base>.ramIndex`, ... file set, with
    /// default R-tree parameters.
    pub fn from_base(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            hsgr:       with_suffix(base, ".hsgr"),
            ram_index:  with_suffix(base, ".ramIndex"),
            file_index: with_suffix(base, ".fileIndex"),
            nodes:      with_suffix(base, ".nodes"),
            edges:      with_suffix(base, ".edges"),
            names:      with_suffix(base, ".names"),
            geometry:   with_suffix(base, ".geometry"),
            timestamp:  Some(with_suffix(base, ".timestamp")),
            rtree:      RTreeParams::default(),
        }
    }

    pub fn with_rtree_params(mut self, params: RTreeParams) -> Self {
        self.rtree = params;
        self
    }

    pub fn with_timestamp(mut self, path: Option<PathBuf>) -> Self {
        self.timestamp = path;
        self
    }

    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(dir) = path.parent() {
            config.resolve_relative_to(dir);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        for path in self.required_paths_mut() {
            resolve(path);
        }
        if let Some(path) = self.timestamp.as_mut() {
            resolve(path);
        }
    }

    fn required_paths_mut(&mut self) -> [&mut PathBuf; 7] {
        [
            &mut self.hsgr,
            &mut self.ram_index,
            &mut self.file_index,
            &mut self.nodes,
            &mut self.edges,
            &mut self.names,
            &mut self.geometry,
        ]
    }

    /// Every file a dataset cannot do without.
    pub fn required_paths(&self) -> [&Path; 7] {
        [
            &self.hsgr,
            &self.ram_index,
            &self.file_index,
            &self.nodes,
            &self.edges,
            &self.names,
            &self.geometry,
        ]
    }

    /// Fail on the first required file that is missing or empty, and on
    /// invalid R-tree parameters.  The timestamp file is optional.
    pub fn validate(&self) -> StoreResult<()> {
        self.rtree.validate()?;
        for path in self.required_paths() {
            require_non_empty(path)?;
        }
        Ok(())
    }
}
