//! Named byte regions: the storage the loader writes and facades map.
//!
//! A [`RegionStore`] hands out whole regions by [`RegionId`].  Regions are
//! written exactly once, through the `fill` callback of
//! [`create`](RegionStore::create), and are immutable from the moment
//! `create` returns.  Readers get an `Arc<dyn ByteRegion>` that stays valid
//! even after the region is removed from the store.
//!
//! Two stores are provided:
//!
//! * [`InProcessRegions`] keeps regions on the heap; used by tests and by
//!   single-process deployments that still want hot-swap.
//! * [`FileRegions`] keeps each region in a file under one directory and
//!   maps it with `memmap2`, so several processes can share a dataset.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use nav_core::{ByteRegion, HeapRegion};

use crate::{StoreError, StoreResult};

// ── RegionId ──────────────────────────────────────────────────────────────────

/// The fixed set of region names.  Data sets alternate between pair 1 and
/// pair 2; `*None` mark an empty directory.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum RegionId {
    CurrentRegions = 0,
    Layout1        = 1,
    Data1          = 2,
    Layout2        = 3,
    Data2          = 4,
    LayoutNone     = 5,
    DataNone       = 6,
}

impl RegionId {
    pub const ALL: [RegionId; 7] = [
        RegionId::CurrentRegions,
        RegionId::Layout1,
        RegionId::Data1,
        RegionId::Layout2,
        RegionId::Data2,
        RegionId::LayoutNone,
        RegionId::DataNone,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RegionId::CurrentRegions => "CURRENT_REGIONS",
            RegionId::Layout1 => "LAYOUT_1",
            RegionId::Data1 => "DATA_1",
            RegionId::Layout2 => "LAYOUT_2",
            RegionId::Data2 => "DATA_2",
            RegionId::LayoutNone => "LAYOUT_NONE",
            RegionId::DataNone => "DATA_NONE",
        }
    }

    pub fn from_u32(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// The data region written together with this layout region.
    pub fn data_partner(self) -> Option<Self> {
        match self {
            RegionId::Layout1 => Some(RegionId::Data1),
            RegionId::Layout2 => Some(RegionId::Data2),
            RegionId::LayoutNone => Some(RegionId::DataNone),
            _ => None,
        }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── RegionStore ───────────────────────────────────────────────────────────────

/// Where regions live.
pub trait RegionStore: Send + Sync {
    fn exists(&self, id: RegionId) -> bool;

    /// Allocate a zero-filled region of `len` bytes, let `fill` write it,
    /// then make it visible under `id`, replacing any previous region of
    /// that name.  Nothing becomes visible if `fill` fails.
    fn create(
        &self,
        id: RegionId,
        len: usize,
        fill: &mut dyn FnMut(&mut [u8]) -> StoreResult<()>,
    ) -> StoreResult<()>;

    fn open(&self, id: RegionId) -> StoreResult<Arc<dyn ByteRegion>>;

    /// Drop `id` from the store.  Returns `false` if it did not exist.
    /// Outstanding `Arc`s keep the bytes alive.
    fn remove(&self, id: RegionId) -> StoreResult<bool>;
}

impl<T: RegionStore + ?Sized> RegionStore for Arc<T> {
    fn exists(&self, id: RegionId) -> bool {
        (**self).exists(id)
    }

    fn create(
        &self,
        id: RegionId,
        len: usize,
        fill: &mut dyn FnMut(&mut [u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        (**self).create(id, len, fill)
    }

    fn open(&self, id: RegionId) -> StoreResult<Arc<dyn ByteRegion>> {
        (**self).open(id)
    }

    fn remove(&self, id: RegionId) -> StoreResult<bool> {
        (**self).remove(id)
    }
}

fn check_len(id: RegionId, len: usize) -> StoreResult<()> {
    if len == 0 {
        return Err(StoreError::malformed("region", format!("{id} would be empty")));
    }
    Ok(())
}

// ── InProcessRegions ──────────────────────────────────────────────────────────

/// Heap-backed regions shared between threads of one process.
#[derive(Default)]
pub struct InProcessRegions {
    regions: Mutex<FxHashMap<RegionId, Arc<HeapRegion>>>,
}

impl InProcessRegions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegionStore for InProcessRegions {
    fn exists(&self, id: RegionId) -> bool {
        self.regions.lock().contains_key(&id)
    }

    fn create(
        &self,
        id: RegionId,
        len: usize,
        fill: &mut dyn FnMut(&mut [u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        check_len(id, len)?;
        let mut region = HeapRegion::zeroed(len);
        fill(region.bytes_mut())?;
        self.regions.lock().insert(id, Arc::new(region));
        debug!(region = %id, len, "created heap region");
        Ok(())
    }

    fn open(&self, id: RegionId) -> StoreResult<Arc<dyn ByteRegion>> {
        let region = self
            .regions
            .lock()
            .get(&id)
            .cloned()
            .ok_or(StoreError::RegionMissing { region: id })?;
        Ok(region)
    }

    fn remove(&self, id: RegionId) -> StoreResult<bool> {
        Ok(self.regions.lock().remove(&id).is_some())
    }
}

impl fmt::Debug for InProcessRegions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regions = self.regions.lock();
        let mut names: Vec<&str> = regions.keys().map(|id| id.name()).collect();
        names.sort_unstable();
        f.debug_struct("InProcessRegions").field("regions", &names).finish()
    }
}

// ── FileRegions ───────────────────────────────────────────────────────────────

/// Memory-mapped regions, one `<NAME>.region` file each, under `dir`.
///
/// A region is written to a temporary file and renamed into place, so a
/// reader never maps a half-written region.  Removing a region unlinks its
/// file; existing mappings stay valid until dropped.
#[derive(Clone, Debug)]
pub struct FileRegions {
    dir: PathBuf,
}

/// A read-only mapping of one region file.
struct MappedRegion {
    map: Mmap,
}

impl ByteRegion for MappedRegion {
    fn bytes(&self) -> &[u8] {
        &self.map
    }
}

impl FileRegions {
    /// Use (and create if needed) `dir` as the region directory.
    pub fn open_dir(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, id: RegionId) -> PathBuf {
        self.dir.join(format!("{}.region", id.name()))
    }

    fn temp_path_of(&self, id: RegionId) -> PathBuf {
        self.dir.join(format!("{}.region.tmp", id.name()))
    }
}

impl RegionStore for FileRegions {
    fn exists(&self, id: RegionId) -> bool {
        self.path_of(id).is_file()
    }

    fn create(
        &self,
        id: RegionId,
        len: usize,
        fill: &mut dyn FnMut(&mut [u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        check_len(id, len)?;
        let temp = self.temp_path_of(id);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)?;
        file.set_len(len as u64)?;

        // SAFETY: the temporary file was just created and sized by this
        // process and is not visible under its final name yet, so nothing
        // else maps or writes it while this mapping is alive.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        let written = fill(&mut map[..]).and_then(|()| Ok(map.flush()?));
        drop(map);
        drop(file);

        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        fs::rename(&temp, self.path_of(id))?;
        debug!(region = %id, len, dir = %self.dir.display(), "created region file");
        Ok(())
    }

    fn open(&self, id: RegionId) -> StoreResult<Arc<dyn ByteRegion>> {
        let path = self.path_of(id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::RegionMissing { region: id });
            }
            Err(e) => return Err(e.into()),
        };
        // SAFETY: region files are written once under a temporary name and
        // renamed into place; a published file is never modified again, only
        // unlinked, which leaves this mapping intact.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Arc::new(MappedRegion { map }))
    }

    fn remove(&self, id: RegionId) -> StoreResult<bool> {
        match fs::remove_file(self.path_of(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
