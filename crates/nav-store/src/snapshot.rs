//! The published-snapshot record and the directories that hold it.
//!
//! A [`PublishedSnapshot`] names the live `(layout, data)` region pair and a
//! version that grows by one per publication.  It is the only shared
//! mutable state of the store.  A [`SnapshotDirectory`] owns it together
//! with the reader accounting that lets a publisher wait for queries on the
//! superseded pair to finish.
//!
//! # Publication protocol
//!
//! 1. [`begin_update`](SnapshotDirectory::begin_update) makes the caller the
//!    only publisher.  The loader holds it from region selection until the
//!    old pair is deleted;
//! 2. write `{new pair, version + 1}`; from here on every `enter_query`
//!    sees the new pair;
//! 3. wait until no reader, in any process sharing the directory, still
//!    counts against the old pair;
//! 4. return.  The caller deletes the old pair, then drops the guard.
//!
//! A reader is counted before it checks the snapshot a second time, so a
//! publisher either waits for it or the reader sees the flip and retries on
//! the new pair.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::{MmapMut, MmapOptions};
use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::{RegionId, StoreError, StoreResult};

// ── PublishedSnapshot ─────────────────────────────────────────────────────────

/// Which region pair is live, and since which publication.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PublishedSnapshot {
    pub layout:  RegionId,
    pub data:    RegionId,
    pub version: u32,
}

impl PublishedSnapshot {
    /// The state of a directory nothing was published to.
    pub const NONE: PublishedSnapshot = PublishedSnapshot {
        layout:  RegionId::LayoutNone,
        data:    RegionId::DataNone,
        version: 0,
    };

    pub fn is_published(&self) -> bool {
        self.layout != RegionId::LayoutNone && self.data != RegionId::DataNone
    }

    #[inline]
    pub fn pair(&self) -> (RegionId, RegionId) {
        (self.layout, self.data)
    }

    fn to_word(self) -> u64 {
        bytemuck::cast(SnapshotRecord {
            layout:  self.layout as u16,
            data:    self.data as u16,
            version: self.version,
        })
    }

    fn from_word(word: u64) -> StoreResult<Self> {
        if word == 0 {
            return Ok(Self::NONE);
        }
        let record: SnapshotRecord = bytemuck::cast(word);
        let region = |raw: u16| {
            RegionId::from_u32(raw.into())
                .ok_or_else(|| StoreError::malformed("snapshot record", format!("unknown region id {raw}")))
        };
        Ok(Self {
            layout:  region(record.layout)?,
            data:    region(record.data)?,
            version: record.version,
        })
    }
}

impl std::fmt::Display for PublishedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} v{}", self.layout, self.data, self.version)
    }
}

/// Shared form of a [`PublishedSnapshot`]: one 8-byte word, read and
/// replaced atomically.  All zeroes means nothing was published.
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct SnapshotRecord {
    layout:  u16,
    data:    u16,
    version: u32,
}

/// Result of [`SnapshotDirectory::publish`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Publication {
    pub snapshot: PublishedSnapshot,
    /// The pair that was live before, drained of readers.  `None` on the
    /// first publication.
    pub replaced: Option<PublishedSnapshot>,
}

// ── SnapshotDirectory ─────────────────────────────────────────────────────────

/// Holder of the live [`PublishedSnapshot`] and its reader accounting.
pub trait SnapshotDirectory: Send + Sync {
    /// The live snapshot, if anything was published.
    fn current(&self) -> StoreResult<Option<PublishedSnapshot>>;

    /// Read the live snapshot and count one in-flight query against it.
    /// Every `Some` must be paired with one [`leave_query`](Self::leave_query).
    fn enter_query(&self) -> StoreResult<Option<PublishedSnapshot>>;

    fn leave_query(&self, snapshot: &PublishedSnapshot);

    /// Become the only publisher until the guard is dropped.
    fn begin_update(&self) -> StoreResult<UpdateGuard<'_>>;

    /// Make `(layout, data)` live and wait until no query still uses the
    /// pair it replaces.  `update` comes from this directory's
    /// [`begin_update`](Self::begin_update).
    fn publish_under(&self, update: &UpdateGuard<'_>, layout: RegionId, data: RegionId) -> StoreResult<Publication>;

    /// [`begin_update`](Self::begin_update) and
    /// [`publish_under`](Self::publish_under) in one step.
    fn publish(&self, layout: RegionId, data: RegionId) -> StoreResult<Publication> {
        let update = self.begin_update()?;
        self.publish_under(&update, layout, data)
    }
}

/// Exclusive right to publish to one directory.  Released on drop.
#[must_use = "the update lock is released as soon as the guard is dropped"]
pub struct UpdateGuard<'d> {
    hold: UpdateHold<'d>,
}

/// Held only for what it releases on drop.
#[allow(dead_code)]
enum UpdateHold<'d> {
    Thread(MutexGuard<'d, ()>),
    /// Exclusive advisory lock on the directory's lock file.  The OS drops
    /// it with the descriptor, also when the process dies.
    File(File),
}

impl std::fmt::Debug for UpdateGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.hold {
            UpdateHold::Thread(_) => "thread",
            UpdateHold::File(_) => "file",
        };
        f.debug_struct("UpdateGuard").field("kind", &kind).finish()
    }
}

// ── QueryGate ─────────────────────────────────────────────────────────────────

type Pair = (RegionId, RegionId);

/// In-flight query counts per region pair, plus the condition variable a
/// publisher waits on.
#[derive(Default)]
struct QueryGate {
    in_flight: Mutex<FxHashMap<Pair, usize>>,
    drained:   Condvar,
}

impl QueryGate {
    fn enter(
        &self,
        read: impl FnOnce() -> StoreResult<PublishedSnapshot>,
    ) -> StoreResult<Option<PublishedSnapshot>> {
        let mut counts = self.in_flight.lock();
        let snapshot = read()?;
        if !snapshot.is_published() {
            return Ok(None);
        }
        *counts.entry(snapshot.pair()).or_default() += 1;
        Ok(Some(snapshot))
    }

    fn leave(&self, snapshot: &PublishedSnapshot) {
        let mut counts = self.in_flight.lock();
        if let Some(count) = counts.get_mut(&snapshot.pair()) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&snapshot.pair());
                self.drained.notify_all();
            }
        }
    }

    /// Run `flip` under the query lock, then wait for the pair it replaced
    /// to drain.
    fn swap(
        &self,
        flip: impl FnOnce() -> StoreResult<(PublishedSnapshot, PublishedSnapshot)>,
    ) -> StoreResult<Publication> {
        let mut counts = self.in_flight.lock();
        let (previous, snapshot) = flip()?;

        let replaced = previous.is_published().then_some(previous);
        if let Some(old) = replaced.filter(|old| old.pair() != snapshot.pair()) {
            while counts.get(&old.pair()).is_some_and(|&n| n > 0) {
                debug!(old = %old, waiting = counts[&old.pair()], "waiting for readers to drain");
                self.drained.wait(&mut counts);
            }
        }
        Ok(Publication { snapshot, replaced })
    }

    fn in_flight(&self, pair: Pair) -> usize {
        self.in_flight.lock().get(&pair).copied().unwrap_or(0)
    }
}

fn next_snapshot(previous: PublishedSnapshot, layout: RegionId, data: RegionId) -> PublishedSnapshot {
    PublishedSnapshot {
        layout,
        data,
        version: previous.version.wrapping_add(1),
    }
}

// ── InProcessDirectory ────────────────────────────────────────────────────────

/// Snapshot directory shared by the threads of one process.
#[derive(Default)]
pub struct InProcessDirectory {
    current: Mutex<Option<PublishedSnapshot>>,
    update:  Mutex<()>,
    gate:    QueryGate,
}

impl InProcessDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries currently counted against `snapshot`'s pair.
    pub fn in_flight(&self, snapshot: &PublishedSnapshot) -> usize {
        self.gate.in_flight(snapshot.pair())
    }

    fn read(&self) -> PublishedSnapshot {
        self.current.lock().unwrap_or(PublishedSnapshot::NONE)
    }
}

impl SnapshotDirectory for InProcessDirectory {
    fn current(&self) -> StoreResult<Option<PublishedSnapshot>> {
        Ok(Some(self.read()).filter(PublishedSnapshot::is_published))
    }

    fn enter_query(&self) -> StoreResult<Option<PublishedSnapshot>> {
        self.gate.enter(|| Ok(self.read()))
    }

    fn leave_query(&self, snapshot: &PublishedSnapshot) {
        self.gate.leave(snapshot);
    }

    fn begin_update(&self) -> StoreResult<UpdateGuard<'_>> {
        Ok(UpdateGuard { hold: UpdateHold::Thread(self.update.lock()) })
    }

    fn publish_under(&self, _update: &UpdateGuard<'_>, layout: RegionId, data: RegionId) -> StoreResult<Publication> {
        let publication = self.gate.swap(|| {
            let mut current = self.current.lock();
            let previous = current.unwrap_or(PublishedSnapshot::NONE);
            let snapshot = next_snapshot(previous, layout, data);
            *current = Some(snapshot);
            Ok((previous, snapshot))
        })?;
        info!(snapshot = %publication.snapshot, "published snapshot");
        Ok(publication)
    }
}

// ── FileDirectory ─────────────────────────────────────────────────────────────

/// Snapshot directory kept beside the region files, for readers in other
/// processes.
///
/// * `CURRENT_REGIONS` holds the snapshot as one word, mapped shared by
///   every process and read with a single atomic load.
/// * `update.lock` serialises publishers through an exclusive advisory
///   lock; a second publisher fails with [`StoreError::UpdateInProgress`]
///   instead of waiting.  A lock left by a dead process is released by the
///   OS, so the file itself may linger harmlessly.
/// * `<LAYOUT>.readers` is share-locked by every process with queries on
///   that pair.  A publisher takes it exclusively to wait them out.
pub struct FileDirectory {
    dir:     PathBuf,
    word:    SnapshotWord,
    readers: Mutex<FxHashMap<Pair, ReaderHold>>,
}

/// This directory's queries on one pair, and the shared lock they hold
/// together.
struct ReaderHold {
    count: usize,
    lock:  File,
}

/// `CURRENT_REGIONS`, mapped shared.
struct SnapshotWord {
    map: MmapMut,
}

impl SnapshotWord {
    const LEN: usize = size_of::<u64>();

    fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?;
        match file.metadata()?.len() {
            0 => file.set_len(Self::LEN as u64)?,
            len if len == Self::LEN as u64 => {}
            len => {
                return Err(StoreError::malformed(
                    "snapshot record",
                    format!("{} is {len} bytes, expected {}", path.display(), Self::LEN),
                ));
            }
        }
        // SAFETY: the file is never truncated while mapped, and every
        // process touches its contents only through `word`.
        let map = unsafe { MmapOptions::new().len(Self::LEN).map_mut(&file)? };
        Ok(Self { map })
    }

    fn word(&self) -> &AtomicU64 {
        // SAFETY: mappings are page aligned, so the pointer is aligned for
        // `u64` and valid for `LEN` bytes while `map` lives.  `AtomicU64`
        // has the layout of `u64`.
        unsafe { &*self.map.as_ptr().cast::<AtomicU64>() }
    }

    fn load(&self) -> StoreResult<PublishedSnapshot> {
        PublishedSnapshot::from_word(self.word().load(Ordering::Acquire))
    }

    fn store(&self, snapshot: PublishedSnapshot) -> StoreResult<()> {
        self.word().store(snapshot.to_word(), Ordering::Release);
        self.map.flush()?;
        Ok(())
    }
}

impl FileDirectory {
    pub const SNAPSHOT_FILE: &'static str = "CURRENT_REGIONS";
    pub const LOCK_FILE: &'static str = "update.lock";
    pub const READERS_EXTENSION: &'static str = "readers";

    pub fn open_dir(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let word = SnapshotWord::open(&dir.join(Self::SNAPSHOT_FILE))?;
        Ok(Self { dir, word, readers: Mutex::new(FxHashMap::default()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queries of this directory handle counted against `snapshot`'s pair.
    pub fn in_flight(&self, snapshot: &PublishedSnapshot) -> usize {
        self.readers.lock().get(&snapshot.pair()).map_or(0, |hold| hold.count)
    }

    fn readers_file(&self, layout: RegionId) -> StoreResult<File> {
        let path = self.dir.join(layout.name()).with_extension(Self::READERS_EXTENSION);
        Ok(OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?)
    }

    fn count_reader(&self, pair: Pair) -> StoreResult<()> {
        let mut readers = self.readers.lock();
        if let Some(hold) = readers.get_mut(&pair) {
            hold.count += 1;
            return Ok(());
        }
        let lock = self.readers_file(pair.0)?;
        lock.lock_shared()?;
        readers.insert(pair, ReaderHold { count: 1, lock });
        Ok(())
    }

    fn release_reader(&self, pair: Pair) {
        let mut readers = self.readers.lock();
        if let Some(hold) = readers.get_mut(&pair) {
            hold.count -= 1;
            if hold.count == 0 {
                // Closing the file drops the shared lock.
                readers.remove(&pair);
            }
        }
    }

    /// Block until no process holds a reader lock on `old`'s pair.
    fn drain(&self, old: &PublishedSnapshot) -> StoreResult<()> {
        let readers = self.readers_file(old.layout)?;
        match readers.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                debug!(old = %old, "waiting for readers to drain");
                readers.lock()?;
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        Ok(())
    }
}

impl SnapshotDirectory for FileDirectory {
    fn current(&self) -> StoreResult<Option<PublishedSnapshot>> {
        Ok(Some(self.word.load()?).filter(PublishedSnapshot::is_published))
    }

    fn enter_query(&self) -> StoreResult<Option<PublishedSnapshot>> {
        loop {
            let seen = self.word.load()?;
            if !seen.is_published() {
                return Ok(None);
            }
            self.count_reader(seen.pair())?;
            match self.word.load() {
                Ok(live) if live.pair() == seen.pair() => return Ok(Some(live)),
                // Flipped before the lock was taken; the old pair may be gone.
                Ok(_) => self.release_reader(seen.pair()),
                Err(e) => {
                    self.release_reader(seen.pair());
                    return Err(e);
                }
            }
        }
    }

    fn leave_query(&self, snapshot: &PublishedSnapshot) {
        self.release_reader(snapshot.pair());
    }

    fn begin_update(&self) -> StoreResult<UpdateGuard<'_>> {
        let path = self.dir.join(Self::LOCK_FILE);
        let mut file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(StoreError::UpdateInProgress { path }),
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        // Owner pid, for operators.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(UpdateGuard { hold: UpdateHold::File(file) })
    }

    fn publish_under(&self, _update: &UpdateGuard<'_>, layout: RegionId, data: RegionId) -> StoreResult<Publication> {
        let previous = self.word.load()?;
        let snapshot = next_snapshot(previous, layout, data);
        self.word.store(snapshot)?;

        let replaced = previous.is_published().then_some(previous);
        if let Some(old) = replaced.filter(|old| old.pair() != snapshot.pair()) {
            self.drain(&old)?;
        }
        info!(snapshot = %snapshot, dir = %self.dir.display(), "published snapshot");
        Ok(Publication { snapshot, replaced })
    }
}

impl std::fmt::Debug for FileDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDirectory").field("dir", &self.dir).finish()
    }
}

impl std::fmt::Debug for InProcessDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessDirectory").field("current", &self.read()).finish()
    }
}
