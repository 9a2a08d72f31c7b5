//! Query-side entry points.
//!
//! [`SharedDataFacade`] serves whatever dataset is currently published and
//! follows new publications; [`InternalDataFacade`] serves one dataset
//! loaded into process memory.  Both hand out `&Dataset`, so query code does
//! not care which one it runs against.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{DataLayout, DataStoreConfig, Dataset, PublishedSnapshot, RegionStore, SnapshotDirectory, StoreError, StoreResult};

// ── SharedDataFacade ──────────────────────────────────────────────────────────

/// Reader of published datasets.
///
/// Keeps the views of the last snapshot it saw.  Every
/// [`session`](Self::session) compares the live snapshot with that cache and
/// rebuilds the views only when they differ.
pub struct SharedDataFacade<S, D> {
    regions:   S,
    directory: Arc<D>,
    cached:    RwLock<Option<(PublishedSnapshot, Arc<Dataset>)>>,
}

impl<S: RegionStore, D: SnapshotDirectory> SharedDataFacade<S, D> {
    /// A facade with no views yet; the first session attaches.
    pub fn new(regions: S, directory: Arc<D>) -> Self {
        Self { regions, directory, cached: RwLock::new(None) }
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    pub fn regions(&self) -> &S {
        &self.regions
    }

    /// Snapshot the cached views belong to.
    pub fn cached_snapshot(&self) -> Option<PublishedSnapshot> {
        self.cached.read().as_ref().map(|(snapshot, _)| *snapshot)
    }

    /// Rebuild the views if a different snapshot is live.  Returns whether
    /// they were rebuilt.
    pub fn refresh_if_stale(&self) -> StoreResult<bool> {
        let live = self.directory.current()?.ok_or(StoreError::NoDataPublished)?;
        if self.cached_snapshot() == Some(live) {
            return Ok(false);
        }
        self.dataset_for(live)?;
        Ok(true)
    }

    /// Begin a query against the live snapshot.
    ///
    /// The snapshot stays counted as in use until the session is dropped,
    /// so a publisher cannot retire it underneath the query.
    pub fn session(&self) -> StoreResult<QuerySession<'_, D>> {
        let snapshot = self.directory.enter_query()?.ok_or(StoreError::NoDataPublished)?;
        let guard = InFlight { directory: &*self.directory, snapshot };
        let dataset = self.dataset_for(snapshot)?;
        Ok(QuerySession { dataset, guard })
    }

    fn dataset_for(&self, snapshot: PublishedSnapshot) -> StoreResult<Arc<Dataset>> {
        if let Some((cached, dataset)) = self.cached.read().as_ref() {
            if *cached == snapshot {
                return Ok(Arc::clone(dataset));
            }
        }

        let mut cached = self.cached.write();
        if let Some((current, dataset)) = cached.as_ref() {
            if *current == snapshot {
                return Ok(Arc::clone(dataset));
            }
        }
        let dataset = Arc::new(self.attach(snapshot)?);
        // A session that entered before the last refresh gets its own views;
        // the cache only moves forward.
        if cached.as_ref().is_some_and(|(current, _)| current.version > snapshot.version) {
            debug!(snapshot = %snapshot, "attached to a superseded snapshot without caching it");
            return Ok(dataset);
        }
        *cached = Some((snapshot, Arc::clone(&dataset)));
        info!(snapshot = %snapshot, checksum = dataset.checksum(), "attached to published dataset");
        Ok(dataset)
    }

    fn attach(&self, snapshot: PublishedSnapshot) -> StoreResult<Dataset> {
        debug!(snapshot = %snapshot, "mapping published regions");
        let layout_region = self.regions.open(snapshot.layout)?;
        let layout = DataLayout::from_bytes(layout_region.bytes())?;
        let data_region = self.regions.open(snapshot.data)?;
        Dataset::from_region(&layout, data_region)
    }
}

/// Counts one in-flight query until dropped.
struct InFlight<'f, D: SnapshotDirectory + ?Sized> {
    directory: &'f D,
    snapshot:  PublishedSnapshot,
}

impl<D: SnapshotDirectory + ?Sized> Drop for InFlight<'_, D> {
    fn drop(&mut self) {
        self.directory.leave_query(&self.snapshot);
    }
}

/// One query's hold on a published dataset.  Derefs to [`Dataset`].
pub struct QuerySession<'f, D: SnapshotDirectory + ?Sized> {
    dataset: Arc<Dataset>,
    guard:   InFlight<'f, D>,
}

impl<D: SnapshotDirectory + ?Sized> QuerySession<'_, D> {
    pub fn snapshot(&self) -> PublishedSnapshot {
        self.guard.snapshot
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }
}

impl<D: SnapshotDirectory + ?Sized> Deref for QuerySession<'_, D> {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.dataset
    }
}

// ── InternalDataFacade ────────────────────────────────────────────────────────

/// A dataset read into process memory, without any publication protocol.
#[derive(Clone, Debug)]
pub struct InternalDataFacade {
    dataset: Arc<Dataset>,
}

impl InternalDataFacade {
    pub fn load(config: &DataStoreConfig) -> StoreResult<Self> {
        Ok(Self { dataset: Arc::new(Dataset::load_files(config)?) })
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }
}

impl Deref for InternalDataFacade {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.dataset
    }
}
