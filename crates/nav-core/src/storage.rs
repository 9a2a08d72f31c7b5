//! Read-only element storage shared by every immutable structure.
//!
//! A [`Storage<T>`] is either an owned heap vector (built in-process or read
//! from a file) or a typed view into a byte region that somebody else owns,
//! typically a memory-mapped shared segment.  Graphs, range tables, and
//! R-trees are written once against `Storage` and work unchanged over both.
//!
//! Mapped views are validated once, at construction: the byte range must be
//! in bounds and suitably aligned for `T`.  After that, access is a plain
//! slice cast with no further checks.

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::Deref;
use std::sync::Arc;

use bytemuck::Pod;

use crate::{CoreError, CoreResult};

// ── ByteRegion ────────────────────────────────────────────────────────────────

/// An immutable, contiguous byte region that typed views can borrow from.
///
/// Implemented by heap buffers and by memory-mapped files.  The bytes must
/// never change while any `Arc` to the region is alive.
pub trait ByteRegion: Send + Sync {
    fn bytes(&self) -> &[u8];
}

/// An 8-byte aligned heap buffer.
///
/// Backed by `u64` words so any `Pod` record with alignment ≤ 8 can be cast
/// from it, unlike a plain `Vec<u8>`.
pub struct HeapRegion {
    words: Vec<u64>,
    len:   usize,
}

impl HeapRegion {
    /// A zero-filled region of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self { words: vec![0u64; len.div_ceil(8)], len }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl ByteRegion for HeapRegion {
    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }
}

impl fmt::Debug for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapRegion").field("len", &self.len).finish()
    }
}

// ── MappedSlice ───────────────────────────────────────────────────────────────

/// A typed, bounds-checked view of `len` elements of `T` starting at byte
/// `offset` of a shared region.  Cloning shares the region.
pub struct MappedSlice<T> {
    region:  Arc<dyn ByteRegion>,
    offset:  usize,
    len:     usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> MappedSlice<T> {
    pub fn new(region: Arc<dyn ByteRegion>, offset: usize, len: usize) -> CoreResult<Self> {
        let byte_len = len
            .checked_mul(size_of::<T>())
            .ok_or_else(|| CoreError::InvalidView(format!("{len} elements overflow usize")))?;
        let end = offset
            .checked_add(byte_len)
            .ok_or_else(|| CoreError::InvalidView(format!("offset {offset} overflows usize")))?;
        let bytes = region.bytes().get(offset..end).ok_or_else(|| {
            CoreError::InvalidView(format!(
                "bytes {offset}..{end} outside region of {} bytes",
                region.bytes().len()
            ))
        })?;
        bytemuck::try_cast_slice::<u8, T>(bytes)
            .map_err(|e| CoreError::InvalidView(format!("bytes {offset}..{end}: {e}")))?;

        Ok(Self { region, offset, len, _marker: PhantomData })
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        let end = self.offset + self.len * size_of::<T>();
        bytemuck::cast_slice(&self.region.bytes()[self.offset..end])
    }
}

impl<T> Clone for MappedSlice<T> {
    fn clone(&self) -> Self {
        Self {
            region:  Arc::clone(&self.region),
            offset:  self.offset,
            len:     self.len,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for MappedSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedSlice")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("region_len", &self.region.bytes().len())
            .finish()
    }
}

// ── Storage ───────────────────────────────────────────────────────────────────

/// Owned-heap or mapped backing for an immutable array of `T`.
pub enum Storage<T: Pod> {
    Owned(Vec<T>),
    Mapped(MappedSlice<T>),
}

impl<T: Pod> Storage<T> {
    /// `true` if the elements live in a region owned elsewhere.
    pub fn is_mapped(&self) -> bool {
        matches!(self, Storage::Mapped(_))
    }

    /// Copy the elements into an owned vector.
    pub fn to_owned_storage(&self) -> Storage<T> {
        Storage::Owned(self.to_vec())
    }
}

impl<T: Pod> Deref for Storage<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        match self {
            Storage::Owned(v)  => v,
            Storage::Mapped(m) => m.as_slice(),
        }
    }
}

impl<T: Pod> From<Vec<T>> for Storage<T> {
    fn from(v: Vec<T>) -> Self {
        Storage::Owned(v)
    }
}

impl<T: Pod> From<MappedSlice<T>> for Storage<T> {
    fn from(m: MappedSlice<T>) -> Self {
        Storage::Mapped(m)
    }
}

impl<T: Pod> Clone for Storage<T> {
    fn clone(&self) -> Self {
        match self {
            Storage::Owned(v)  => Storage::Owned(v.clone()),
            Storage::Mapped(m) => Storage::Mapped(m.clone()),
        }
    }
}

impl<T: Pod> Default for Storage<T> {
    fn default() -> Self {
        Storage::Owned(Vec::new())
    }
}

impl<T: Pod> fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_mapped() { "mapped" } else { "owned" };
        write!(f, "Storage<{}>({kind}, len = {})", std::any::type_name::<T>(), self.len())
    }
}
