//! Little-endian fixed-record file helpers.
//!
//! Every artifact in the data store is a sequence of `u32`/`u64` counts
//! followed by arrays of `#[repr(C)]` POD records.  Records are written and
//! read as their raw bytes through `bytemuck`; all supported targets are
//! little-endian.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use bytemuck::Pod;

use crate::{CoreError, CoreResult};

/// Fail with [`CoreError::MissingOrEmptyFile`] unless `path` names a
/// non-empty file.  Returns the file length.
pub fn require_non_empty(path: &Path) -> CoreResult<u64> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(CoreError::MissingOrEmptyFile { path: path.to_path_buf() }),
    }
}

pub fn read_pod<T: Pod, R: Read>(reader: &mut R) -> io::Result<T> {
    let mut value = T::zeroed();
    reader.read_exact(bytemuck::bytes_of_mut(&mut value))?;
    Ok(value)
}

/// Read `count` consecutive records.
pub fn read_pod_vec<T: Pod, R: Read>(reader: &mut R, count: usize) -> io::Result<Vec<T>> {
    let mut values = vec![T::zeroed(); count];
    reader.read_exact(bytemuck::cast_slice_mut(&mut values))?;
    Ok(values)
}

pub fn write_pod<T: Pod, W: Write>(writer: &mut W, value: &T) -> io::Result<()> {
    writer.write_all(bytemuck::bytes_of(value))
}

pub fn write_pod_slice<T: Pod, W: Write>(writer: &mut W, values: &[T]) -> io::Result<()> {
    writer.write_all(bytemuck::cast_slice(values))
}

#[inline]
pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    read_pod::<u32, R>(reader)
}

#[inline]
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    write_pod(writer, &value)
}

/// Read a `u32` element count followed by that many records.
pub fn read_counted<T: Pod, R: Read>(reader: &mut R) -> io::Result<Vec<T>> {
    let count = read_u32(reader)? as usize;
    read_pod_vec(reader, count)
}

/// Write a `u32` element count followed by the records.
pub fn write_counted<T: Pod, W: Write>(writer: &mut W, values: &[T]) -> io::Result<()> {
    let count = u32::try_from(values.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "more than u32::MAX records"))?;
    write_u32(writer, count)?;
    write_pod_slice(writer, values)
}

