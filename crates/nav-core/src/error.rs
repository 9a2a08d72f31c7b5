//! Error type for the storage primitives.
//!
//! Higher crates wrap `CoreError` with `#[from]` in their own enums; the
//! variants here are the ones that can arise below the graph and index
//! layers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A required artifact is absent or has zero length.
    #[error("missing or empty file: {}", path.display())]
    MissingOrEmptyFile { path: PathBuf },

    /// A range-table input length does not fit in one byte.
    #[error("range length {length} at index {index} exceeds 255")]
    MalformedRangeInput { index: usize, length: u32 },

    #[error("index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    /// A file or region ended before a declared record count was satisfied.
    #[error("truncated {what}: expected {expected} bytes, found {found}")]
    Truncated { what: &'static str, expected: u64, found: u64 },

    /// A typed view could not be placed over a byte region.
    #[error("invalid view: {0}")]
    InvalidView(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for `nav-core`.
pub type CoreResult<T> = Result<T, CoreError>;
