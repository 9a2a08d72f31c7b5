//! Two-dimensional Hilbert curve keys for fixed-point coordinates.
//!
//! The key orders coordinates along a space-filling curve: points with close
//! keys are spatially close (the converse does not hold).  The R-tree bulk
//! loader sorts segments by the key of their projected centroid so each
//! packed leaf covers a compact area.

use crate::coordinate::{COORDINATE_PRECISION, FixedPointCoordinate};

/// Latitudes are biased by 180° rather than 90°: the bulk loader feeds
/// Mercator-projected latitudes, which span ±180°.
const LAT_BIAS: i64 = (180.0 * COORDINATE_PRECISION) as i64;
const LON_BIAS: i64 = (180.0 * COORDINATE_PRECISION) as i64;

/// Hilbert key of a coordinate.  Pure and deterministic.
pub fn hilbert_key(coordinate: FixedPointCoordinate) -> u64 {
    let mut axes = [
        (coordinate.lat as i64 + LAT_BIAS) as u32,
        (coordinate.lon as i64 + LON_BIAS) as u32,
    ];
    transpose(&mut axes);
    interleave(axes[0], axes[1])
}

/// Skilling's axes-to-transpose step for two dimensions: undo the excess
/// work of the inverse, then Gray-encode.
fn transpose(x: &mut [u32; 2]) {
    const M: u32 = 1 << 31;

    let mut q = M;
    while q > 1 {
        let p = q - 1;
        for i in 0..2 {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    x[1] ^= x[0];

    let mut t = 0;
    let mut q = M;
    while q > 1 {
        if x[1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    x[0] ^= t;
    x[1] ^= t;
}

/// Interleave two 32-bit words, most significant bit first, `a` leading.
fn interleave(a: u32, b: u32) -> u64 {
    let mut result = 0u64;
    for bit in (0..32).rev() {
        result = (result << 1) | ((a >> bit) & 1) as u64;
        result = (result << 1) | ((b >> bit) & 1) as u64;
    }
    result
}
