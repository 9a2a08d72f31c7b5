//! Fixed-point geographic coordinates and the distance metrics used for
//! spatial snapping.
//!
//! Coordinates are stored as `i32` degrees scaled by [`COORDINATE_PRECISION`]
//! (1e6, ~11 cm at the equator).  All distances are **equirectangular**
//! approximations in metres: cheap, monotone enough for nearest-neighbour
//! ranking, and consistent between the R-tree bounds and the leaf metrics.
//!
//! Perpendicular (segment) distance is computed in a projected frame where
//! latitude is passed through the spherical Mercator transform, so the foot
//! of the perpendicular matches what a map renderer would draw.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt;

/// Fixed-point scale factor: one degree is `1_000_000` units.
pub const COORDINATE_PRECISION: f64 = 1_000_000.0;

/// Earth radius used by the equirectangular metric, in metres.
pub const EARTH_RADIUS_M: f64 = 6_372_797.560_856;

/// Mercator is undefined at the poles; latitudes are clamped here first.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

const EPSILON: f64 = 1e-9;

// ── FixedPointCoordinate ──────────────────────────────────────────────────────

/// A WGS-84 coordinate in fixed-point degrees.
///
/// `#[repr(C)]` and `Pod` so coordinate tables can be written to disk and
/// viewed in place from a mapped region.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct FixedPointCoordinate {
    pub lat: i32,
    pub lon: i32,
}

impl FixedPointCoordinate {
    /// Sentinel for "no location"; fails [`is_valid`](Self::is_valid).
    pub const INVALID: FixedPointCoordinate = FixedPointCoordinate {
        lat: i32::MIN,
        lon: i32::MIN,
    };

    #[inline]
    pub const fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Round floating-point degrees to the nearest fixed-point unit.
    #[inline]
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat: (lat * COORDINATE_PRECISION).round() as i32,
            lon: (lon * COORDINATE_PRECISION).round() as i32,
        }
    }

    #[inline]
    pub fn lat_deg(self) -> f64 {
        self.lat as f64 / COORDINATE_PRECISION
    }

    #[inline]
    pub fn lon_deg(self) -> f64 {
        self.lon as f64 / COORDINATE_PRECISION
    }

    /// `|lat| <= 90°` and `|lon| <= 180°`.
    pub fn is_valid(self) -> bool {
        let max_lat = (90.0 * COORDINATE_PRECISION) as i64;
        let max_lon = (180.0 * COORDINATE_PRECISION) as i64;
        (self.lat as i64).abs() <= max_lat && (self.lon as i64).abs() <= max_lon
    }

    /// Midpoint of two coordinates in fixed-point space (integer halving).
    #[inline]
    pub fn centroid(a: Self, b: Self) -> Self {
        Self {
            lat: ((a.lat as i64 + b.lat as i64) / 2) as i32,
            lon: ((a.lon as i64 + b.lon as i64) / 2) as i32,
        }
    }

    /// `(mercator_y, lon)` in degrees; the frame used for perpendicular
    /// distances.
    #[inline]
    pub fn project(self) -> ProjectedPoint {
        ProjectedPoint {
            y: lat_to_mercator_y(self.lat_deg()),
            x: self.lon_deg(),
        }
    }
}

impl Default for FixedPointCoordinate {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for FixedPointCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat_deg(), self.lon_deg())
    }
}

// ── Mercator ──────────────────────────────────────────────────────────────────

/// Spherical Mercator `y` for a latitude, both expressed in degrees.
#[inline]
pub fn lat_to_mercator_y(lat_deg: f64) -> f64 {
    let lat = lat_deg.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    180.0 / PI * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln()
}

/// Inverse of [`lat_to_mercator_y`].
#[inline]
pub fn mercator_y_to_lat(y_deg: f64) -> f64 {
    180.0 / PI * (2.0 * (y_deg.to_radians()).exp().atan() - FRAC_PI_2)
}

/// A query point already projected with [`FixedPointCoordinate::project`].
///
/// Searches project the query once and reuse it for every candidate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProjectedPoint {
    pub y: f64,
    pub x: f64,
}

// ── Distances ─────────────────────────────────────────────────────────────────

/// Equirectangular distance in metres from angular deltas (radians) and the
/// cosine of the latitude the longitude delta is scaled by.
#[inline]
pub fn equirectangular_m(dlat_rad: f64, dlon_rad: f64, cos_lat: f64) -> f64 {
    let x = dlon_rad * cos_lat;
    (x * x + dlat_rad * dlat_rad).sqrt() * EARTH_RADIUS_M
}

/// Approximate distance in metres between two coordinates.
pub fn euclidean_distance(a: FixedPointCoordinate, b: FixedPointCoordinate) -> f32 {
    let lat1 = a.lat_deg().to_radians();
    let lat2 = b.lat_deg().to_radians();
    let dlon = (b.lon_deg() - a.lon_deg()).to_radians();
    equirectangular_m(lat2 - lat1, dlon, ((lat1 + lat2) / 2.0).cos()) as f32
}

/// Result of projecting a query point onto a segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PerpendicularFoot {
    /// Metres from the query point to `foot`.
    pub distance: f32,
    /// Closest point of the segment to the query.
    pub foot: FixedPointCoordinate,
    /// Position of `foot` along the segment, `0.0` at the source and `1.0`
    /// at the target.
    pub ratio: f32,
}

/// Distance from `query` to the segment `source → target`.
pub fn perpendicular_distance(
    source: FixedPointCoordinate,
    target: FixedPointCoordinate,
    query: FixedPointCoordinate,
) -> PerpendicularFoot {
    perpendicular_distance_from_projected(source, target, query, query.project())
}

/// Like [`perpendicular_distance`] with the query already projected.
pub fn perpendicular_distance_from_projected(
    source: FixedPointCoordinate,
    target: FixedPointCoordinate,
    query: FixedPointCoordinate,
    projected: ProjectedPoint,
) -> PerpendicularFoot {
    let a = source.project();
    let b = target.project();
    let dy = b.y - a.y;
    let dx = b.x - a.x;
    let len2 = dx * dx + dy * dy;

    let mut ratio = if len2 <= EPSILON * EPSILON {
        0.0
    } else {
        ((projected.y - a.y) * dy + (projected.x - a.x) * dx) / len2
    };
    if ratio <= EPSILON {
        ratio = 0.0;
    } else if ratio >= 1.0 - EPSILON {
        ratio = 1.0;
    }

    let foot = if ratio == 0.0 {
        source
    } else if ratio == 1.0 {
        target
    } else {
        FixedPointCoordinate::from_degrees(mercator_y_to_lat(a.y + ratio * dy), a.x + ratio * dx)
    };

    PerpendicularFoot {
        distance: euclidean_distance(query, foot),
        foot,
        ratio: ratio as f32,
    }
}
