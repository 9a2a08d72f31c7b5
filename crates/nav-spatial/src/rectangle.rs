//! Axis-aligned bounding rectangles in fixed-point degrees, with the two
//! distance bounds that drive branch-and-bound search.
//!
//! Both bounds are phrased in the same equirectangular metric as
//! [`euclidean_distance`](nav_core::coordinate::euclidean_distance), term
//! for term, so that floating-point rounding cannot break their ordering
//! against true distances:
//!
//! - [`min_dist`](Rectangle::min_dist) never exceeds the distance from the
//!   query to any point inside the rectangle;
//! - [`min_max_dist`](Rectangle::min_max_dist) is at least the distance to
//!   some point on every face, and every face of a minimum bounding
//!   rectangle touches a segment endpoint.

use nav_core::coordinate::{COORDINATE_PRECISION, equirectangular_m};
use nav_core::FixedPointCoordinate;

/// Bounding rectangle; `min > max` on an axis means empty.
#[derive(Copy, Clone, PartialEq, Eq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Rectangle {
    pub min_lon: i32,
    pub max_lon: i32,
    pub min_lat: i32,
    pub max_lat: i32,
}

#[inline]
fn to_rad(fixed: i32) -> f64 {
    (fixed as f64 / COORDINATE_PRECISION).to_radians()
}

/// Longitude difference in radians, taken in degrees first.
#[inline]
fn lon_delta(a: i32, b: i32) -> f64 {
    (a as f64 / COORDINATE_PRECISION - b as f64 / COORDINATE_PRECISION).to_radians()
}

impl Rectangle {
    /// The identity of [`merge`](Self::merge).
    pub const EMPTY: Rectangle = Rectangle {
        min_lon: i32::MAX,
        max_lon: i32::MIN,
        min_lat: i32::MAX,
        max_lat: i32::MIN,
    };

    pub fn from_point(c: FixedPointCoordinate) -> Self {
        Self { min_lon: c.lon, max_lon: c.lon, min_lat: c.lat, max_lat: c.lat }
    }

    pub fn is_empty(&self) -> bool {
        self.min_lon > self.max_lon || self.min_lat > self.max_lat
    }

    pub fn extend(&mut self, c: FixedPointCoordinate) {
        self.min_lon = self.min_lon.min(c.lon);
        self.max_lon = self.max_lon.max(c.lon);
        self.min_lat = self.min_lat.min(c.lat);
        self.max_lat = self.max_lat.max(c.lat);
    }

    /// Grow to cover `other`; never shrinks.
    pub fn merge(&mut self, other: &Rectangle) {
        self.min_lon = self.min_lon.min(other.min_lon);
        self.max_lon = self.max_lon.max(other.max_lon);
        self.min_lat = self.min_lat.min(other.min_lat);
        self.max_lat = self.max_lat.max(other.max_lat);
    }

    pub fn contains(&self, c: FixedPointCoordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&c.lat) && (self.min_lon..=self.max_lon).contains(&c.lon)
    }

    /// `other` lies entirely within `self`.  Empty rectangles are contained
    /// everywhere.
    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.is_empty()
            || (self.min_lon <= other.min_lon
                && self.max_lon >= other.max_lon
                && self.min_lat <= other.min_lat
                && self.max_lat >= other.max_lat)
    }

    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    pub fn centroid(&self) -> FixedPointCoordinate {
        FixedPointCoordinate::centroid(
            FixedPointCoordinate::new(self.min_lat, self.min_lon),
            FixedPointCoordinate::new(self.max_lat, self.max_lon),
        )
    }

    /// Lower bound on the distance in metres from `c` to anything inside.
    /// Zero when `c` is inside.
    pub fn min_dist(&self, c: FixedPointCoordinate) -> f32 {
        let q_lat = to_rad(c.lat);

        let dlat = if c.lat > self.max_lat {
            to_rad(self.max_lat) - q_lat
        } else if c.lat < self.min_lat {
            to_rad(self.min_lat) - q_lat
        } else {
            0.0
        };
        let dlon = if c.lon > self.max_lon {
            lon_delta(self.max_lon, c.lon)
        } else if c.lon < self.min_lon {
            lon_delta(self.min_lon, c.lon)
        } else {
            0.0
        };

        let (min_cos, _) = self.cos_range(q_lat);
        equirectangular_m(dlat.abs(), dlon.abs(), min_cos) as f32
    }

    /// Tightest face bound: over the four faces, the least of each face's
    /// farthest-possible distance.
    pub fn min_max_dist(&self, c: FixedPointCoordinate) -> f32 {
        let q_lat = to_rad(c.lat);
        let d_min_lat = (to_rad(self.min_lat) - q_lat).abs();
        let d_max_lat = (to_rad(self.max_lat) - q_lat).abs();
        let d_min_lon = lon_delta(self.min_lon, c.lon).abs();
        let d_max_lon = lon_delta(self.max_lon, c.lon).abs();
        let far_lat = d_min_lat.max(d_max_lat);
        let far_lon = d_min_lon.max(d_max_lon);

        let cos_at = |lat: i32| ((q_lat + to_rad(lat)) / 2.0).cos();
        let (_, max_cos) = self.cos_range(q_lat);

        let south = equirectangular_m(d_min_lat, far_lon, cos_at(self.min_lat));
        let north = equirectangular_m(d_max_lat, far_lon, cos_at(self.max_lat));
        let west = equirectangular_m(far_lat, d_min_lon, max_cos);
        let east = equirectangular_m(far_lat, d_max_lon, max_cos);

        south.min(north).min(west).min(east) as f32
    }

    /// Range of `cos(mean(query_lat, lat))` over the rectangle's latitudes.
    fn cos_range(&self, q_lat: f64) -> (f64, f64) {
        let lo = (q_lat + to_rad(self.min_lat)) / 2.0;
        let hi = (q_lat + to_rad(self.max_lat)) / 2.0;
        let (a, b) = (lo.cos(), hi.cos());
        let max = if lo <= 0.0 && hi >= 0.0 { 1.0 } else { a.max(b) };
        (a.min(b), max)
    }

    /// The four bounds as raw words, in storage order.
    pub fn to_words(self) -> [u32; 4] {
        bytemuck::cast(self)
    }

    pub fn from_words(words: [u32; 4]) -> Self {
        bytemuck::cast(words)
    }
}

impl Default for Rectangle {
    fn default() -> Self {
        Self::EMPTY
    }
}
