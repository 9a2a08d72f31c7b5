//! Travel mode tag carried by segments and edges.
//!
//! Stored as a single byte inside on-disk records, so it is a transparent
//! newtype rather than an enum: every bit pattern read back from a file is a
//! valid value.  Profiles assign meaning to values above [`TravelMode::DEFAULT`].

use std::fmt;

/// The means of travel a segment direction is open to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct TravelMode(pub u8);

impl TravelMode {
    /// Direction is closed.
    pub const INACCESSIBLE: TravelMode = TravelMode(0);
    /// The profile's primary mode.
    pub const DEFAULT: TravelMode = TravelMode(1);

    #[inline]
    pub fn is_accessible(self) -> bool {
        self != Self::INACCESSIBLE
    }

    pub fn as_str(self) -> &'static str {
        match self.0 {
            0 => "inaccessible",
            1 => "default",
            _ => "profile",
        }
    }
}

impl Default for TravelMode {
    fn default() -> Self {
        Self::INACCESSIBLE
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 | 1 => f.write_str(self.as_str()),
            n     => write!(f, "{}({n})", self.as_str()),
        }
    }
}
