//! Snapped query positions.

use nav_core::{FixedPointCoordinate, NameId, NodeId, TravelMode};

use crate::SegmentRecord;

/// A query coordinate snapped onto a road segment.
///
/// Carries the segment's routing payload with the weights split at the
/// snapped position: `forward_weight` covers the part from the segment
/// source to `location`, `reverse_weight` the rest.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhantomNode {
    pub forward_node_id:      NodeId,
    pub reverse_node_id:      NodeId,
    pub name_id:              NameId,
    pub forward_weight:       i32,
    pub reverse_weight:       i32,
    pub forward_offset:       i32,
    pub reverse_offset:       i32,
    pub packed_geometry_id:   u32,
    pub component_id:         u32,
    pub location:             FixedPointCoordinate,
    pub fwd_segment_position: u16,
    pub forward_travel_mode:  TravelMode,
    pub backward_travel_mode: TravelMode,
}

impl PhantomNode {
    /// Copy `segment`'s payload at `location`, weights still unsplit.
    pub fn from_segment(segment: &SegmentRecord, location: FixedPointCoordinate) -> Self {
        Self {
            forward_node_id:      segment.forward_node_id,
            reverse_node_id:      segment.reverse_node_id,
            name_id:              segment.name_id,
            forward_weight:       segment.forward_weight,
            reverse_weight:       segment.reverse_weight,
            forward_offset:       segment.forward_offset,
            reverse_offset:       segment.reverse_offset,
            packed_geometry_id:   segment.packed_geometry_id,
            component_id:         segment.component_id,
            location,
            fwd_segment_position: segment.fwd_segment_position,
            forward_travel_mode:  segment.forward_travel_mode,
            backward_travel_mode: segment.backward_travel_mode,
        }
    }

    /// At least one direction is routable and the location is real.
    pub fn is_valid(&self) -> bool {
        (self.forward_node_id.is_valid() || self.reverse_node_id.is_valid()) && self.location.is_valid()
    }

    #[inline]
    pub fn is_in_tiny_cc(&self) -> bool {
        self.component_id != 0
    }

    /// Scale the weights by the snapped position, `ratio` being the share of
    /// the segment between its source and `location`.
    pub(crate) fn split_weights(&mut self, ratio: f32) {
        let ratio = ratio.min(1.0);
        if self.forward_node_id.is_valid() {
            self.forward_weight = (self.forward_weight as f32 * ratio) as i32;
        }
        if self.reverse_node_id.is_valid() {
            self.reverse_weight = (self.reverse_weight as f32 * (1.0 - ratio)) as i32;
        }
    }

    /// Pull a location that is off by one fixed-point unit onto the input.
    pub(crate) fn fix_up_rounding(&mut self, input: FixedPointCoordinate) {
        if (input.lon as i64 - self.location.lon as i64).abs() == 1 {
            self.location.lon = input.lon;
        }
        if (input.lat as i64 - self.location.lat as i64).abs() == 1 {
            self.location.lat = input.lat;
        }
    }
}
