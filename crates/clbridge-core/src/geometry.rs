//! Byte length of a mapped image region.
//!
//! A mapping call returns a bare pointer. To hand it back as a bounded view
//! the bridge needs the furthest linear offset reachable inside the mapped
//! sub-region, derived from the pitches the driver reported.

use crate::error::BridgeError;

/// Derived geometry of one mapping; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRegionDescriptor {
    pub element_size: usize,
    /// Image depth; zero for 2D images.
    pub depth: usize,
    pub row_pitch: usize,
    pub slice_pitch: usize,
    pub origin: [usize; 3],
    pub range: [usize; 3],
}

impl MappedRegionDescriptor {
    pub fn is_3d(&self) -> bool {
        self.depth != 0
    }

    /// Byte count of the view returned for this region.
    ///
    /// 2D: `row_pitch * range[1] + range[0]`, 3D additionally adds
    /// `slice_pitch * range[2]`; the sum is scaled by the element size.
    /// `origin` does not enter the computation, the mapped pointer already
    /// points at it.
    pub fn byte_size(&self) -> Result<usize, BridgeError> {
        let rows = self
            .row_pitch
            .checked_mul(self.range[1])
            .and_then(|v| v.checked_add(self.range[0]));
        let size = if self.is_3d() {
            rows.and_then(|v| {
                self.slice_pitch
                    .checked_mul(self.range[2])
                    .and_then(|s| s.checked_add(v))
            })
        } else {
            rows
        };
        size.and_then(|v| v.checked_mul(self.element_size))
            .ok_or(BridgeError::GeometryOverflow)
    }
}

/// Convenience form of [`MappedRegionDescriptor::byte_size`].
pub fn map_byte_size(
    element_size: usize,
    depth: usize,
    origin: [usize; 3],
    range: [usize; 3],
    row_pitch: usize,
    slice_pitch: usize,
) -> Result<usize, BridgeError> {
    MappedRegionDescriptor {
        element_size,
        depth,
        row_pitch,
        slice_pitch,
        origin,
        range,
    }
    .byte_size()
}
