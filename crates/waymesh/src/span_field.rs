//! The packed, walkable-only representation of a [`Heightfield`].
//!
//! All pipeline stages after voxelization (erosion, region segmentation,
//! contour tracing, detail sampling) run on this structure-of-arrays form:
//! spans are plain records addressed by a dense index, per-cell ranges map
//! grid coordinates to spans, and parallel vectors carry the mutable
//! per-span attributes (walkable-use flag, region id, boundary distance).

use thiserror::Error;

use crate::{
    config::NavConfig,
    heightfield::Heightfield,
    math::{Aabb3d, dir_offset_x, dir_offset_y},
    region::RegionId,
};

/// Walkability flag of a span. Erosion and padding masking flip spans to
/// [`AreaType::NOT_WALKABLE`]; nothing is ever deallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct AreaType(pub u8);

impl AreaType {
    /// Spans with this area type are not usable for navigation.
    pub const NOT_WALKABLE: Self = Self(0);
    /// Default area type for usable spans.
    pub const WALKABLE: Self = Self(u8::MAX);

    /// Whether the span may be used for navigation.
    #[inline]
    pub fn is_walkable(&self) -> bool {
        self.0 != 0
    }
}

/// A cell of a [`SpanField`]: the contiguous index range of the spans stacked
/// in one grid column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldCell {
    index: u32,
    count: u8,
}

impl FieldCell {
    #[inline]
    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub(crate) fn set_index(&mut self, index: u32) {
        self.index = index;
    }

    #[inline]
    pub(crate) fn count(&self) -> u8 {
        self.count
    }

    #[inline]
    pub(crate) fn inc_count(&mut self) {
        self.count += 1;
    }

    /// The span indices of this cell, bottom to top.
    #[inline]
    pub(crate) fn index_range(&self) -> std::ops::Range<usize> {
        self.index as usize..self.index as usize + self.count as usize
    }
}

/// A span of a [`SpanField`]. Packed for memory efficiency: the lower 24 bits
/// of `data` hold the per-direction neighbor connections (6 bits each), the
/// upper 8 bits the clearance above the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldSpan {
    /// Floor height in voxel units from the bottom of the field AABB.
    pub z: u16,
    data: u32,
}

impl FieldSpan {
    pub(crate) const NOT_CONNECTED: u8 = 0x3f;
    /// Highest span layer index a connection can encode.
    pub(crate) const MAX_LAYERS: u8 = Self::NOT_CONNECTED - 1;

    /// Sets the neighbor connection for the given direction.
    /// `None` if the neighbor is not connected.
    pub fn set_con(&mut self, direction: u8, neighbor: impl Into<Option<u8>>) {
        let shift = (direction as u32) * 6;
        let value =
            neighbor.into().unwrap_or(Self::NOT_CONNECTED) as u32 & Self::NOT_CONNECTED as u32;
        self.data = (self.data & !(0x3f << shift)) | (value << shift);
    }

    /// Returns the neighbor connection for the given direction as the layer
    /// index within the neighboring cell. `None` if not connected.
    pub fn con(&self, direction: u8) -> Option<u8> {
        let shift = (direction as u32) * 6;
        let value = ((self.data >> shift) & Self::NOT_CONNECTED as u32) as u8;
        (value != Self::NOT_CONNECTED).then_some(value)
    }

    /// Returns the clearance above the floor, capped at 255 voxels.
    pub fn clearance(&self) -> u8 {
        (self.data >> 24) as u8
    }

    /// Sets the clearance above the floor.
    pub fn set_clearance(&mut self, clearance: u8) {
        self.data = (self.data & 0x00FF_FFFF) | ((clearance as u32) << 24);
    }
}

/// A packed representation of a [`Heightfield`], with per-direction neighbor
/// connectivity resolved.
#[derive(Debug, Clone)]
pub struct SpanField {
    /// The width of the field along the x-axis in cell units
    pub width: u16,
    /// The height of the field along the y-axis in cell units
    pub height: u16,
    /// The walkable height used during the build of the field
    pub walkable_height: u16,
    /// The walkable climb used during the build of the field
    pub walkable_climb: u16,
    /// The padding ring width used during the build of the field
    pub padding: u16,
    /// The maximum boundary distance of any span within the field
    pub max_distance: u16,
    /// The maximum region id assigned within the field
    pub max_region: RegionId,
    /// The AABB of the field
    pub aabb: Aabb3d,
    /// The size of each cell on the horizontal plane
    pub cell_size: f32,
    /// The size of each cell along the z-axis
    pub cell_height: f32,
    /// The cells in the field [Size: `width * height`]
    pub cells: Vec<FieldCell>,
    /// All walkable spans in the field
    pub spans: Vec<FieldSpan>,
    /// Walkable-use flag per span. [Size: `spans.len()`]
    pub areas: Vec<AreaType>,
    /// Region id per span. [Size: `spans.len()`]
    pub regions: Vec<RegionId>,
    /// Raw boundary distance per span. [Size: `spans.len()`]
    pub dist: Vec<u16>,
}

impl SpanField {
    /// Builds a span field from a probe-populated heightfield, resolving the
    /// best height-compatible neighbor of every span in each of the four
    /// cardinal directions.
    ///
    /// # Errors
    ///
    /// Returns an error if some column stacks more spans than a connection
    /// can address.
    pub fn from_heightfield(
        heightfield: &Heightfield,
        config: &NavConfig,
    ) -> Result<Self, SpanFieldError> {
        let span_count = heightfield.spans.len();
        let mut field = Self {
            width: heightfield.width,
            height: heightfield.height,
            walkable_height: config.walkable_height,
            walkable_climb: config.walkable_climb,
            padding: 0,
            max_distance: 0,
            max_region: RegionId::NONE,
            aabb: heightfield.aabb,
            cell_size: heightfield.cell_size,
            cell_height: heightfield.cell_height,
            cells: vec![
                FieldCell::default();
                heightfield.width as usize * heightfield.height as usize
            ],
            spans: vec![FieldSpan::default(); span_count],
            areas: vec![AreaType::WALKABLE; span_count],
            regions: vec![RegionId::NONE; span_count],
            dist: vec![0; span_count],
        };

        // Fill in cells and spans, bottom to top per column.
        let mut span_index = 0_usize;
        for y in 0..heightfield.height {
            for x in 0..heightfield.width {
                let column_index = heightfield.column_index(x, y);
                let cell = &mut field.cells[column_index];
                cell.set_index(span_index as u32);

                let mut span_key_iter = heightfield.span_key_at(x, y);
                while let Some(span_key) = span_key_iter {
                    let span = heightfield.span(span_key);
                    span_key_iter = span.next();
                    field.spans[span_index].z = span.floor();
                    let clearance =
                        (span.ceiling().saturating_sub(span.floor())).min(u8::MAX as u16) as u8;
                    field.spans[span_index].set_clearance(clearance);
                    span_index += 1;
                    cell.inc_count();
                }
            }
        }

        // Find neighbor connections: per direction, the height-compatible
        // neighbor span with the smallest floor difference.
        let mut max_layer_index = 0_u32;
        for y in 0..field.height {
            for x in 0..field.width {
                let cell = field.cells[field.column_index(x, y)];
                for i in cell.index_range() {
                    let span = field.spans[i];
                    for dir in 0..4_u8 {
                        field.spans[i].set_con(dir, None);
                        let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                        let neighbor_y = y as i32 + dir_offset_y(dir) as i32;
                        if !field.contains(neighbor_x, neighbor_y) {
                            continue;
                        }
                        let neighbor_cell =
                            field.cells[field.column_index(neighbor_x as u16, neighbor_y as u16)];

                        let mut best: Option<(u8, u16)> = None;
                        for k in neighbor_cell.index_range() {
                            let neighbor_span = &field.spans[k];
                            let bot = span.z.max(neighbor_span.z);
                            let top = (span.z as u32 + span.clearance() as u32)
                                .min(neighbor_span.z as u32 + neighbor_span.clearance() as u32);

                            // The gap shared by both spans must fit the agent,
                            // and the step between the floors must be climbable.
                            let is_walkable = top as i32 - bot as i32
                                >= field.walkable_height as i32;
                            let step = (neighbor_span.z as i32 - span.z as i32).unsigned_abs()
                                as u16;
                            if !is_walkable || step > field.walkable_climb {
                                continue;
                            }
                            let layer_index = (k - neighbor_cell.index() as usize) as u32;
                            if layer_index > FieldSpan::MAX_LAYERS as u32 {
                                max_layer_index = max_layer_index.max(layer_index);
                                continue;
                            }
                            if best.is_none_or(|(_, best_step)| step < best_step) {
                                best = Some((layer_index as u8, step));
                            }
                        }
                        if let Some((layer_index, _)) = best {
                            field.spans[i].set_con(dir, Some(layer_index));
                        }
                    }
                }
            }
        }
        if max_layer_index > FieldSpan::MAX_LAYERS as u32 {
            return Err(SpanFieldError::TooManyLayers {
                max_layer_index: FieldSpan::MAX_LAYERS,
                layer_index: max_layer_index,
            });
        }
        Ok(field)
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, y: u16) -> usize {
        x as usize + y as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32
    }

    /// Returns the cell at the given coordinates. Panics if out of bounds.
    #[inline]
    pub fn cell_at(&self, x: u16, y: u16) -> &FieldCell {
        &self.cells[self.column_index(x, y)]
    }

    /// Resolves a connection of the span at `(x, y)` in `dir` into the
    /// neighbor's grid coordinates and span index.
    #[inline]
    pub(crate) fn con_indices(&self, x: i32, y: i32, dir: u8, con: u8) -> (i32, i32, usize) {
        let neighbor_x = x + dir_offset_x(dir) as i32;
        let neighbor_y = y + dir_offset_y(dir) as i32;
        let cell = &self.cells[(neighbor_x + neighbor_y * self.width as i32) as usize];
        (neighbor_x, neighbor_y, cell.index() as usize + con as usize)
    }

    /// World floor height in the cell containing `point`, picking the span
    /// whose floor lies closest to `provisional_z`. `None` for empty cells.
    pub(crate) fn closest_floor(&self, point: glam::Vec2, provisional_z: f32) -> Option<f32> {
        let grid_x = ((point.x - self.aabb.min.x) / self.cell_size).floor() as i32;
        let grid_y = ((point.y - self.aabb.min.y) / self.cell_size).floor() as i32;
        if !self.contains(grid_x, grid_y) {
            return None;
        }
        let cell = self.cell_at(grid_x as u16, grid_y as u16);
        let mut best: Option<f32> = None;
        for i in cell.index_range() {
            let z = self.aabb.min.z + self.spans[i].z as f32 * self.cell_height;
            if best.is_none_or(|b: f32| (z - provisional_z).abs() < (b - provisional_z).abs()) {
                best = Some(z);
            }
        }
        best
    }

    /// Whether the grid coordinate lies in the tile core, outside the padding
    /// ring.
    #[inline]
    pub(crate) fn in_core(&self, x: u16, y: u16) -> bool {
        x >= self.padding
            && y >= self.padding
            && x < self.width - self.padding
            && y < self.height - self.padding
    }
}

/// Errors that can occur when building a [`SpanField`].
#[derive(Debug, Error)]
pub enum SpanFieldError {
    /// A column stacks more spans than a connection can address.
    #[error(
        "column has too many span layers: max layer index is {max_layer_index}, got {layer_index}"
    )]
    TooManyLayers {
        /// The maximum addressable layer index.
        max_layer_index: u8,
        /// The layer index that caused the error.
        layer_index: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn con_round_trips_through_packing() {
        let mut span = FieldSpan::default();
        assert_eq!(span.con(0), None);
        span.set_con(0, 3);
        span.set_con(2, 0);
        span.set_con(3, FieldSpan::MAX_LAYERS);
        assert_eq!(span.con(0), Some(3));
        assert_eq!(span.con(1), None);
        assert_eq!(span.con(2), Some(0));
        assert_eq!(span.con(3), Some(FieldSpan::MAX_LAYERS));
        span.set_con(0, None);
        assert_eq!(span.con(0), None);
    }

    #[test]
    fn clearance_does_not_clobber_connections() {
        let mut span = FieldSpan::default();
        span.set_con(1, 5);
        span.set_clearance(200);
        assert_eq!(span.con(1), Some(5));
        assert_eq!(span.clearance(), 200);
    }
}
