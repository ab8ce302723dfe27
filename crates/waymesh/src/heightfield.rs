//! The heightfield module contains the types and functions for working with
//! [`Heightfield`]s.
//!
//! A heightfield is a 2D grid of columns, where each column contains 0, 1, or
//! more walkable [`Span`]s discovered through vertical probes.

use thiserror::Error;
use tracing::debug;

use crate::{
    config::NavConfig,
    math::Aabb3d,
    probe::SolidProbe,
    span::{Span, SpanBuilder, SpanKey, Spans},
};

/// A grid of per-column walkable span lists. Build with [`HeightfieldBuilder`],
/// populate with [`Heightfield::populate_from_probe`].
#[derive(Debug, Clone)]
pub struct Heightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the y-axis in cell units
    pub height: u16,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the horizontal plane
    pub cell_size: f32,
    /// The size of each cell along the z-axis
    pub cell_height: f32,
    /// The indices to the spans in the heightfield in width*height order.
    /// Each entry points to the lowest span of its column.
    pub columns: Vec<Option<SpanKey>>,
    /// All spans in the heightfield
    pub spans: Spans,
}

impl Heightfield {
    /// Scans every column of the grid through the probe and fills in the
    /// walkable spans.
    ///
    /// Per column, a downward probe from the current scan top finds a floor
    /// candidate; an upward probe from just above that floor finds the
    /// ceiling. A span is emitted only if the clearance between them is at
    /// least the agent height and the floor's contact normal passes the
    /// maximum-slope test. Scanning then continues below the found floor. A
    /// failed downward probe ends the column: absence of ground is normal,
    /// not an error.
    pub fn populate_from_probe(
        &mut self,
        probe: &dyn SolidProbe,
        config: &NavConfig,
    ) -> Result<(), SpanInsertionError> {
        let min_normal_z = config.max_slope.cos();
        let min_clearance = config.walkable_height as f32 * self.cell_height;

        for grid_y in 0..self.height {
            for grid_x in 0..self.width {
                let x = self.aabb.min.x + (grid_x as f32 + 0.5) * self.cell_size;
                let y = self.aabb.min.y + (grid_y as f32 + 0.5) * self.cell_size;

                let mut scan_top = self.aabb.max.z;
                while scan_top > self.aabb.min.z {
                    let Some(hit) = probe.probe_down(x, y, scan_top, self.aabb.min.z) else {
                        break;
                    };
                    // Continue the next iteration below this floor no matter
                    // whether it turns out walkable.
                    scan_top = hit.z - self.cell_height;

                    if hit.normal.z < min_normal_z {
                        continue;
                    }
                    let ceiling = probe
                        .probe_up(x, y, hit.z + self.cell_height, self.aabb.max.z)
                        .unwrap_or(self.aabb.max.z);
                    if ceiling - hit.z < min_clearance {
                        continue;
                    }

                    let floor_vx = self.quantize(hit.z);
                    let ceiling_vx = self.quantize(ceiling).max(floor_vx);
                    self.add_span(SpanInsertion {
                        x: grid_x,
                        y: grid_y,
                        span: SpanBuilder {
                            floor: floor_vx,
                            ceiling: ceiling_vx,
                            next: None,
                        }
                        .build(),
                    })?;
                }
            }
        }
        debug!(
            spans = self.spans.len(),
            width = self.width,
            height = self.height,
            "rasterized heightfield from probe"
        );
        Ok(())
    }

    /// Converts a world height into voxel units from the bottom of the AABB.
    #[inline]
    fn quantize(&self, z: f32) -> u16 {
        let vx = (z - self.aabb.min.z) / self.cell_height;
        vx.clamp(0.0, u16::MAX as f32) as u16
    }

    /// Inserts a span into its column, keeping the list sorted ascending by
    /// floor height and merging overlapping intervals.
    #[inline]
    pub(crate) fn add_span(&mut self, insertion: SpanInsertion) -> Result<(), SpanInsertionError> {
        let column_index = self.column_index(insertion.x, insertion.y);
        if column_index >= self.columns.len() {
            return Err(SpanInsertionError::ColumnIndexOutOfBounds {
                x: insertion.x,
                y: insertion.y,
            });
        }

        let mut new_span = insertion.span;
        let mut previous_span_key = None;
        let mut current_span_key_iter = self.columns[column_index];
        // Insert the new span, possibly merging it with existing spans.
        while let Some(current_span_key) = current_span_key_iter {
            let current_span = self.span(current_span_key);
            current_span_key_iter = current_span.next();
            if current_span.floor() > new_span.ceiling() {
                // Current span is completely above the new span, break.
                break;
            }
            if current_span.ceiling() < new_span.floor() {
                // Current span is completely below the new span. Keep going.
                previous_span_key.replace(current_span_key);
                continue;
            }
            // The new span overlaps with an existing span. Merge them.
            if current_span.floor() < new_span.floor() {
                new_span.set_floor(current_span.floor());
            }
            if current_span.ceiling() > new_span.ceiling() {
                new_span.set_ceiling(current_span.ceiling());
            }

            // Remove the current span since it's now merged into the new one.
            // Keep going because there might be more overlapping spans.
            let next_key = current_span.next();
            self.spans.remove(current_span_key);
            if let Some(previous_span_key) = previous_span_key {
                self.span_mut(previous_span_key).set_next(next_key);
            } else {
                self.columns[column_index] = next_key;
            }
        }

        if let Some(previous_span_key) = previous_span_key {
            // Insert the new span after prev.
            new_span.set_next(self.span(previous_span_key).next());
            let new_span_key = self.spans.insert(new_span);
            self.span_mut(previous_span_key).set_next(new_span_key);
        } else {
            // This span goes before the others in the list.
            let lowest_span_key = self.columns[column_index];
            new_span.set_next(lowest_span_key);
            let new_span_key = self.spans.insert(new_span);
            self.columns[column_index] = Some(new_span_key);
        }

        Ok(())
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, y: u16) -> usize {
        x as usize + y as usize * self.width as usize
    }

    /// Returns the key of the lowest span in the column at the given
    /// coordinates. `None` if the index is out of bounds or the column is
    /// empty.
    #[inline]
    pub fn span_key_at(&self, x: u16, y: u16) -> Option<SpanKey> {
        let column_index = self.column_index(x, y);
        let Some(span_key) = self.columns.get(column_index) else {
            // Invalid coordinates
            return None;
        };
        *span_key
    }

    /// Returns the lowest span in the column at the given coordinates.
    #[inline]
    pub fn span_at(&self, x: u16, y: u16) -> Option<&Span> {
        let span_key = self.span_key_at(x, y)?;
        Some(self.span(span_key))
    }

    /// Returns a reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span(&self, key: SpanKey) -> &Span {
        &self.spans[key]
    }

    /// Returns a mutable reference to the span with the given key.
    /// # Panics
    /// Panics if the key is not found.
    #[inline]
    pub fn span_mut(&mut self, key: SpanKey) -> &mut Span {
        &mut self.spans[key]
    }
}

/// A builder for [`Heightfield`]s.
pub struct HeightfieldBuilder {
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the horizontal plane
    pub cell_size: f32,
    /// The size of each cell along the z-axis
    pub cell_height: f32,
}

impl HeightfieldBuilder {
    /// Builds an empty heightfield covering the AABB.
    pub fn build(self) -> Result<Heightfield, HeightfieldBuilderError> {
        let width = (self.aabb.max.x - self.aabb.min.x) / self.cell_size + 0.5;
        let height = (self.aabb.max.y - self.aabb.min.y) / self.cell_size + 0.5;
        let column_count = width as u128 * height as u128;
        if column_count > usize::MAX as u128 {
            return Err(HeightfieldBuilderError::ColumnCountTooLarge { width, height });
        }
        let column_count = column_count as usize;
        Ok(Heightfield {
            width: width as u16,
            height: height as u16,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            columns: vec![None; column_count],
            spans: Spans::with_min_capacity(column_count),
        })
    }
}

/// Errors that can occur when building a [`Heightfield`] with
/// [`HeightfieldBuilder::build`].
#[derive(Error, Debug)]
pub enum HeightfieldBuilderError {
    /// Happens when the column count is too large.
    #[error("Column count (width*height) is too large, got {width}*{height}={column_count} but max is {max}", column_count = width * height, max = usize::MAX)]
    ColumnCountTooLarge {
        /// The width of the heightfield along the x-axis in cell units
        width: f32,
        /// The height of the heightfield along the y-axis in cell units
        height: f32,
    },
}

/// Errors that can occur when inserting a span into a [`Heightfield`]
#[derive(Error, Debug)]
pub enum SpanInsertionError {
    /// Happens when the column index is out of bounds.
    #[error("column index out of bounds: x={x}, y={y}")]
    ColumnIndexOutOfBounds {
        /// The x-coordinate of the span
        x: u16,
        /// The y-coordinate of the span
        y: u16,
    },
}

pub(crate) struct SpanInsertion {
    /// The x-coordinate of the span
    pub(crate) x: u16,
    /// The y-coordinate of the span
    pub(crate) y: u16,
    /// The span to insert
    pub(crate) span: Span,
}
