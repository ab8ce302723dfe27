//! Distance-to-boundary erosion of the walkable area.

use tracing::debug;

use crate::span_field::{AreaType, SpanField};

impl SpanField {
    /// Erodes the walkable area away from boundaries by `radius` voxels.
    ///
    /// A span is a boundary when any of its four directions has no
    /// connection (missing neighbor or grid edge) or connects to a
    /// non-walkable span. Distances relax over the 4-neighbor graph in one
    /// forward and one reverse raster pass; spans closer to a boundary than
    /// `radius` are flipped to [`AreaType::NOT_WALKABLE`].
    pub fn erode_walkable_area(&mut self, radius: u16) {
        let mut distance = vec![u16::MAX; self.spans.len()];

        // Mark boundary spans.
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    if !self.areas[i].is_walkable() {
                        distance[i] = 0;
                        continue;
                    }
                    let span = &self.spans[i];
                    let mut neighbor_count = 0;
                    for dir in 0..4 {
                        let Some(con) = span.con(dir) else {
                            break;
                        };
                        let (_, _, neighbor_index) = self.con_indices(x as i32, y as i32, dir, con);
                        if !self.areas[neighbor_index].is_walkable() {
                            break;
                        }
                        neighbor_count += 1;
                    }
                    // At least one missing neighbor, so this is a boundary span.
                    if neighbor_count != 4 {
                        distance[i] = 0;
                    }
                }
            }
        }

        self.relax_distances(&mut distance);

        let mut eroded = 0_usize;
        for (i, dist) in distance.iter().enumerate() {
            if *dist < radius && self.areas[i].is_walkable() {
                self.areas[i] = AreaType::NOT_WALKABLE;
                eroded += 1;
            }
        }
        debug!(radius, eroded, "eroded walkable area");
    }

    /// Relaxes `distance[s] = min(distance[s], distance[neighbor] + 1)` over
    /// the 4-neighbor graph, in forward then reverse raster order. Two passes
    /// settle the transform exactly for this metric.
    pub(crate) fn relax_distances(&self, distance: &mut [u16]) {
        // Forward pass: pull from (-x) and (-y).
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    let span = &self.spans[i];
                    for dir in [0_u8, 3] {
                        let Some(con) = span.con(dir) else {
                            continue;
                        };
                        let (_, _, neighbor_index) = self.con_indices(x as i32, y as i32, dir, con);
                        distance[i] =
                            distance[i].min(distance[neighbor_index].saturating_add(1));
                    }
                }
            }
        }
        // Reverse pass: pull from (+x) and (+y).
        for y in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    let span = &self.spans[i];
                    for dir in [2_u8, 1] {
                        let Some(con) = span.con(dir) else {
                            continue;
                        };
                        let (_, _, neighbor_index) = self.con_indices(x as i32, y as i32, dir, con);
                        distance[i] =
                            distance[i].min(distance[neighbor_index].saturating_add(1));
                    }
                }
            }
        }
    }

    /// Flips every span outside the tile's core rectangle to
    /// [`AreaType::NOT_WALKABLE`], regardless of its boundary distance.
    ///
    /// Padding exists only to give erosion and neighbor computation context
    /// at tile edges; it must never contribute regions or contours.
    pub fn mask_padding(&mut self, padding: u16) {
        self.padding = padding;
        if padding == 0 {
            return;
        }
        for y in 0..self.height {
            for x in 0..self.width {
                if self.in_core(x, y) {
                    continue;
                }
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    self.areas[i] = AreaType::NOT_WALKABLE;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::{
        config::{NavConfig, NavConfigBuilder},
        heightfield::{Heightfield, HeightfieldBuilder},
        math::Aabb3d,
        span_field::SpanField,
    };

    pub(crate) fn flat_field(width: f32) -> (Heightfield, NavConfig) {
        let aabb = Aabb3d::new(Vec3::ZERO, Vec3::new(width, width, 51.2));
        let config = NavConfigBuilder {
            cell_size: 1.0,
            cell_height: 0.2,
            aabb,
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut heightfield = HeightfieldBuilder {
            aabb,
            cell_size: config.cell_size,
            cell_height: config.cell_height,
        }
        .build()
        .unwrap();
        for y in 0..heightfield.height {
            for x in 0..heightfield.width {
                heightfield
                    .add_span(crate::heightfield::SpanInsertion {
                        x,
                        y,
                        span: crate::span::SpanBuilder {
                            floor: 5,
                            ceiling: 250,
                            next: None,
                        }
                        .build(),
                    })
                    .unwrap();
            }
        }
        (heightfield, config)
    }

    #[test]
    fn erosion_peels_the_rim() {
        let (heightfield, config) = flat_field(10.0);
        let mut field = SpanField::from_heightfield(&heightfield, &config).unwrap();
        field.erode_walkable_area(2);

        for y in 0..field.height {
            for x in 0..field.width {
                let cell = *field.cell_at(x, y);
                let rim_distance = (x.min(field.width - 1 - x)).min(y.min(field.height - 1 - y));
                for i in cell.index_range() {
                    assert_eq!(
                        field.areas[i].is_walkable(),
                        rim_distance >= 2,
                        "unexpected walkability at ({x}, {y})"
                    );
                }
            }
        }
    }

    #[test]
    fn padding_mask_keeps_only_the_core() {
        let (heightfield, config) = flat_field(10.0);
        let mut field = SpanField::from_heightfield(&heightfield, &config).unwrap();
        field.mask_padding(3);

        let walkable = (0..field.spans.len())
            .filter(|i| field.areas[*i].is_walkable())
            .count();
        // 10x10 grid with a 3-cell ring removed leaves a 4x4 core.
        assert_eq!(walkable, 16);
    }
}
