//! Uniform spatial grid over polygon bounding boxes.
//!
//! Maps world points to polygons for path queries and seed snapping without
//! scanning the whole mesh. Rebuilt whenever a mesh is published.

use std::collections::HashMap;

use glam::{Vec2, Vec3, Vec3Swizzles as _};

use crate::{link::closest_point_on_polygon, poly_mesh::NavMesh};

/// Spatial index of a [`NavMesh`]: polygon ids bucketed by the grid cells
/// their AABBs overlap.
#[derive(Debug, Clone)]
pub struct PolyLookup {
    cell_size: f32,
    buckets: HashMap<(i32, i32), Vec<u32>>,
}

impl Default for PolyLookup {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            buckets: HashMap::new(),
        }
    }
}

impl PolyLookup {
    /// How many bucket rings [`PolyLookup::nearest_polygon`] searches before
    /// declaring a point unmappable.
    const MAX_RINGS: i32 = 4;

    /// Builds the index with the given bucket size.
    pub fn build(mesh: &NavMesh, cell_size: f32) -> Self {
        let cell_size = cell_size.max(f32::EPSILON);
        let mut buckets: HashMap<(i32, i32), Vec<u32>> = HashMap::new();
        for polygon in 0..mesh.polygon_count() {
            let aabb = mesh.polygon_aabb(polygon);
            let min_x = (aabb.min.x / cell_size).floor() as i32;
            let max_x = (aabb.max.x / cell_size).floor() as i32;
            let min_y = (aabb.min.y / cell_size).floor() as i32;
            let max_y = (aabb.max.y / cell_size).floor() as i32;
            for cell_y in min_y..=max_y {
                for cell_x in min_x..=max_x {
                    buckets
                        .entry((cell_x, cell_y))
                        .or_default()
                        .push(polygon as u32);
                }
            }
        }
        Self { cell_size, buckets }
    }

    /// Polygon ids whose AABBs overlap the bucket ring at distance `ring`
    /// around the bucket containing `point`.
    fn ring_candidates(&self, point: Vec2, ring: i32, out: &mut Vec<u32>) {
        let center_x = (point.x / self.cell_size).floor() as i32;
        let center_y = (point.y / self.cell_size).floor() as i32;
        for cell_y in center_y - ring..=center_y + ring {
            for cell_x in center_x - ring..=center_x + ring {
                let on_ring = (cell_x - center_x).abs() == ring || (cell_y - center_y).abs() == ring;
                if !on_ring {
                    continue;
                }
                if let Some(bucket) = self.buckets.get(&(cell_x, cell_y)) {
                    for &polygon in bucket {
                        if !out.contains(&polygon) {
                            out.push(polygon);
                        }
                    }
                }
            }
        }
    }

    /// Maps a world point to the nearest polygon and the closest position on
    /// it. `None` when no polygon lies within the search radius.
    pub fn nearest_polygon(&self, mesh: &NavMesh, point: Vec3) -> Option<(u32, Vec3)> {
        let mut best: Option<(u32, Vec3, f32)> = None;
        let mut candidates = Vec::new();
        for ring in 0..=Self::MAX_RINGS {
            candidates.clear();
            self.ring_candidates(point.xy(), ring, &mut candidates);
            for &polygon in &candidates {
                let closest = closest_point_on_polygon(mesh, polygon as usize, point);
                let distance = closest.distance_squared(point);
                if best.is_none_or(|(_, _, d)| distance < d) {
                    best = Some((polygon, closest, distance));
                }
            }
            // A hit this ring cannot be beaten by a farther ring once the
            // ring's inner boundary exceeds the best distance.
            if let Some((_, _, d)) = best {
                let ring_reach = ring as f32 * self.cell_size;
                if d.sqrt() <= ring_reach {
                    break;
                }
            }
        }
        best.map(|(polygon, closest, _)| (polygon, closest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly_mesh::tests::plate_mesh;

    #[test]
    fn maps_points_onto_the_plate() {
        let mesh = plate_mesh(10, 6, None);
        let lookup = PolyLookup::build(&mesh, 4.0);

        let (polygon, closest) = lookup
            .nearest_polygon(&mesh, Vec3::new(4.0, 3.0, 1.0))
            .unwrap();
        assert_eq!(polygon, 0);
        assert_eq!(closest.xy(), Vec2::new(4.0, 3.0));

        // A point past the rim snaps back onto the boundary.
        let (_, clamped) = lookup
            .nearest_polygon(&mesh, Vec3::new(-2.0, 3.0, 1.0))
            .unwrap();
        assert_eq!(clamped.xy(), Vec2::new(0.0, 3.0));
    }

    #[test]
    fn far_away_points_are_unmappable() {
        let mesh = plate_mesh(10, 6, None);
        let lookup = PolyLookup::build(&mesh, 2.0);
        assert!(
            lookup
                .nearest_polygon(&mesh, Vec3::new(500.0, 500.0, 0.0))
                .is_none()
        );
    }
}
