//! Height fixing of a straightened path against the detail mesh.
//!
//! The funnel works on the coarse polygon mesh, so the straightened path can
//! cut corners vertically. The fixer re-samples walking segments at a fixed
//! step and projects each sample onto the detail surface of the polygon it
//! crosses, tracked with a forward-only corridor cursor.

use glam::{Vec2, Vec3, Vec3Swizzles as _};
use waymesh::{DetailMesh, NavMesh};

/// Forward-only cursor over the corridor's polygons.
///
/// The cursor never steps backward in the polygon path; each sample advances
/// it to the first polygon, from the current position onward, whose convex
/// footprint contains the sample.
pub(crate) struct CorridorCursor<'m> {
    mesh: &'m NavMesh,
    detail: &'m DetailMesh,
    corridor: &'m [u32],
    index: usize,
}

impl<'m> CorridorCursor<'m> {
    pub(crate) fn new(mesh: &'m NavMesh, detail: &'m DetailMesh, corridor: &'m [u32]) -> Self {
        Self {
            mesh,
            detail,
            corridor,
            index: 0,
        }
    }

    /// Projects `point` onto the detail surface: advances the cursor to the
    /// containing polygon and interpolates the covering detail triangle.
    /// Falls back to the raw height when no polygon or triangle covers the
    /// sample.
    pub(crate) fn fix(&mut self, point: Vec3) -> Vec3 {
        let Some(polygon) = self.advance_to(point.xy()) else {
            return point;
        };
        match self.detail.height_at(polygon as usize, point.xy()) {
            Some(z) => Vec3::new(point.x, point.y, z),
            None => point,
        }
    }

    fn advance_to(&mut self, point: Vec2) -> Option<u32> {
        for offset in 0..self.corridor.len().saturating_sub(self.index) {
            let candidate = self.corridor[self.index + offset];
            if polygon_contains(self.mesh, candidate, point) {
                self.index += offset;
                return Some(candidate);
            }
        }
        // No polygon from here on contains the sample; stay put.
        self.corridor.get(self.index).copied()
    }
}

/// Whether the convex polygon contains `point` in the XY projection, with a
/// small tolerance so samples on shared edges resolve to the earlier
/// polygon.
fn polygon_contains(mesh: &NavMesh, polygon: u32, point: Vec2) -> bool {
    const EPSILON: f32 = 1e-4;
    let vertices: Vec<Vec3> = mesh.polygon_vertices(polygon as usize).collect();
    if vertices.len() < 3 {
        return false;
    }
    let n = vertices.len();
    for i in 0..n {
        let a = vertices[i].xy();
        let b = vertices[(i + 1) % n].xy();
        if (b - a).perp_dot(point - a) < -EPSILON {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes::quad_strip_mesh;
    use waymesh::DetailMesh;

    fn flat_detail(mesh: &NavMesh, z: f32) -> DetailMesh {
        let mut detail = DetailMesh::default();
        for polygon in 0..mesh.polygon_count() {
            let vertices: Vec<Vec3> = mesh
                .polygon_vertices(polygon)
                .map(|v| Vec3::new(v.x, v.y, z))
                .collect();
            let vertex_base = detail.vertices.len() as u32;
            let triangle_base = detail.triangles.len() as u32;
            for i in 1..vertices.len() - 1 {
                detail.triangles.push([
                    vertex_base,
                    vertex_base + i as u32,
                    vertex_base + i as u32 + 1,
                ]);
                detail.triangle_polygons.push(polygon as u32);
            }
            detail.meshes.push(waymesh::SubMesh {
                vertex_base,
                vertex_count: vertices.len() as u32,
                triangle_base,
                triangle_count: (vertices.len() - 2) as u32,
            });
            detail.vertices.extend(vertices);
        }
        detail
    }

    #[test]
    fn cursor_advances_forward_only() {
        let mesh = quad_strip_mesh(3);
        let detail = flat_detail(&mesh, 2.5);
        let corridor = [0, 1, 2];
        let mut cursor = CorridorCursor::new(&mesh, &detail, &corridor);

        let fixed = cursor.fix(Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(fixed.z, 2.5);
        assert_eq!(cursor.index, 0);

        let fixed = cursor.fix(Vec3::new(5.0, 1.0, 0.0));
        assert_eq!(fixed.z, 2.5);
        assert_eq!(cursor.index, 2);

        // A sample back in polygon 0 must not move the cursor backward.
        cursor.fix(Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(cursor.index, 2);
    }

    #[test]
    fn uncovered_samples_keep_their_height() {
        let mesh = quad_strip_mesh(2);
        let detail = flat_detail(&mesh, 1.0);
        let corridor = [0, 1];
        let mut cursor = CorridorCursor::new(&mesh, &detail, &corridor);

        let fixed = cursor.fix(Vec3::new(50.0, 50.0, 7.0));
        assert_eq!(fixed.z, 7.0);
    }
}
