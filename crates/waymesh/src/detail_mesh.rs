//! Per-polygon detail height meshes.
//!
//! The polygon mesh is deliberately coarse; the detail mesh adds interior
//! height samples so path points can be projected back onto the actual
//! floor. It is purely a height oracle: nothing here contributes to graph
//! connectivity.

use glam::{Vec2, Vec3, Vec3Swizzles as _};
use tracing::debug;

use crate::{
    math::{next, point_in_polygon_2d},
    poly_mesh::NavMesh,
    span_field::SpanField,
};

/// Per-polygon range into the [`DetailMesh`] arrays.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SubMesh {
    /// First detail vertex of the polygon.
    pub vertex_base: u32,
    /// Number of detail vertices of the polygon.
    pub vertex_count: u32,
    /// First detail triangle of the polygon.
    pub triangle_base: u32,
    /// Number of detail triangles of the polygon.
    pub triangle_count: u32,
}

/// Triangulated height detail for every polygon of a [`NavMesh`].
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DetailMesh {
    /// The detail vertices in world space.
    pub vertices: Vec<Vec3>,
    /// The detail triangles as indices into [`DetailMesh::vertices`].
    pub triangles: Vec<[u32; 3]>,
    /// The owning polygon of each triangle.
    pub triangle_polygons: Vec<u32>,
    /// Per-polygon ranges, indexed by polygon id.
    pub meshes: Vec<SubMesh>,
}

impl DetailMesh {
    /// Builds the detail mesh for `mesh`.
    ///
    /// Every polygon starts from its boundary vertices, gains interior
    /// samples on a fixed `sample_step` grid (heights looked up from the
    /// span field, closest floor to the polygon's own height), and is
    /// re-triangulated.
    pub fn new(mesh: &NavMesh, field: &SpanField, sample_step: u16) -> Self {
        let mut detail = DetailMesh::default();
        let step = sample_step.max(1) as f32 * field.cell_size;

        for polygon in 0..mesh.polygon_count() {
            let boundary: Vec<Vec3> = mesh.polygon_vertices(polygon).collect();
            let vertex_base = detail.vertices.len() as u32;
            let triangle_base = detail.triangles.len() as u32;

            let provisional_z =
                boundary.iter().map(|v| v.z).sum::<f32>() / boundary.len() as f32;

            // Fan out the boundary into triangles with local indices, then
            // push interior samples into whichever triangle contains them.
            let mut vertices = boundary.clone();
            let mut triangles = fan_triangulate(boundary.len());

            let aabb = mesh.polygon_aabb(polygon);
            let mut sample_y = (aabb.min.y / step).ceil() * step;
            while sample_y < aabb.max.y {
                let mut sample_x = (aabb.min.x / step).ceil() * step;
                while sample_x < aabb.max.x {
                    let sample = Vec2::new(sample_x, sample_y);
                    sample_x += step;
                    if !point_in_polygon_2d(sample, &boundary) {
                        continue;
                    }
                    if boundary
                        .iter()
                        .any(|v| (v.xy() - sample).length_squared() < step * step * 0.25)
                    {
                        continue;
                    }
                    let Some(z) = field.closest_floor(sample, provisional_z) else {
                        continue;
                    };
                    insert_sample(
                        &mut vertices,
                        &mut triangles,
                        Vec3::new(sample.x, sample.y, z),
                    );
                }
                sample_y += step;
            }

            for triangle in &triangles {
                detail
                    .triangles
                    .push(triangle.map(|i| vertex_base + i as u32));
                detail.triangle_polygons.push(polygon as u32);
            }
            detail.vertices.extend_from_slice(&vertices);
            detail.meshes.push(SubMesh {
                vertex_base,
                vertex_count: vertices.len() as u32,
                triangle_base,
                triangle_count: triangles.len() as u32,
            });
        }
        debug!(
            vertices = detail.vertices.len(),
            triangles = detail.triangles.len(),
            "built detail mesh"
        );
        detail
    }

    /// Height of the detail surface of `polygon` at `point`, by barycentric
    /// interpolation on the covering triangle. `None` when no triangle of
    /// the polygon covers the point.
    pub fn height_at(&self, polygon: usize, point: Vec2) -> Option<f32> {
        let submesh = self.meshes.get(polygon)?;
        let range =
            submesh.triangle_base as usize..(submesh.triangle_base + submesh.triangle_count) as usize;
        for triangle in &self.triangles[range] {
            let a = self.vertices[triangle[0] as usize];
            let b = self.vertices[triangle[1] as usize];
            let c = self.vertices[triangle[2] as usize];
            if let Some(z) = triangle_height_at(point, a, b, c) {
                return Some(z);
            }
        }
        None
    }
}

/// Barycentric height of `point` on triangle `(a, b, c)`, `None` when the
/// point lies outside the triangle's XY projection.
pub(crate) fn triangle_height_at(point: Vec2, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let v0 = b.xy() - a.xy();
    let v1 = c.xy() - a.xy();
    let v2 = point - a.xy();
    let denom = v0.perp_dot(v1);
    if denom.abs() < f32::EPSILON {
        return None;
    }
    let u = v2.perp_dot(v1) / denom;
    let v = v0.perp_dot(v2) / denom;
    const EPS: f32 = 1e-4;
    if u < -EPS || v < -EPS || u + v > 1.0 + EPS {
        return None;
    }
    Some(a.z + u * (b.z - a.z) + v * (c.z - a.z))
}

/// Triangulates a convex boundary loop as a fan around vertex 0.
fn fan_triangulate(vertex_count: usize) -> Vec<[usize; 3]> {
    (1..vertex_count.saturating_sub(1))
        .map(|i| [0, i, next(i, vertex_count)])
        .collect()
}

/// Splits the triangle containing `sample` into three triangles around it.
/// Samples that land on no triangle (numerically on an edge) are dropped.
fn insert_sample(vertices: &mut Vec<Vec3>, triangles: &mut Vec<[usize; 3]>, sample: Vec3) {
    let containing = triangles.iter().position(|t| {
        triangle_height_at(sample.xy(), vertices[t[0]], vertices[t[1]], vertices[t[2]]).is_some()
    });
    let Some(index) = containing else {
        return;
    };
    let [a, b, c] = triangles[index];
    let s = vertices.len();
    vertices.push(sample);
    triangles[index] = [a, b, s];
    triangles.push([b, c, s]);
    triangles.push([c, a, s]);
}
