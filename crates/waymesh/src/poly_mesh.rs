//! Assembly of simplified contours into a convex polygon mesh.
//!
//! Contours are grouped per region, holes are bridged into their outer
//! loops, the merged loops are ear-clip triangulated and the triangles are
//! greedily merged back into convex polygons. The result carries a
//! deduplicated world-space vertex table and a multi-valued edge adjacency:
//! tile seams and T-junctions can legally give one edge several neighbors,
//! so adjacency is a list per edge, never a single slot.

use std::collections::HashMap;

use glam::{IVec2, Vec3};
use tracing::{debug, warn};

use crate::{
    contour::{Contour, ContourSet, ContourVertex},
    math::{area2, intersects, left, left_on, next, prev},
    region::RegionId,
    report::BuildReport,
};

/// A convex-polygon navigation mesh in world space.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavMesh {
    /// The mesh vertices, deduplicated.
    pub vertices: Vec<Vec3>,
    /// Vertex-index loops, [`NavMesh::NULL_INDEX`]-padded to
    /// `max_vertices_per_polygon` entries per polygon.
    pub polygons: Vec<u32>,
    /// The source region id of each polygon.
    pub regions: Vec<RegionId>,
    /// Adjacent polygon ids per polygon edge, `max_vertices_per_polygon`
    /// slots per polygon. Slot `j` describes the edge from vertex `j` to
    /// vertex `j + 1`.
    pub neighbors: Vec<Vec<u32>>,
    /// The maximum number of vertices per polygon.
    pub max_vertices_per_polygon: usize,
}

impl NavMesh {
    /// Padding value for unused polygon vertex slots.
    pub const NULL_INDEX: u32 = u32::MAX;

    /// The number of polygons in the mesh.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        if self.max_vertices_per_polygon == 0 {
            0
        } else {
            self.polygons.len() / self.max_vertices_per_polygon
        }
    }

    /// The vertex-index slots of polygon `polygon`, padding included.
    #[inline]
    pub fn polygon(&self, polygon: usize) -> &[u32] {
        let nvp = self.max_vertices_per_polygon;
        &self.polygons[polygon * nvp..(polygon + 1) * nvp]
    }

    /// The number of vertices of polygon `polygon`.
    pub fn polygon_vertex_count(&self, polygon: usize) -> usize {
        self.polygon(polygon)
            .iter()
            .take_while(|v| **v != Self::NULL_INDEX)
            .count()
    }

    /// The world-space vertices of polygon `polygon`, in loop order.
    pub fn polygon_vertices(&self, polygon: usize) -> impl Iterator<Item = Vec3> + '_ {
        self.polygon(polygon)
            .iter()
            .take_while(|v| **v != Self::NULL_INDEX)
            .map(|v| self.vertices[*v as usize])
    }

    /// The centroid of polygon `polygon`.
    pub fn centroid(&self, polygon: usize) -> Vec3 {
        let mut sum = Vec3::ZERO;
        let mut count = 0;
        for vertex in self.polygon_vertices(polygon) {
            sum += vertex;
            count += 1;
        }
        sum / count.max(1) as f32
    }

    /// The neighbor list of edge `edge` of polygon `polygon`.
    #[inline]
    pub fn edge_neighbors(&self, polygon: usize, edge: usize) -> &[u32] {
        &self.neighbors[polygon * self.max_vertices_per_polygon + edge]
    }

    /// The world-space endpoints of edge `edge` of polygon `polygon`.
    pub fn edge_vertices(&self, polygon: usize, edge: usize) -> (Vec3, Vec3) {
        let count = self.polygon_vertex_count(polygon);
        let poly = self.polygon(polygon);
        let a = poly[edge] as usize;
        let b = poly[next(edge, count)] as usize;
        (self.vertices[a], self.vertices[b])
    }

    /// The world-space AABB of polygon `polygon`.
    pub fn polygon_aabb(&self, polygon: usize) -> crate::math::Aabb3d {
        let mut min = Vec3::MAX;
        let mut max = Vec3::MIN;
        for vertex in self.polygon_vertices(polygon) {
            min = min.min(vertex);
            max = max.max(vertex);
        }
        crate::math::Aabb3d { min, max }
    }

    /// Recomputes the whole adjacency table from shared vertex pairs.
    ///
    /// Every unordered pair of vertex indices is one nominal edge; all
    /// polygons using that pair become mutual neighbors on the matching
    /// edge slots.
    pub fn rebuild_adjacency(&mut self) {
        let nvp = self.max_vertices_per_polygon;
        self.neighbors = vec![Vec::new(); self.polygons.len()];
        let mut edges: HashMap<(u32, u32), Vec<(u32, u32)>> = HashMap::new();
        for polygon in 0..self.polygon_count() {
            let count = self.polygon_vertex_count(polygon);
            for edge in 0..count {
                let poly = self.polygon(polygon);
                let a = poly[edge];
                let b = poly[next(edge, count)];
                let key = (a.min(b), a.max(b));
                edges
                    .entry(key)
                    .or_default()
                    .push((polygon as u32, edge as u32));
            }
        }
        for users in edges.values() {
            for &(polygon, edge) in users {
                for &(other, _) in users {
                    if other != polygon {
                        self.neighbors[polygon as usize * nvp + edge as usize].push(other);
                    }
                }
            }
        }
    }
}

impl ContourSet {
    /// Builds a polygon mesh from the contours.
    ///
    /// `max_vertices_per_polygon` bounds the convex merge; recoverable
    /// failures (unbridgeable holes, stuck triangulations) are skipped and
    /// counted on `report`.
    pub fn into_nav_mesh(self, max_vertices_per_polygon: usize, report: &mut BuildReport) -> NavMesh {
        let mut vertex_table = VertexTable::default();
        let mut polygons: Vec<Vec<u32>> = Vec::new();
        let mut poly_regions: Vec<RegionId> = Vec::new();

        // Group contour indices by region.
        let mut groups: HashMap<RegionId, Vec<usize>> = HashMap::new();
        for (i, contour) in self.contours.iter().enumerate() {
            groups.entry(contour.region).or_default().push(i);
        }
        let mut group_regions: Vec<RegionId> = groups.keys().copied().collect();
        group_regions.sort_unstable();

        for region in group_regions {
            let group = &groups[&region];
            for merged_loop in assemble_region_loops(&self.contours, group, report) {
                let Some(tris) = triangulate_loop(&merged_loop, report) else {
                    continue;
                };

                // Register the loop's vertices in the global table.
                let global: Vec<u32> = merged_loop
                    .iter()
                    .map(|v| vertex_table.add(v.x, v.y, v.z))
                    .collect();

                // Triangles become the initial polygons; degenerate slivers
                // produced by hole bridges are dropped.
                let mut loop_polys: Vec<Vec<u32>> = Vec::new();
                for [a, b, c] in tris {
                    let tri = [global[a], global[b], global[c]];
                    if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
                        continue;
                    }
                    let pa = vertex_table.grid_xy(tri[0]);
                    let pb = vertex_table.grid_xy(tri[1]);
                    let pc = vertex_table.grid_xy(tri[2]);
                    if area2(pa, pb, pc) == 0 {
                        continue;
                    }
                    loop_polys.push(tri.to_vec());
                }

                merge_convex_polygons(
                    &mut loop_polys,
                    max_vertices_per_polygon,
                    &vertex_table,
                );

                for poly in loop_polys {
                    polygons.push(poly);
                    poly_regions.push(region);
                }
            }
        }

        let mut mesh = NavMesh {
            vertices: vertex_table.to_world(&self),
            polygons: flatten_polygons(&polygons, max_vertices_per_polygon),
            regions: poly_regions,
            neighbors: Vec::new(),
            max_vertices_per_polygon,
        };
        mesh.rebuild_adjacency();
        debug!(
            polygons = mesh.polygon_count(),
            vertices = mesh.vertices.len(),
            "built polygon mesh"
        );
        mesh
    }
}

/// Classifies a region's contours into outers and holes by containment
/// parity, bridges every hole into its owning outer, and returns the merged
/// loops ready for triangulation.
fn assemble_region_loops(
    contours: &[Contour],
    group: &[usize],
    report: &mut BuildReport,
) -> Vec<Vec<ContourVertex>> {
    // Largest loops first so containment parity is well-defined.
    let mut ordered: Vec<usize> = group.to_vec();
    ordered.sort_by_key(|&i| -contours[i].signed_area2().abs());

    let mut outers: Vec<Vec<ContourVertex>> = Vec::new();
    let mut holes_of: Vec<Vec<Vec<ContourVertex>>> = Vec::new();

    for &index in &ordered {
        let contour = &contours[index];
        let first = contour.vertices[0].grid_xy();
        let containing: Vec<usize> = outers
            .iter()
            .enumerate()
            .filter(|(_, outer)| point_in_grid_polygon(first, outer))
            .map(|(i, _)| i)
            .collect();

        if containing.len() % 2 == 0 {
            // Even depth: an outer boundary. Normalize to counterclockwise.
            let mut vertices = contour.vertices.clone();
            if contour.is_hole() {
                vertices.reverse();
            }
            outers.push(vertices);
            holes_of.push(Vec::new());
        } else {
            // Odd depth: a hole, owned by the smallest containing outer.
            // Outers are processed largest-first, so that is the last one.
            let owner = *containing.last().unwrap();
            let mut vertices = contour.vertices.clone();
            if !contour.is_hole() {
                vertices.reverse();
            }
            holes_of[owner].push(vertices);
        }
    }

    outers
        .into_iter()
        .zip(holes_of)
        .map(|(outer, holes)| bridge_holes(outer, holes, report))
        .collect()
}

/// Merges `holes` into `outer` through zero-width bridges.
///
/// Holes are processed leftmost-first; each is joined through the nearest
/// `(hole vertex, outer vertex)` pair whose connecting segment crosses
/// neither the outer loop (which already contains all previously merged
/// holes) nor the hole itself.
fn bridge_holes(
    mut outer: Vec<ContourVertex>,
    mut holes: Vec<Vec<ContourVertex>>,
    report: &mut BuildReport,
) -> Vec<ContourVertex> {
    holes.sort_by_key(|hole| {
        hole.iter()
            .map(|v| (v.x, v.y))
            .min()
            .unwrap_or((u16::MAX, u16::MAX))
    });

    for hole in holes {
        // Candidate pairs ordered by squared distance.
        let mut candidates: Vec<(i64, usize, usize)> = Vec::new();
        for (hi, hv) in hole.iter().enumerate() {
            for (oi, ov) in outer.iter().enumerate() {
                let d = (hv.grid_xy() - ov.grid_xy()).as_i64vec2().length_squared();
                candidates.push((d, hi, oi));
            }
        }
        candidates.sort_unstable();

        let mut merged = false;
        for (_, hi, oi) in candidates {
            let a = hole[hi].grid_xy();
            let b = outer[oi].grid_xy();
            if a == b {
                continue;
            }
            if segment_crosses_loop(a, b, &outer, Some(oi))
                || segment_crosses_loop(a, b, &hole, Some(hi))
            {
                continue;
            }
            outer = splice_hole(&outer, oi, &hole, hi);
            merged = true;
            break;
        }
        if !merged {
            warn!("failed to bridge a hole into its outer contour");
            report.unmerged_holes += 1;
        }
    }
    outer
}

/// Whether the segment `a-b` crosses any edge of `loop_vertices` other than
/// the edges incident to `skip_vertex`.
fn segment_crosses_loop(
    a: IVec2,
    b: IVec2,
    loop_vertices: &[ContourVertex],
    skip_vertex: Option<usize>,
) -> bool {
    let n = loop_vertices.len();
    for k in 0..n {
        let k1 = next(k, n);
        if let Some(skip) = skip_vertex
            && (k == skip || k1 == skip)
        {
            continue;
        }
        let c = loop_vertices[k].grid_xy();
        let d = loop_vertices[k1].grid_xy();
        if c == a || c == b || d == a || d == b {
            continue;
        }
        if intersects(a, b, c, d) {
            return true;
        }
    }
    false
}

/// Splices `hole` into `outer` at the bridge `(outer[oi], hole[hi])`,
/// producing `outer[0..=oi] + hole[hi..] + hole[..=hi] + outer[oi..]` with
/// the bridge vertices duplicated on both sides of the zero-width channel.
fn splice_hole(
    outer: &[ContourVertex],
    oi: usize,
    hole: &[ContourVertex],
    hi: usize,
) -> Vec<ContourVertex> {
    let mut merged = Vec::with_capacity(outer.len() + hole.len() + 2);
    merged.extend_from_slice(&outer[..=oi]);
    for k in 0..=hole.len() {
        merged.push(hole[(hi + k) % hole.len()]);
    }
    merged.extend_from_slice(&outer[oi..]);
    merged
}

/// Ear-clip triangulation of a closed loop, smallest-diagonal-first.
///
/// Returns triangles as indices into `loop_vertices`, or `None` when the
/// triangulation gets stuck on degenerate input even after loosening the
/// ear test.
fn triangulate_loop(
    loop_vertices: &[ContourVertex],
    report: &mut BuildReport,
) -> Option<Vec<[usize; 3]>> {
    let coords: Vec<IVec2> = loop_vertices.iter().map(|v| v.grid_xy()).collect();
    if coords.len() < 3 {
        report.failed_triangulations += 1;
        return None;
    }
    let mut active: Vec<usize> = (0..coords.len()).collect();
    let mut triangles = Vec::with_capacity(coords.len().saturating_sub(2));

    while active.len() > 3 {
        let n = active.len();
        let mut best: Option<(i64, usize)> = None;
        let mut pick_loose = false;

        for pass in 0..2 {
            for i in 0..n {
                let i_prev = active[prev(i, n)];
                let i_next = active[next(i, n)];
                let ok = if pass == 0 {
                    diagonal(&coords, &active, prev(i, n), next(i, n))
                } else {
                    diagonal_loose(&coords, &active, prev(i, n), next(i, n))
                };
                if !ok {
                    continue;
                }
                let len = (coords[i_next] - coords[i_prev])
                    .as_i64vec2()
                    .length_squared();
                if best.is_none_or(|(best_len, _)| len < best_len) {
                    best = Some((len, i));
                }
            }
            if best.is_some() {
                pick_loose = pass == 1;
                break;
            }
        }

        let Some((_, i)) = best else {
            warn!("ear clipping failed to make progress, dropping loop");
            report.failed_triangulations += 1;
            return None;
        };
        if pick_loose {
            warn!("ear clipping fell back to a loosened ear test");
        }

        triangles.push([active[prev(i, n)], active[i], active[next(i, n)]]);
        active.remove(i);
    }
    triangles.push([active[0], active[1], active[2]]);
    Some(triangles)
}

/// Whether `(active[i], active[j])` is a proper internal diagonal of the
/// active loop: it stays inside the cone at `i` and intersects no
/// non-incident edge. Chords that touch another vertex are rejected by the
/// improper-intersection test.
fn diagonal(coords: &[IVec2], active: &[usize], i: usize, j: usize) -> bool {
    in_cone(coords, active, i, j) && diagonalie(coords, active, i, j)
}

/// The ear test without the cone check, used as a fallback when the strict
/// test cannot make progress on degenerate loops.
fn diagonal_loose(coords: &[IVec2], active: &[usize], i: usize, j: usize) -> bool {
    diagonalie(coords, active, i, j)
}

fn in_cone(coords: &[IVec2], active: &[usize], i: usize, j: usize) -> bool {
    let n = active.len();
    let p = coords[active[i]];
    let q = coords[active[j]];
    let p_prev = coords[active[prev(i, n)]];
    let p_next = coords[active[next(i, n)]];

    if left_on(p_prev, p, p_next) {
        // Convex vertex.
        left(p, q, p_prev) && left(q, p, p_next)
    } else {
        // Reflex vertex.
        !(left_on(p, q, p_next) && left_on(q, p, p_prev))
    }
}

fn diagonalie(coords: &[IVec2], active: &[usize], i: usize, j: usize) -> bool {
    let n = active.len();
    let a = coords[active[i]];
    let b = coords[active[j]];
    for k in 0..n {
        let k1 = next(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let c = coords[active[k]];
        let d = coords[active[k1]];
        // Edges sharing a coordinate with the chord endpoints do not count
        // as crossings.
        if c == a || c == b || d == a || d == b {
            continue;
        }
        if intersects(a, b, c, d) {
            return false;
        }
    }
    true
}

/// Greedily merges polygons sharing an edge into convex polygons, longest
/// shared edge first, bounded by `max_vertices`.
fn merge_convex_polygons(
    polygons: &mut Vec<Vec<u32>>,
    max_vertices: usize,
    vertex_table: &VertexTable,
) {
    if max_vertices <= 3 {
        return;
    }
    loop {
        let mut best: Option<(i64, usize, usize, usize, usize)> = None;
        for ia in 0..polygons.len() {
            for ib in ia + 1..polygons.len() {
                if polygons[ia].len() + polygons[ib].len() - 2 > max_vertices {
                    continue;
                }
                if let Some((value, ea, eb)) =
                    polygon_merge_value(&polygons[ia], &polygons[ib], vertex_table)
                    && best.is_none_or(|(best_value, ..)| value > best_value)
                {
                    best = Some((value, ia, ib, ea, eb));
                }
            }
        }
        let Some((_, ia, ib, ea, eb)) = best else {
            break;
        };
        let merged = merge_polygon_pair(&polygons[ia], &polygons[ib], ea, eb);
        polygons[ia] = merged;
        polygons.remove(ib);
    }
}

/// If `pa` and `pb` share an edge and merging them along it stays convex,
/// returns the squared length of the shared edge and the edge indices in
/// both polygons.
fn polygon_merge_value(
    pa: &[u32],
    pb: &[u32],
    vertex_table: &VertexTable,
) -> Option<(i64, usize, usize)> {
    let na = pa.len();
    let nb = pb.len();

    // Find the shared edge: traversed forward in pa, backward in pb.
    let mut shared = None;
    for i in 0..na {
        let va = pa[i];
        let vb = pa[next(i, na)];
        for j in 0..nb {
            if pb[j] == vb && pb[next(j, nb)] == va {
                shared = Some((i, j));
                break;
            }
        }
        if shared.is_some() {
            break;
        }
    }
    let (ea, eb) = shared?;

    // The merged polygon must stay convex at both junctions.
    let a_prev = vertex_table.grid_xy(pa[prev(ea, na)]);
    let a_vert = vertex_table.grid_xy(pa[ea]);
    let b_next2 = vertex_table.grid_xy(pb[(eb + 2) % nb]);
    if !left_on(a_prev, a_vert, b_next2) {
        return None;
    }
    let b_prev = vertex_table.grid_xy(pb[prev(eb, nb)]);
    let b_vert = vertex_table.grid_xy(pb[eb]);
    let a_next2 = vertex_table.grid_xy(pa[(ea + 2) % na]);
    if !left_on(b_prev, b_vert, a_next2) {
        return None;
    }

    let edge_a = vertex_table.grid_xy(pa[ea]);
    let edge_b = vertex_table.grid_xy(pa[next(ea, na)]);
    Some(((edge_b - edge_a).as_i64vec2().length_squared(), ea, eb))
}

/// Joins two polygons along the shared edge `(ea, eb)`.
fn merge_polygon_pair(pa: &[u32], pb: &[u32], ea: usize, eb: usize) -> Vec<u32> {
    let na = pa.len();
    let nb = pb.len();
    let mut merged = Vec::with_capacity(na + nb - 2);
    for i in 0..na - 1 {
        merged.push(pa[(ea + 1 + i) % na]);
    }
    for i in 0..nb - 1 {
        merged.push(pb[(eb + 1 + i) % nb]);
    }
    merged
}

fn flatten_polygons(polygons: &[Vec<u32>], max_vertices_per_polygon: usize) -> Vec<u32> {
    let mut flat = vec![NavMesh::NULL_INDEX; polygons.len() * max_vertices_per_polygon];
    for (i, poly) in polygons.iter().enumerate() {
        for (j, vertex) in poly.iter().enumerate() {
            flat[i * max_vertices_per_polygon + j] = *vertex;
        }
    }
    flat
}

/// Point-in-polygon on grid coordinates, boundary excluded on the right.
fn point_in_grid_polygon(point: IVec2, vertices: &[ContourVertex]) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let vi = vertices[i].grid_xy();
        let vj = vertices[j].grid_xy();
        if (vi.y > point.y) != (vj.y > point.y) {
            let t = (vj.x - vi.x) as f32 * (point.y - vi.y) as f32 / (vj.y - vi.y) as f32
                + vi.x as f32;
            if (point.x as f32) < t {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Deduplicating vertex table over grid coordinates.
///
/// Vertices sharing an XY cell corner merge when their heights are within a
/// small tolerance; stacked levels (a bridge above a tunnel) stay distinct.
#[derive(Debug, Default)]
struct VertexTable {
    vertices: Vec<(u16, u16, u16)>,
    buckets: HashMap<(u16, u16), Vec<u32>>,
}

impl VertexTable {
    const HEIGHT_TOLERANCE: u16 = 2;

    fn add(&mut self, x: u16, y: u16, z: u16) -> u32 {
        let bucket = self.buckets.entry((x, y)).or_default();
        for &index in bucket.iter() {
            let (_, _, existing_z) = self.vertices[index as usize];
            if existing_z.abs_diff(z) <= Self::HEIGHT_TOLERANCE {
                return index;
            }
        }
        let index = self.vertices.len() as u32;
        self.vertices.push((x, y, z));
        bucket.push(index);
        index
    }

    fn grid_xy(&self, index: u32) -> IVec2 {
        let (x, y, _) = self.vertices[index as usize];
        IVec2::new(x as i32, y as i32)
    }

    fn to_world(&self, cset: &ContourSet) -> Vec<Vec3> {
        self.vertices
            .iter()
            .map(|&(x, y, z)| {
                Vec3::new(
                    cset.aabb.min.x + x as f32 * cset.cell_size,
                    cset.aabb.min.y + y as f32 * cset.cell_size,
                    cset.aabb.min.z + z as f32 * cset.cell_height,
                )
            })
            .collect()
    }
}
