//! Region boundary tracing and simplification.
//!
//! Every region is turned into one or more closed vertex loops: one outer
//! boundary plus a loop per interior hole. The raw loops match the span grid
//! exactly; simplification keeps portal and tile-border vertices and reduces
//! everything else under a maximum-deviation policy, so that neighboring
//! regions (and neighboring tiles) produce matching edges.

use glam::{IVec2, Vec2, ivec2};
use tracing::{debug, warn};

use crate::{
    math::{Aabb3d, dist_sq_point_segment_2d, next, prev},
    region::RegionId,
    report::BuildReport,
    span_field::SpanField,
};

bitflags::bitflags! {
    /// The boundary edges of one span, one bit per direction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct EdgeSet: u8 {
        const NEG_X = 1;
        const POS_Y = 1 << 1;
        const POS_X = 1 << 2;
        const NEG_Y = 1 << 3;
        const ALL = 0xf;
    }
}

impl EdgeSet {
    #[inline]
    fn single(direction: u8) -> Self {
        Self::from_bits_truncate(1 << direction)
    }
}

/// A vertex of a [`Contour`] in discrete grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourVertex {
    /// Grid x of the cell corner.
    pub x: u16,
    /// Grid y of the cell corner.
    pub y: u16,
    /// Floor height of the corner in voxel units.
    pub z: u16,
    /// Region on the far side of the edge that starts at this vertex.
    /// [`RegionId::NONE`] for walls.
    pub neighbor: RegionId,
}

impl ContourVertex {
    #[inline]
    pub(crate) fn grid_xy(&self) -> IVec2 {
        ivec2(self.x as i32, self.y as i32)
    }
}

/// An ordered, closed boundary polyline of one region.
///
/// Winding is counterclockwise for outer loops and clockwise for holes, in
/// the grid XY plane.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Contour {
    /// The region this loop belongs to.
    pub region: RegionId,
    /// Simplified vertex loop.
    pub vertices: Vec<ContourVertex>,
}

impl Contour {
    /// Twice the signed area of the loop in grid units. Positive for
    /// counterclockwise winding.
    pub fn signed_area2(&self) -> i64 {
        let mut area = 0_i64;
        for i in 0..self.vertices.len() {
            let a = self.vertices[i].grid_xy().as_i64vec2();
            let b = self.vertices[next(i, self.vertices.len())]
                .grid_xy()
                .as_i64vec2();
            area += a.x * b.y - b.x * a.y;
        }
        area
    }

    /// Whether this loop is a hole (clockwise winding).
    pub fn is_hole(&self) -> bool {
        self.signed_area2() < 0
    }
}

/// All contours of a span field, plus the grid metadata needed to convert
/// them to world space later.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourSet {
    /// The contours in the set.
    pub contours: Vec<Contour>,
    /// The AABB of the source field in world space.
    pub aabb: Aabb3d,
    /// The size of each cell on the horizontal plane.
    pub cell_size: f32,
    /// The size of each cell along the z-axis.
    pub cell_height: f32,
    /// Padding ring width of the source field.
    pub padding: u16,
    /// The max edge error the contours were simplified with.
    pub max_error: f32,
}

impl SpanField {
    /// Traces and simplifies the boundary loops of every region.
    ///
    /// `max_error` is the maximum deviation of simplified wall edges from the
    /// raw outline, `max_edge_len` the maximum edge length before midpoint
    /// subdivision (0 disables subdivision). Degenerate loops are skipped and
    /// counted on `report`.
    pub fn build_contours(
        &self,
        max_error: f32,
        max_edge_len: u16,
        report: &mut BuildReport,
    ) -> ContourSet {
        let mut cset = ContourSet {
            contours: Vec::new(),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            padding: self.padding,
            max_error,
        };

        // Mark boundary edges: bit per direction where the neighbor is
        // missing or belongs to a different region.
        let mut flags = vec![EdgeSet::empty(); self.spans.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    if self.regions[i] == RegionId::NONE {
                        continue;
                    }
                    let mut connected = EdgeSet::empty();
                    for dir in 0..4_u8 {
                        let mut neighbor_region = RegionId::NONE;
                        if let Some(con) = self.spans[i].con(dir) {
                            let (_, _, neighbor) =
                                self.con_indices(x as i32, y as i32, dir, con);
                            neighbor_region = self.regions[neighbor];
                        }
                        if neighbor_region == self.regions[i] {
                            connected |= EdgeSet::single(dir);
                        }
                    }
                    // Inverse: mark the non-connected edges.
                    flags[i] = connected.complement();
                }
            }
        }

        let mut raw = Vec::with_capacity(256);
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    if flags[i].is_empty() || flags[i] == EdgeSet::ALL {
                        flags[i] = EdgeSet::empty();
                        continue;
                    }
                    let region = self.regions[i];
                    if region == RegionId::NONE {
                        continue;
                    }

                    raw.clear();
                    self.walk_contour(x, y, i, &mut flags, &mut raw);
                    if raw.is_empty() {
                        continue;
                    }

                    let mut vertices = simplify_contour(&raw, max_error, self);
                    if max_edge_len > 0 {
                        subdivide_long_edges(&mut vertices, max_edge_len);
                    }
                    remove_degenerate_segments(&mut vertices);

                    let contour = Contour { region, vertices };
                    if !is_valid_contour(&contour) {
                        warn!(region = region.0, "skipping degenerate contour");
                        report.degenerate_contours += 1;
                        continue;
                    }
                    cset.contours.push(contour);
                }
            }
        }
        debug!(contours = cset.contours.len(), "built contours");
        cset
    }

    /// Walks one boundary loop starting at span `i`, clearing the edge flags
    /// it consumes. The walk prefers the clockwise-most turn first and steps
    /// through same-region edges without emitting; emitted loops are stored
    /// reversed so that outer boundaries wind counterclockwise.
    fn walk_contour(
        &self,
        mut x: u16,
        mut y: u16,
        mut i: usize,
        flags: &mut [EdgeSet],
        out: &mut Vec<ContourVertex>,
    ) {
        // Choose the first boundary edge.
        let mut dir = 0_u8;
        while !flags[i].contains(EdgeSet::single(dir)) {
            dir += 1;
        }
        let start_dir = dir;
        let start_i = i;

        const MAX_STEPS: usize = 40_000;
        for _ in 0..MAX_STEPS {
            if flags[i].contains(EdgeSet::single(dir)) {
                // Emit the corner vertex of this boundary edge.
                let mut corner_x = x;
                let mut corner_y = y;
                match dir {
                    0 => corner_y += 1,
                    1 => {
                        corner_x += 1;
                        corner_y += 1;
                    }
                    2 => corner_x += 1,
                    _ => {}
                }
                let z = self.corner_height(x, y, i, dir);
                let mut neighbor = RegionId::NONE;
                if let Some(con) = self.spans[i].con(dir) {
                    let (_, _, neighbor_index) = self.con_indices(x as i32, y as i32, dir, con);
                    neighbor = self.regions[neighbor_index];
                }
                out.push(ContourVertex {
                    x: corner_x,
                    y: corner_y,
                    z,
                    neighbor,
                });

                flags[i].remove(EdgeSet::single(dir));
                // Rotate clockwise.
                dir = (dir + 1) & 0x3;
            } else {
                // Step into the same-region neighbor and rotate
                // counterclockwise.
                let span = &self.spans[i];
                let Some(con) = span.con(dir) else {
                    // Should not happen: a non-boundary edge always has a
                    // connection.
                    out.clear();
                    return;
                };
                let (neighbor_x, neighbor_y, neighbor_index) =
                    self.con_indices(x as i32, y as i32, dir, con);
                x = neighbor_x as u16;
                y = neighbor_y as u16;
                i = neighbor_index;
                dir = (dir + 3) & 0x3;
            }
            if i == start_i && dir == start_dir {
                break;
            }
        }

        reverse_loop(out);
    }

    /// Height of the corner between `dir` and `dir + 1`: the max floor among
    /// the current span, its two adjacent spans, and a best-effort diagonal
    /// reached through either of the two-step paths.
    fn corner_height(&self, x: u16, y: u16, i: usize, dir: u8) -> u16 {
        let span = &self.spans[i];
        let dir_p = (dir + 1) & 0x3;
        let mut height = span.z;

        if let Some(con) = span.con(dir) {
            let (a_x, a_y, a_i) = self.con_indices(x as i32, y as i32, dir, con);
            let a_span = &self.spans[a_i];
            height = height.max(a_span.z);
            if let Some(con) = a_span.con(dir_p) {
                let (_, _, b_i) = self.con_indices(a_x, a_y, dir_p, con);
                height = height.max(self.spans[b_i].z);
            }
        }
        if let Some(con) = span.con(dir_p) {
            let (a_x, a_y, a_i) = self.con_indices(x as i32, y as i32, dir_p, con);
            let a_span = &self.spans[a_i];
            height = height.max(a_span.z);
            if let Some(con) = a_span.con(dir) {
                let (_, _, b_i) = self.con_indices(a_x, a_y, dir, con);
                height = height.max(self.spans[b_i].z);
            }
        }
        height
    }

    /// Whether a raw contour vertex lies on the tile's core border lines.
    fn on_tile_border(&self, vertex: &ContourVertex) -> bool {
        let min = self.padding;
        let max_x = self.width - self.padding;
        let max_y = self.height - self.padding;
        vertex.x == min || vertex.x == max_x || vertex.y == min || vertex.y == max_y
    }
}

/// Reverses a traced loop in place, re-associating each edge's neighbor
/// region with its new leading vertex.
fn reverse_loop(vertices: &mut [ContourVertex]) {
    let n = vertices.len();
    if n < 2 {
        return;
    }
    let neighbors: Vec<RegionId> = vertices.iter().map(|v| v.neighbor).collect();
    vertices.reverse();
    for (j, vertex) in vertices.iter_mut().enumerate() {
        // The edge that now starts at position j is the old edge that led
        // into the old position of this vertex.
        vertex.neighbor = neighbors[(2 * n - 2 - j) % n];
    }
}

/// Simplifies a raw loop: keeps vertices where the portal region changes and
/// non-collinear tile-border corners, then inserts raw points back into wall
/// runs wherever the deviation exceeds `max_error`.
fn simplify_contour(raw: &[ContourVertex], max_error: f32, field: &SpanField) -> Vec<ContourVertex> {
    let n = raw.len();
    // (vertex, raw index) pairs.
    let mut simplified: Vec<(ContourVertex, usize)> = Vec::new();

    for i in 0..n {
        let portal_change = raw[i].neighbor != raw[prev(i, n)].neighbor;
        let border_corner = field.on_tile_border(&raw[i]) && {
            let a = raw[prev(i, n)].grid_xy();
            let b = raw[i].grid_xy();
            let c = raw[next(i, n)].grid_xy();
            !((a.x == b.x && b.x == c.x) || (a.y == b.y && b.y == c.y))
        };
        if portal_change || border_corner {
            simplified.push((raw[i], i));
        }
    }

    if simplified.is_empty() {
        // No portals or border corners at all: seed the simplification with
        // the lower-left-most and upper-right-most vertices.
        let ll = raw
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| (v.x, v.y))
            .map(|(i, v)| (*v, i))
            .unwrap();
        let ur = raw
            .iter()
            .enumerate()
            .max_by_key(|(_, v)| (v.x, v.y))
            .map(|(i, v)| (*v, i))
            .unwrap();
        simplified.push(ll);
        simplified.push(ur);
    }

    // Add points until all raw points of wall runs are within tolerance.
    let max_error_sq = max_error * max_error;
    let mut i = 0;
    while i < simplified.len() {
        let ii = next(i, simplified.len());
        let (a, ai) = simplified[i];
        let (b, bi) = simplified[ii];

        // Portal runs keep exactly their endpoints; both sides of the portal
        // derive the same segment, which is what makes the edges match up.
        if raw[ai].neighbor != RegionId::NONE {
            i += 1;
            continue;
        }

        let seg_a = Vec2::new(a.x as f32, a.y as f32);
        let seg_b = Vec2::new(b.x as f32, b.y as f32);
        let mut max_dev = 0.0_f32;
        let mut max_index = None;
        let mut ci = next(ai, n);
        while ci != bi {
            let point = Vec2::new(raw[ci].x as f32, raw[ci].y as f32);
            let dev = dist_sq_point_segment_2d(point, seg_a, seg_b);
            if dev > max_dev {
                max_dev = dev;
                max_index = Some(ci);
            }
            ci = next(ci, n);
        }

        if let Some(ci) = max_index
            && max_dev > max_error_sq
        {
            simplified.insert(i + 1, (raw[ci], ci));
        } else {
            i += 1;
        }
    }

    simplified.into_iter().map(|(v, _)| v).collect()
}

/// Splits every edge longer than `max_edge_len` at its midpoint, repeating
/// until no edge exceeds the limit or the iteration cap is reached.
fn subdivide_long_edges(vertices: &mut Vec<ContourVertex>, max_edge_len: u16) {
    const MAX_INSERTIONS: usize = 1 << 12;
    let max_len_sq = (max_edge_len as i64) * (max_edge_len as i64);
    let mut insertions = 0;
    let mut i = 0;
    while i < vertices.len() && insertions < MAX_INSERTIONS {
        let a = vertices[i];
        let b = vertices[next(i, vertices.len())];
        let delta = (b.grid_xy() - a.grid_xy()).as_i64vec2();
        if delta.length_squared() > max_len_sq {
            let mid = ContourVertex {
                x: ((a.x as u32 + b.x as u32) / 2) as u16,
                y: ((a.y as u32 + b.y as u32) / 2) as u16,
                z: ((a.z as u32 + b.z as u32) / 2) as u16,
                neighbor: a.neighbor,
            };
            vertices.insert(i + 1, mid);
            insertions += 1;
        } else {
            i += 1;
        }
    }
}

/// Drops consecutive vertices that collapsed onto the same grid XY.
fn remove_degenerate_segments(vertices: &mut Vec<ContourVertex>) {
    let mut i = 0;
    while i < vertices.len() && vertices.len() > 1 {
        let ni = next(i, vertices.len());
        if vertices[i].grid_xy() == vertices[ni].grid_xy() {
            vertices.remove(ni);
        } else {
            i += 1;
        }
    }
}

/// A contour is valid when it has at least 3 distinct XY vertices and
/// non-zero signed area.
fn is_valid_contour(contour: &Contour) -> bool {
    if contour.vertices.len() < 3 {
        return false;
    }
    let mut distinct: Vec<IVec2> = contour.vertices.iter().map(|v| v.grid_xy()).collect();
    distinct.sort_by_key(|p| (p.x, p.y));
    distinct.dedup();
    distinct.len() >= 3 && contour.signed_area2() != 0
}
