//! Jump and ladder connectivity between polygons that plain walking cannot
//! reach.
//!
//! Jump links are found geometrically: boundary edges of different
//! connectivity islands are paired through a spatial hash, filtered by
//! distance and height rules, and validated with swept-volume probes in both
//! directions. Ladder links come from host-placed marker pairs.

use std::collections::HashMap;

use glam::{Vec3, Vec3Swizzles as _};
use tracing::{debug, warn};

use crate::{
    config::NavConfig,
    math::{Aabb3d, closest_points_between_segments, point_in_polygon_2d},
    poly_mesh::NavMesh,
    probe::{LADDER_MARKER_PREFIX, MarkerSource, SolidProbe},
    report::BuildReport,
};

/// How a path segment or link is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TravelMode {
    /// Ordinary walking over mesh adjacency.
    Walk,
    /// A jump between two polygons without edge adjacency.
    Jump,
    /// A ladder climb between two marker-designated polygons.
    Ladder,
}

/// A non-edge-adjacency connector between two polygons.
///
/// Links are directionless; the pathfinder may traverse them from either
/// endpoint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
    /// One endpoint polygon.
    pub polygon_a: u32,
    /// The other endpoint polygon.
    pub polygon_b: u32,
    /// World position of the endpoint on `polygon_a`.
    pub position_a: Vec3,
    /// World position of the endpoint on `polygon_b`.
    pub position_b: Vec3,
    /// Traversal cost used during the graph search.
    pub cost: f32,
    /// The traversal kind of this link.
    pub mode: TravelMode,
}

impl Link {
    /// The unordered polygon pair of this link.
    #[inline]
    pub fn polygon_pair(&self) -> (u32, u32) {
        (
            self.polygon_a.min(self.polygon_b),
            self.polygon_a.max(self.polygon_b),
        )
    }
}

/// Cost multiplier applied to the jump distance.
const JUMP_COST_FACTOR: f32 = 1.5;

/// Assigns every polygon to a connectivity island: a maximal set of polygons
/// mutually reachable via plain adjacency (shared edges, shared corner
/// vertices, or stitched tile seams), without links. Returns dense island
/// ids per polygon.
pub fn polygon_islands(mesh: &NavMesh) -> Vec<u32> {
    let mut union_find = UnionFind::new(mesh.polygon_count());
    let mut vertex_owner: HashMap<u32, u32> = HashMap::new();
    for polygon in 0..mesh.polygon_count() {
        let count = mesh.polygon_vertex_count(polygon);
        for slot in 0..count {
            let vertex = mesh.polygon(polygon)[slot];
            match vertex_owner.get(&vertex) {
                Some(&other) => union_find.union(polygon, other as usize),
                None => {
                    vertex_owner.insert(vertex, polygon as u32);
                }
            }
        }
        for edge in 0..count {
            for &neighbor in mesh.edge_neighbors(polygon, edge) {
                union_find.union(polygon, neighbor as usize);
            }
        }
    }

    let mut dense: HashMap<usize, u32> = HashMap::new();
    let mut islands = vec![0_u32; mesh.polygon_count()];
    for polygon in 0..mesh.polygon_count() {
        let root = union_find.find(polygon);
        let next_id = dense.len() as u32;
        let id = *dense.entry(root).or_insert(next_id);
        islands[polygon] = id;
    }
    islands
}

/// A boundary edge of the mesh: a polygon edge with no adjacency.
struct BoundaryEdge {
    polygon: u32,
    island: u32,
    a: Vec3,
    b: Vec3,
}

impl BoundaryEdge {
    fn aabb(&self) -> Aabb3d {
        Aabb3d {
            min: self.a.min(self.b),
            max: self.a.max(self.b),
        }
    }
}

/// Builds validated jump links between boundary edges of the mesh.
///
/// Candidate pairs must span different islands (or a step too high to walk),
/// stay within the configured jump distance and height, and pass a swept-box
/// probe in both directions. The result keeps the closest candidate per
/// polygon pair, admits candidates nearest-first under a minimum-spacing
/// rule per island pair, and drops anything already present in `existing`.
pub fn build_jump_links(
    mesh: &NavMesh,
    probe: &dyn SolidProbe,
    config: &NavConfig,
    existing: &[Link],
) -> Vec<Link> {
    let islands = polygon_islands(mesh);
    let step_height = config.walkable_climb as f32 * config.cell_height;

    // Collect boundary edges.
    let mut edges: Vec<BoundaryEdge> = Vec::new();
    for polygon in 0..mesh.polygon_count() {
        let count = mesh.polygon_vertex_count(polygon);
        for edge in 0..count {
            if !mesh.edge_neighbors(polygon, edge).is_empty() {
                continue;
            }
            let (a, b) = mesh.edge_vertices(polygon, edge);
            edges.push(BoundaryEdge {
                polygon: polygon as u32,
                island: islands[polygon],
                a,
                b,
            });
        }
    }

    // Uniform spatial hash over edge bounding boxes.
    let hash_cell = (config.max_jump_distance * 2.0).max(f32::EPSILON);
    let mut grid: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
    for (index, edge) in edges.iter().enumerate() {
        let aabb = edge.aabb();
        let min_x = (aabb.min.x / hash_cell).floor() as i32;
        let max_x = (aabb.max.x / hash_cell).floor() as i32;
        let min_y = (aabb.min.y / hash_cell).floor() as i32;
        let max_y = (aabb.max.y / hash_cell).floor() as i32;
        for cell_y in min_y..=max_y {
            for cell_x in min_x..=max_x {
                grid.entry((cell_x, cell_y)).or_default().push(index);
            }
        }
    }

    // Best candidate per unordered polygon pair.
    struct Candidate {
        polygon_a: u32,
        polygon_b: u32,
        island_pair: (u32, u32),
        position_a: Vec3,
        position_b: Vec3,
        distance: f32,
    }
    let mut best: HashMap<(u32, u32), Candidate> = HashMap::new();

    for (i, edge) in edges.iter().enumerate() {
        let query = edge
            .aabb()
            .expand(config.max_jump_distance.max(config.max_jump_height));
        let min_x = (query.min.x / hash_cell).floor() as i32;
        let max_x = (query.max.x / hash_cell).floor() as i32;
        let min_y = (query.min.y / hash_cell).floor() as i32;
        let max_y = (query.max.y / hash_cell).floor() as i32;

        let mut seen: Vec<usize> = Vec::new();
        for cell_y in min_y..=max_y {
            for cell_x in min_x..=max_x {
                let Some(bucket) = grid.get(&(cell_x, cell_y)) else {
                    continue;
                };
                for &j in bucket {
                    if j <= i || seen.contains(&j) {
                        continue;
                    }
                    seen.push(j);
                }
            }
        }

        for j in seen {
            let other = &edges[j];
            if other.polygon == edge.polygon {
                continue;
            }
            if !query.overlaps(&other.aabb()) {
                continue;
            }

            let (pa, pb) = closest_points_between_segments(edge.a, edge.b, other.a, other.b);
            let xy_distance = (pa.xy() - pb.xy()).length();
            if xy_distance > config.max_jump_distance {
                continue;
            }
            let height_difference = (pa.z - pb.z).abs();
            if height_difference > config.max_jump_height {
                continue;
            }
            if edge.island == other.island && height_difference <= step_height {
                // Already reachable by walking.
                continue;
            }
            // Coincident, same-height pairs are contour artifacts, not jumps.
            if xy_distance < config.cell_size * 0.5 && height_difference <= step_height {
                continue;
            }

            // Validate the arc with swept boxes in both directions. The box
            // is centered so its bottom face clears the floor line by the
            // configured clearance.
            let lift = config.jump_clearance + config.agent_half_extents.z;
            let start = pa + Vec3::new(0.0, 0.0, lift);
            let end = pb + Vec3::new(0.0, 0.0, lift);
            let mins = -config.agent_half_extents;
            let maxs = config.agent_half_extents;
            if probe.sweep_box(mins, maxs, start, end) || probe.sweep_box(mins, maxs, end, start) {
                continue;
            }

            let distance = pa.distance(pb);
            let key = (
                edge.polygon.min(other.polygon),
                edge.polygon.max(other.polygon),
            );
            let island_pair = (
                edge.island.min(other.island),
                edge.island.max(other.island),
            );
            let candidate = Candidate {
                polygon_a: edge.polygon,
                polygon_b: other.polygon,
                island_pair,
                position_a: pa,
                position_b: pb,
                distance,
            };
            match best.get(&key) {
                Some(current) if current.distance <= distance => {}
                _ => {
                    best.insert(key, candidate);
                }
            }
        }
    }

    // Greedy nearest-first admission with minimum spacing per island pair.
    let mut candidates: Vec<Candidate> = best.into_values().collect();
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let existing_pairs: Vec<(u32, u32)> = existing
        .iter()
        .filter(|link| link.mode == TravelMode::Jump)
        .map(|link| link.polygon_pair())
        .collect();

    let mut links: Vec<Link> = Vec::new();
    let mut admitted_midpoints: HashMap<(u32, u32), Vec<Vec3>> = HashMap::new();
    for candidate in candidates {
        let pair = (
            candidate.polygon_a.min(candidate.polygon_b),
            candidate.polygon_a.max(candidate.polygon_b),
        );
        if existing_pairs.contains(&pair) {
            continue;
        }
        let midpoint = (candidate.position_a + candidate.position_b) * 0.5;
        let spaced = admitted_midpoints
            .get(&candidate.island_pair)
            .is_none_or(|midpoints| {
                midpoints
                    .iter()
                    .all(|m| m.distance(midpoint) >= config.jump_link_spacing)
            });
        if !spaced {
            continue;
        }
        admitted_midpoints
            .entry(candidate.island_pair)
            .or_default()
            .push(midpoint);
        links.push(Link {
            polygon_a: candidate.polygon_a,
            polygon_b: candidate.polygon_b,
            position_a: candidate.position_a,
            position_b: candidate.position_b,
            cost: candidate.distance * JUMP_COST_FACTOR,
            mode: TravelMode::Jump,
        });
    }
    debug!(links = links.len(), "built jump links");
    links
}

/// Builds ladder links from host markers prefixed `ladder_`.
///
/// Markers sharing the tag after the prefix form a group; every group must
/// contain exactly two points. The lower and upper point are snapped to
/// their nearest polygons and connected with [`TravelMode::Ladder`].
pub fn build_ladder_links(
    mesh: &NavMesh,
    markers: &dyn MarkerSource,
    report: &mut BuildReport,
) -> Vec<Link> {
    let mut groups: HashMap<String, Vec<Vec3>> = HashMap::new();
    for marker in markers.markers_by_prefix(LADDER_MARKER_PREFIX) {
        let tag = marker.name[LADDER_MARKER_PREFIX.len()..].to_owned();
        groups.entry(tag).or_default().push(marker.position);
    }
    let mut tags: Vec<String> = groups.keys().cloned().collect();
    tags.sort_unstable();

    let mut links = Vec::new();
    for tag in tags {
        let points = &groups[&tag];
        if points.len() != 2 {
            warn!(
                tag,
                count = points.len(),
                "ladder marker group must contain exactly 2 points"
            );
            report.bad_ladder_groups += 1;
            continue;
        }
        let (lower, upper) = if points[0].z <= points[1].z {
            (points[0], points[1])
        } else {
            (points[1], points[0])
        };
        let Some((polygon_a, position_a)) = nearest_polygon(mesh, lower) else {
            report.unsnapped_ladders += 1;
            continue;
        };
        let Some((polygon_b, position_b)) = nearest_polygon(mesh, upper) else {
            report.unsnapped_ladders += 1;
            continue;
        };
        let cost = position_a.distance(position_b).max(1.0);
        links.push(Link {
            polygon_a,
            polygon_b,
            position_a,
            position_b,
            cost,
            mode: TravelMode::Ladder,
        });
    }
    debug!(links = links.len(), "built ladder links");
    links
}

/// Nearest polygon to `point` and the closest position on it, by linear
/// scan. `None` for an empty mesh.
pub fn nearest_polygon(mesh: &NavMesh, point: Vec3) -> Option<(u32, Vec3)> {
    let mut best: Option<(u32, Vec3, f32)> = None;
    for polygon in 0..mesh.polygon_count() {
        let closest = closest_point_on_polygon(mesh, polygon, point);
        let distance = closest.distance_squared(point);
        if best.is_none_or(|(_, _, d)| distance < d) {
            best = Some((polygon as u32, closest, distance));
        }
    }
    best.map(|(polygon, closest, _)| (polygon, closest))
}

/// Closest point of polygon `polygon` to `point`: the point itself when the
/// XY projection lies inside, otherwise the projection onto the nearest
/// boundary edge, with heights interpolated along that edge.
pub(crate) fn closest_point_on_polygon(mesh: &NavMesh, polygon: usize, point: Vec3) -> Vec3 {
    let vertices: Vec<Vec3> = mesh.polygon_vertices(polygon).collect();
    if point_in_polygon_2d(point.xy(), &vertices) {
        let z = mesh.centroid(polygon).z;
        return Vec3::new(point.x, point.y, z);
    }

    let mut best = vertices[0];
    let mut best_distance = f32::MAX;
    let n = vertices.len();
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let ab = (b - a).xy();
        let denom = ab.length_squared();
        let t = if denom > f32::EPSILON {
            ((point.xy() - a.xy()).dot(ab) / denom).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let candidate = a + (b - a) * t;
        let distance = candidate.xy().distance_squared(point.xy());
        if distance < best_distance {
            best_distance = distance;
            best = candidate;
        }
    }
    best
}

/// Plain array-based union-find with path halving.
pub(crate) struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    pub(crate) fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent[root_a.max(root_b)] = root_a.min(root_b);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{
        config::NavConfigBuilder,
        heightfield::{HeightfieldBuilder, SpanInsertion},
        probe::{Marker, ProbeHit},
        span::SpanBuilder,
        span_field::SpanField,
    };

    /// A probe whose sweeps never hit anything.
    struct OpenAir;

    impl SolidProbe for OpenAir {
        fn probe_down(&self, _x: f32, _y: f32, _z_top: f32, _z_bottom: f32) -> Option<ProbeHit> {
            None
        }
        fn probe_up(&self, _x: f32, _y: f32, _z_from: f32, _z_top: f32) -> Option<f32> {
            None
        }
        fn sweep_box(&self, _mins: Vec3, _maxs: Vec3, _start: Vec3, _end: Vec3) -> bool {
            false
        }
    }

    /// A probe whose sweeps always hit.
    struct Walled;

    impl SolidProbe for Walled {
        fn probe_down(&self, _x: f32, _y: f32, _z_top: f32, _z_bottom: f32) -> Option<ProbeHit> {
            None
        }
        fn probe_up(&self, _x: f32, _y: f32, _z_from: f32, _z_top: f32) -> Option<f32> {
            None
        }
        fn sweep_box(&self, _mins: Vec3, _maxs: Vec3, _start: Vec3, _end: Vec3) -> bool {
            true
        }
    }

    /// Two flat plates with a `gap`-cell channel of void between them, at
    /// different floor heights.
    fn two_plates(gap: u16, floor_a: u16, floor_b: u16) -> (NavMesh, NavConfig) {
        let width = 16 + gap;
        let aabb = Aabb3d::new(Vec3::ZERO, Vec3::new(width as f32, 8.0, 51.2));
        let config = NavConfigBuilder {
            cell_size: 1.0,
            cell_height: 0.2,
            aabb,
            max_jump_distance: 6.0,
            max_jump_height: 6.0,
            ..Default::default()
        }
        .build()
        .unwrap();
        let mut heightfield = HeightfieldBuilder {
            aabb,
            cell_size: 1.0,
            cell_height: 0.2,
        }
        .build()
        .unwrap();
        for y in 0..8_u16 {
            for x in 0..width {
                let floor = if x < 8 {
                    floor_a
                } else if x >= 8 + gap {
                    floor_b
                } else {
                    continue;
                };
                heightfield
                    .add_span(SpanInsertion {
                        x,
                        y,
                        span: SpanBuilder {
                            floor,
                            ceiling: 250,
                            next: None,
                        }
                        .build(),
                    })
                    .unwrap();
            }
        }
        let mut field = SpanField::from_heightfield(&heightfield, &config).unwrap();
        field.build_regions(4, 400);
        let mut report = BuildReport::default();
        let cset = field.build_contours(1.3, 0, &mut report);
        let mesh = cset.into_nav_mesh(6, &mut report);
        assert!(!report.any());
        (mesh, config)
    }

    #[test]
    fn disconnected_plates_are_distinct_islands() {
        let (mesh, _) = two_plates(4, 5, 5);
        let islands = polygon_islands(&mesh);
        let unique: std::collections::HashSet<u32> = islands.iter().copied().collect();
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn jump_link_bridges_the_gap() {
        let (mesh, config) = two_plates(4, 5, 25);
        let links = build_jump_links(&mesh, &OpenAir, &config, &[]);
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.mode, TravelMode::Jump);
        // The endpoints face each other across the gap.
        assert!((link.position_a.x - link.position_b.x).abs() >= 3.9);
        assert!(link.cost > 0.0);
    }

    #[test]
    fn blocked_sweeps_reject_all_candidates() {
        let (mesh, config) = two_plates(4, 5, 25);
        let links = build_jump_links(&mesh, &Walled, &config, &[]);
        assert!(links.is_empty());
    }

    #[test]
    fn existing_links_are_not_duplicated() {
        let (mesh, config) = two_plates(4, 5, 25);
        let first = build_jump_links(&mesh, &OpenAir, &config, &[]);
        let second = build_jump_links(&mesh, &OpenAir, &config, &first);
        assert!(second.is_empty());
    }

    struct TestMarkers(Vec<Marker>);

    impl MarkerSource for TestMarkers {
        fn markers_by_prefix(&self, prefix: &str) -> Vec<Marker> {
            self.0
                .iter()
                .filter(|m| m.name.starts_with(prefix))
                .cloned()
                .collect()
        }
    }

    #[test]
    fn ladder_markers_pair_up_by_tag() {
        let (mesh, _) = two_plates(4, 5, 25);
        let markers = TestMarkers(vec![
            Marker {
                name: "ladder_shaft".into(),
                position: Vec3::new(7.5, 4.0, 1.0),
            },
            Marker {
                name: "ladder_shaft".into(),
                position: Vec3::new(12.5, 4.0, 5.0),
            },
            Marker {
                name: "ladder_lonely".into(),
                position: Vec3::new(1.0, 1.0, 1.0),
            },
        ]);
        let mut report = BuildReport::default();
        let links = build_ladder_links(&mesh, &markers, &mut report);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].mode, TravelMode::Ladder);
        assert!(links[0].cost >= 1.0);
        assert_eq!(report.bad_ladder_groups, 1);
    }
}
