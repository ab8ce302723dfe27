//! Path queries over [`waymesh`] navigation meshes.
//!
//! [`PathQuery`] consumes a published mesh (polygons, detail, links, spatial
//! index) and answers `find_path` with an ordered list of [`PathPoint`]s:
//! polygon-graph A*, funnel smoothing per walk run, link anchors for jumps
//! and ladders, and detail-mesh height fixing. Queries never error: points
//! that cannot be mapped onto the mesh yield an empty path.

mod astar;
mod funnel;
mod heap;
mod height;

use glam::Vec3;
use tracing::debug;
use waymesh::{PublishedMesh, TravelMode};

use crate::{
    astar::{CorridorStep, PolygonSearch},
    funnel::{portal_between, string_pull},
    height::CorridorCursor,
};

/// How link costs enter the search relaxation.
///
/// Implementations of this system disagree on whether link costs are
/// compared linearly or squared; the policy is explicit configuration
/// rather than a baked-in choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkCostPolicy {
    /// Use the link's cost as-is.
    #[default]
    Linear,
    /// Square the link's cost before comparison.
    Squared,
}

/// Tuning parameters for path queries.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    /// Heuristic scale factor. `[Limit: >= 1]`
    ///
    /// Values above 1 make the heuristic inadmissible on purpose, trading
    /// path optimality for fewer node expansions.
    pub heuristic_scale: f32,
    /// How link costs enter the relaxation.
    pub link_cost_policy: LinkCostPolicy,
    /// Portal shrink factor for the funnel. `[Limits: 0..=1]`
    ///
    /// 0 uses full portal edges; larger values pull the string away from
    /// polygon edges toward portal midpoints.
    pub portal_shrink: f32,
    /// Step distance for height re-sampling along walk segments.
    /// `[Limit: > 0] [Units: wu]`
    pub resample_step: f32,
    /// Squared distance below which consecutive output points merge.
    pub dedup_tolerance_squared: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            heuristic_scale: 1.25,
            link_cost_policy: LinkCostPolicy::default(),
            portal_shrink: 0.0,
            resample_step: 2.0,
            dedup_tolerance_squared: 1e-4,
        }
    }
}

/// One point of a found path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    /// World position of the point.
    pub position: Vec3,
    /// How the agent travels from the previous point to this one. The first
    /// point is always [`TravelMode::Walk`].
    pub mode: TravelMode,
}

/// Shortest-path queries over one published mesh.
pub struct PathQuery<'m> {
    published: &'m PublishedMesh,
    search: PolygonSearch<'m>,
    config: QueryConfig,
}

impl<'m> PathQuery<'m> {
    /// Creates a query context over `published`, precomputing polygon
    /// centroids and the per-polygon link table.
    pub fn new(published: &'m PublishedMesh, config: QueryConfig) -> Self {
        let search = PolygonSearch::new(&published.mesh, &published.links);
        Self {
            published,
            search,
            config,
        }
    }

    /// Finds a path from `start` to `end`.
    ///
    /// Returns an ordered point list with travel modes; empty when either
    /// endpoint cannot be mapped onto the mesh. An unreachable `end` yields
    /// the best-effort path toward the polygon closest to it.
    pub fn find_path(&self, start: Vec3, end: Vec3) -> Vec<PathPoint> {
        let mesh = &self.published.mesh;
        let Some((start_polygon, start_point)) =
            self.published.lookup.nearest_polygon(mesh, start)
        else {
            return Vec::new();
        };
        let Some((goal_polygon, goal_point)) = self.published.lookup.nearest_polygon(mesh, end)
        else {
            return Vec::new();
        };

        let corridor = self.search.find_corridor(
            start_polygon,
            goal_polygon,
            goal_point,
            self.config.heuristic_scale,
            self.config.link_cost_policy,
        );
        if corridor.is_empty() {
            return Vec::new();
        }

        // A partial corridor targets the centroid of wherever it ended.
        let last_polygon = corridor.last().map(|s| s.polygon).unwrap_or(start_polygon);
        let target = if last_polygon == goal_polygon {
            goal_point
        } else {
            self.search.centroid(last_polygon)
        };

        let points = self.straighten(&corridor, start_point, target);
        let corridor_polygons: Vec<u32> = corridor.iter().map(|s| s.polygon).collect();
        let fixed = self.fix_heights(points, &corridor_polygons);
        debug!(points = fixed.len(), "found path");
        fixed
    }

    /// Splits the corridor into walk runs at link transitions, funnels each
    /// run, and inserts the links' exact endpoints as non-walk anchors.
    fn straighten(
        &self,
        corridor: &[CorridorStep],
        start_point: Vec3,
        target: Vec3,
    ) -> Vec<PathPoint> {
        let mesh = &self.published.mesh;
        let links = &self.published.links;

        let mut points = vec![PathPoint {
            position: start_point,
            mode: TravelMode::Walk,
        }];
        let mut cursor = start_point;
        let mut run: Vec<u32> = vec![corridor[0].polygon];

        let emit_run = |points: &mut Vec<PathPoint>, run: &[u32], from: Vec3, to: Vec3| {
            let mut portals = Vec::with_capacity(run.len().saturating_sub(1));
            for pair in run.windows(2) {
                if let Some(portal) =
                    portal_between(mesh, pair[0], pair[1], self.config.portal_shrink)
                {
                    portals.push(portal);
                }
            }
            for position in string_pull(from, to, &portals).into_iter().skip(1) {
                points.push(PathPoint {
                    position,
                    mode: TravelMode::Walk,
                });
            }
        };

        for step in &corridor[1..] {
            if let Some(link_index) = step.link {
                let link = &links[link_index as usize];
                let last = *run.last().unwrap_or(&corridor[0].polygon);
                let (near, far) = if link.polygon_a == last {
                    (link.position_a, link.position_b)
                } else {
                    (link.position_b, link.position_a)
                };
                // Walk to the link start, then take the link.
                emit_run(&mut points, &run, cursor, near);
                points.push(PathPoint {
                    position: far,
                    mode: link.mode,
                });
                cursor = far;
                run = vec![step.polygon];
            } else {
                run.push(step.polygon);
            }
        }
        emit_run(&mut points, &run, cursor, target);
        points
    }

    /// Re-samples walk segments at the configured step and projects heights
    /// from the detail mesh. Link anchor points pass through verbatim; the
    /// segment right after a jump is not re-sampled. Near-coincident
    /// consecutive points collapse.
    fn fix_heights(&self, points: Vec<PathPoint>, corridor: &[u32]) -> Vec<PathPoint> {
        let mut cursor =
            CorridorCursor::new(&self.published.mesh, &self.published.detail, corridor);
        let step = self.config.resample_step.max(1e-3);

        let mut out: Vec<PathPoint> = Vec::with_capacity(points.len());
        let push = |out: &mut Vec<PathPoint>, point: PathPoint| {
            if point.mode == TravelMode::Walk
                && let Some(previous) = out.last()
                && previous.position.distance_squared(point.position)
                    < self.config.dedup_tolerance_squared
            {
                return;
            }
            out.push(point);
        };

        for (i, point) in points.iter().enumerate() {
            match point.mode {
                // Link endpoints are exact; keep them untouched.
                TravelMode::Jump | TravelMode::Ladder => out.push(*point),
                TravelMode::Walk => {
                    if i == 0 {
                        push(&mut out, PathPoint {
                            position: cursor.fix(point.position),
                            mode: TravelMode::Walk,
                        });
                        continue;
                    }
                    let previous = points[i - 1];
                    let resample = previous.mode == TravelMode::Walk;
                    if resample {
                        let from = previous.position;
                        let to = point.position;
                        let length = from.distance(to);
                        let mut travelled = step;
                        while travelled < length {
                            let sample = from.lerp(to, travelled / length);
                            push(&mut out, PathPoint {
                                position: cursor.fix(sample),
                                mode: TravelMode::Walk,
                            });
                            travelled += step;
                        }
                    }
                    push(&mut out, PathPoint {
                        position: cursor.fix(point.position),
                        mode: TravelMode::Walk,
                    });
                }
            }
        }
        out
    }
}

/// Hand-built meshes shared by the unit tests of this crate.
#[cfg(test)]
pub(crate) mod test_meshes {
    use glam::Vec3;
    use waymesh::{Link, NavMesh, RegionId, TravelMode};

    /// A strip of `count` 2x2 quads along the x-axis, adjacency rebuilt.
    pub(crate) fn quad_strip_mesh(count: usize) -> NavMesh {
        let mut vertices = Vec::new();
        for i in 0..=count {
            let x = i as f32 * 2.0;
            vertices.push(Vec3::new(x, 0.0, 0.0));
            vertices.push(Vec3::new(x, 2.0, 0.0));
        }
        let mut polygons = Vec::new();
        for i in 0..count as u32 {
            let bottom_left = i * 2;
            // Counterclockwise in XY.
            polygons.extend_from_slice(&[
                bottom_left,
                bottom_left + 2,
                bottom_left + 3,
                bottom_left + 1,
            ]);
        }
        let mut mesh = NavMesh {
            vertices,
            polygons,
            regions: vec![RegionId(1); count],
            neighbors: Vec::new(),
            max_vertices_per_polygon: 4,
        };
        mesh.rebuild_adjacency();
        mesh
    }

    /// Two 2x2 quads with a 2-unit gap, connected only by one jump link.
    pub(crate) fn two_quad_mesh_with_gap() -> (NavMesh, Vec<Link>) {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(6.0, 0.0, 0.0),
            Vec3::new(6.0, 2.0, 0.0),
            Vec3::new(4.0, 2.0, 0.0),
        ];
        let polygons = vec![0, 1, 2, 3, 4, 5, 6, 7];
        let mut mesh = NavMesh {
            vertices,
            polygons,
            regions: vec![RegionId(1), RegionId(2)],
            neighbors: Vec::new(),
            max_vertices_per_polygon: 4,
        };
        mesh.rebuild_adjacency();
        let links = vec![Link {
            polygon_a: 0,
            polygon_b: 1,
            position_a: Vec3::new(2.0, 1.0, 0.0),
            position_b: Vec3::new(4.0, 1.0, 0.0),
            cost: 3.0,
            mode: TravelMode::Jump,
        }];
        (mesh, links)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::Vec3;
    use waymesh::{DetailMesh, PolyLookup, PublishedMesh, TravelMode};

    use super::*;
    use crate::test_meshes::{quad_strip_mesh, two_quad_mesh_with_gap};

    fn publish(mesh: waymesh::NavMesh, links: Vec<waymesh::Link>) -> PublishedMesh {
        let lookup = PolyLookup::build(&mesh, 4.0);
        let mut detail = DetailMesh::default();
        for polygon in 0..mesh.polygon_count() {
            let vertices: Vec<Vec3> = mesh.polygon_vertices(polygon).collect();
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
        PublishedMesh {
            mesh,
            detail,
            links,
            lookup,
        }
    }

    #[test]
    fn straight_corridor_path_is_straight() {
        let published = publish(quad_strip_mesh(5), Vec::new());
        let query = PathQuery::new(&published, QueryConfig::default());

        let start = Vec3::new(0.5, 1.0, 0.0);
        let end = Vec3::new(9.5, 1.0, 0.0);
        let path = query.find_path(start, end);
        assert!(path.len() >= 2);
        assert!(path.iter().all(|p| p.mode == TravelMode::Walk));

        let length: f32 = path
            .windows(2)
            .map(|pair| pair[0].position.distance(pair[1].position))
            .sum();
        assert_relative_eq!(length, start.distance(end), epsilon = 1e-3);
    }

    #[test]
    fn jump_link_appears_as_anchor_points() {
        let (mesh, links) = two_quad_mesh_with_gap();
        let published = publish(mesh, links);
        let query = PathQuery::new(&published, QueryConfig::default());

        let path = query.find_path(Vec3::new(0.5, 1.0, 0.0), Vec3::new(5.5, 1.0, 0.0));
        let jumps: Vec<&PathPoint> = path
            .iter()
            .filter(|p| p.mode == TravelMode::Jump)
            .collect();
        assert_eq!(jumps.len(), 1);
        assert_eq!(jumps[0].position, Vec3::new(4.0, 1.0, 0.0));
        // The point right before the jump anchor is the link's near end.
        let jump_index = path
            .iter()
            .position(|p| p.mode == TravelMode::Jump)
            .unwrap();
        assert_eq!(path[jump_index - 1].position, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn unmappable_endpoints_yield_an_empty_path() {
        let published = publish(quad_strip_mesh(2), Vec::new());
        let query = PathQuery::new(&published, QueryConfig::default());
        let path = query.find_path(Vec3::new(500.0, 500.0, 0.0), Vec3::new(1.0, 1.0, 0.0));
        assert!(path.is_empty());
    }
}
