//! Funnel (string-pull) smoothing of a polygon corridor.
//!
//! Shared-edge portals between consecutive corridor polygons are walked with
//! the classic apex/left/right funnel: a corner is emitted whenever the
//! funnel closes on one side, and the walk backtracks to the new apex and
//! continues. The result is the tightest polyline through the portal
//! sequence; it is a local, edge-monotonic approximation, not a global
//! optimum.

use glam::{Vec3, Vec3Swizzles as _};
use waymesh::NavMesh;

/// Twice the signed area of `(a, b, c)` projected onto the horizontal plane.
/// Positive when `c` lies left of `a -> b`.
#[inline]
fn tri_area(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    (b.xy() - a.xy()).perp_dot(c.xy() - a.xy())
}

#[inline]
fn nearly_equal(a: Vec3, b: Vec3) -> bool {
    a.xy().distance_squared(b.xy()) < 1e-9
}

/// The shared-edge portal crossed when walking `from -> to`, as a
/// `(left, right)` pair relative to the travel direction, optionally shrunk
/// toward the portal midpoint by `shrink` (0 = full edge, 1 = midpoint).
///
/// Orientation uses the polygon-centroid winding test: the edge endpoints
/// are ordered by which side of the edge the current polygon's centroid
/// falls on. `None` when the polygons share no edge.
pub(crate) fn portal_between(
    mesh: &NavMesh,
    from: u32,
    to: u32,
    shrink: f32,
) -> Option<(Vec3, Vec3)> {
    let count = mesh.polygon_vertex_count(from as usize);
    let mut edge_slot = None;
    for edge in 0..count {
        if mesh.edge_neighbors(from as usize, edge).contains(&to) {
            edge_slot = Some(edge);
            break;
        }
    }
    let (a, b) = mesh.edge_vertices(from as usize, edge_slot?);

    let centroid = mesh.centroid(from as usize);
    // Interior on the left of a -> b means travel goes right: left = b.
    let (left, right) = if tri_area(a, b, centroid) > 0.0 {
        (b, a)
    } else {
        (a, b)
    };

    let shrink = shrink.clamp(0.0, 1.0);
    let midpoint = (left + right) * 0.5;
    Some((left.lerp(midpoint, shrink), right.lerp(midpoint, shrink)))
}

/// Pulls the string from `start` to `end` through `portals`.
///
/// Returns the straightened polyline including both endpoints.
pub(crate) fn string_pull(start: Vec3, end: Vec3, portals: &[(Vec3, Vec3)]) -> Vec<Vec3> {
    let mut augmented = Vec::with_capacity(portals.len() + 2);
    augmented.push((start, start));
    augmented.extend_from_slice(portals);
    augmented.push((end, end));

    let mut points = vec![start];
    let mut apex = start;
    let mut left = start;
    let mut right = start;
    let mut left_index = 0_usize;
    let mut right_index = 0_usize;

    let mut i = 1;
    while i < augmented.len() {
        let (portal_left, portal_right) = augmented[i];

        // Tighten the right boundary.
        if tri_area(apex, right, portal_right) >= 0.0 {
            if nearly_equal(apex, right) || tri_area(apex, left, portal_right) <= 0.0 {
                right = portal_right;
                right_index = i;
            } else {
                // Right crossed over left: the left corner becomes the apex,
                // backtrack and continue from there.
                points.push(left);
                apex = left;
                let apex_index = left_index;
                left = apex;
                right = apex;
                left_index = apex_index;
                right_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }

        // Tighten the left boundary.
        if tri_area(apex, left, portal_left) <= 0.0 {
            if nearly_equal(apex, left) || tri_area(apex, right, portal_left) >= 0.0 {
                left = portal_left;
                left_index = i;
            } else {
                points.push(right);
                apex = right;
                let apex_index = right_index;
                left = apex;
                right = apex;
                left_index = apex_index;
                right_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }
        i += 1;
    }
    points.push(end);
    points
}

/// Length of a polyline projected onto the horizontal plane.
#[cfg(test)]
fn path_length_2d(points: &[Vec3]) -> f32 {
    points
        .windows(2)
        .map(|pair| pair[0].xy().distance(pair[1].xy()))
        .sum()
}
