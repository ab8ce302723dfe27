use glam::{IVec2, Vec2, Vec3, Vec3Swizzles as _};

/// A 3D axis-aligned bounding box in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner of the AABB
    pub min: Vec3,
    /// The maximum corner of the AABB
    pub max: Vec3,
}

impl Aabb3d {
    /// Creates an AABB from its corners.
    #[inline]
    pub fn new(min: impl Into<Vec3>, max: impl Into<Vec3>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// The smallest AABB containing both `self` and `other`.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grows the AABB by `amount` in all directions.
    #[inline]
    pub fn expand(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// Whether the AABBs overlap, boundary included.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// The center point of the AABB.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Gets the standard x-axis offset for the specified direction.
/// Directions cycle counterclockwise: `0` = -x, `1` = +y, `2` = +x, `3` = -y.
#[inline]
pub(crate) fn dir_offset_x(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard y-axis offset for the specified direction.
#[inline]
pub(crate) fn dir_offset_y(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

/// Index of the next vertex in a closed loop of length `n`.
#[inline]
pub(crate) fn next(i: usize, n: usize) -> usize {
    if i + 1 < n { i + 1 } else { 0 }
}

/// Index of the previous vertex in a closed loop of length `n`.
#[inline]
pub(crate) fn prev(i: usize, n: usize) -> usize {
    if i > 0 { i - 1 } else { n - 1 }
}

/// Twice the signed area of the triangle `(a, b, c)` on the grid plane.
/// Positive when `c` lies to the left of the directed line `a -> b`.
#[inline]
pub(crate) fn area2(a: IVec2, b: IVec2, c: IVec2) -> i64 {
    let ab = (b - a).as_i64vec2();
    let ac = (c - a).as_i64vec2();
    ab.x * ac.y - ac.x * ab.y
}

#[inline]
pub(crate) fn left(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) > 0
}

#[inline]
pub(crate) fn left_on(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) >= 0
}

#[inline]
pub(crate) fn collinear(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) == 0
}

/// Whether the segments `a-b` and `c-d` properly intersect: they cross at a
/// point interior to both. Shared endpoints do not count.
pub(crate) fn intersects_properly(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    // Eliminate the improper cases first.
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// Whether `c` lies on the closed segment `a-b`.
pub(crate) fn between(a: IVec2, b: IVec2, c: IVec2) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.y <= c.y && c.y <= b.y) || (a.y >= c.y && c.y >= b.y)
    }
}

/// Whether the segments `a-b` and `c-d` intersect, properly or improperly.
pub(crate) fn intersects(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    intersects_properly(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

/// Squared distance from `point` to the segment `a-b` on the grid plane.
pub(crate) fn dist_sq_point_segment_2d(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let ap = point - a;
    let denom = ab.length_squared();
    let t = if denom > f32::EPSILON {
        (ap.dot(ab) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (a + ab * t - point).length_squared()
}

/// Closest points between the segments `a0-a1` and `b0-b1`, computed on the
/// horizontal plane with heights carried along by the same parameters.
///
/// Returns `(point_on_a, point_on_b)`.
pub(crate) fn closest_points_between_segments(
    a0: Vec3,
    a1: Vec3,
    b0: Vec3,
    b1: Vec3,
) -> (Vec3, Vec3) {
    let d1 = (a1 - a0).xy();
    let d2 = (b1 - b0).xy();
    let r = (a0 - b0).xy();
    let len1 = d1.length_squared();
    let len2 = d2.length_squared();
    let f = d2.dot(r);

    let (s, t);
    if len1 <= f32::EPSILON && len2 <= f32::EPSILON {
        // Both segments degenerate to points.
        s = 0.0;
        t = 0.0;
    } else if len1 <= f32::EPSILON {
        s = 0.0;
        t = (f / len2).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(r);
        if len2 <= f32::EPSILON {
            t = 0.0;
            s = (-c / len1).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(d2);
            let denom = len1 * len2 - b * b;
            let mut s_tmp = if denom > f32::EPSILON {
                ((b * f - c * len2) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t_tmp = (b * s_tmp + f) / len2;
            // Clamp t and recompute s for the clamped value.
            if t_tmp < 0.0 {
                t_tmp = 0.0;
                s_tmp = (-c / len1).clamp(0.0, 1.0);
            } else if t_tmp > 1.0 {
                t_tmp = 1.0;
                s_tmp = ((b - c) / len1).clamp(0.0, 1.0);
            }
            s = s_tmp;
            t = t_tmp;
        }
    }
    (a0 + (a1 - a0) * s, b0 + (b1 - b0) * t)
}

/// Whether `point` lies inside the convex or concave polygon `vertices`,
/// projected onto the horizontal plane. Boundary points count as inside.
pub(crate) fn point_in_polygon_2d(point: Vec2, vertices: &[Vec3]) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let vi = vertices[i].xy();
        let vj = vertices[j].xy();
        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
