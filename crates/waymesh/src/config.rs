use crate::math::Aabb3d;
use thiserror::Error;

/// Specifies a configuration to use when building navigation meshes. Usually
/// built using [`NavConfigBuilder`].
///
/// This is an aggregation of parameters used at different stages of the build
/// process; not all parameters are used by every stage. Units are voxels (vx)
/// or world units (wu). Voxel-unit values are derived from `cell_size` and
/// `cell_height`.
///
/// > Note:
/// >
/// > First decide the size of your agent's logical box. If your world uses
/// > meters, a human-sized agent is reasonably approximated by a radius of
/// > 0.4 and a height of 2.0.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavConfig {
    /// The horizontal cell size of the voxel grid. `[Limit: > 0] [Units: wu]`
    ///
    /// Smaller values increase rasterization resolution and navmesh detail,
    /// but total probe count and generation time grow quadratically. A
    /// recommended starting value is `agent_radius / 2`.
    pub cell_size: f32,

    /// The vertical cell size of the voxel grid. `[Limit: > 0] [Units: wu]`
    ///
    /// Defined separately from `cell_size` to allow greater precision in
    /// height tests. A good starting point is half of `cell_size`. If small
    /// holes appear in the mesh around stairs or curbs, decrease this value.
    pub cell_height: f32,

    /// The world-space AABB the mesh is built inside. `[Units: wu]`
    ///
    /// Column scans probe downwards from `aabb.max.z` to `aabb.min.z`.
    pub aabb: Aabb3d,

    /// The maximum surface slope that is considered walkable.
    /// `[Limits: 0 <= value < 0.5*π] [Units: Radians]`
    ///
    /// A floor hit is discarded when the angle between its contact normal and
    /// the up axis exceeds this value. The practical upper limit is usually
    /// around `85.0_f32.to_radians()`.
    pub max_slope: f32,

    /// Minimum floor-to-ceiling clearance for a span to be emitted.
    /// `[Limit: >= 3] [Units: vx]`
    ///
    /// Usually `(agent_height / cell_height).ceil()`.
    pub walkable_height: u16,

    /// Maximum floor height difference two neighboring spans may have and
    /// still count as connected. `[Limit: >= 0] [Units: vx]`
    ///
    /// Lets the mesh flow over curbs and up stairways. Usually
    /// `(agent_max_climb / cell_height).floor()`.
    pub walkable_climb: u16,

    /// The distance to erode the walkable area away from boundaries.
    /// `[Limit: >= 0] [Units: vx]`
    ///
    /// Spans closer than this to a non-traversable boundary are removed, so
    /// at query time it suffices to keep the agent's center on the mesh.
    /// Usually `(agent_radius / cell_size).ceil()`.
    pub walkable_radius: u16,

    /// The maximum allowed length for contour edges along the mesh border.
    /// `[Limit: >= 0] [Units: vx]`
    ///
    /// Longer edges are subdivided by midpoint insertion. Zero disables the
    /// feature.
    pub max_edge_len: u16,

    /// The maximum distance a simplified contour may deviate from the raw
    /// region outline. `[Limit: >= 0] [Units: vx]`
    ///
    /// Good values are in `[1.1, 1.5]`; below 1.1 sawtoothing appears, above
    /// 1.5 corners get cut.
    pub max_simplification_error: f32,

    /// The minimum span count of regions that survive the merge/filter pass.
    /// `[Limit: >= 0] [Units: vx]`
    ///
    /// Useful to remove useless islands that form on table tops, crates, etc.
    pub min_region_area: u16,

    /// Regions with fewer spans than this are merged into a neighbor when
    /// possible. `[Limit: >= 0] [Units: vx]`
    ///
    /// Watershed partitioning is prone to noise; merging keeps the
    /// triangulation from having to deal with unnecessarily small regions.
    pub merge_region_area: u16,

    /// The maximum number of vertices per polygon produced by the convex
    /// merge. `[Limit: >= 3]`
    pub max_vertices_per_polygon: usize,

    /// Grid step between interior height samples of the detail mesh.
    /// `[Limit: >= 1] [Units: vx]`
    pub detail_sample_step: u16,

    /// Width of a tile's core region. `[Limit: > 0] [Units: vx]`
    pub tile_size: u16,

    /// Extra voxels built around each tile's core on every side.
    /// `[Limit: >= 1] [Units: vx]`
    ///
    /// Padding provides walkability and height context at tile edges only;
    /// padded cells never contribute regions or contours.
    pub tile_padding: u16,

    /// Maximum horizontal distance a jump link may cover. `[Units: wu]`
    pub max_jump_distance: f32,

    /// Maximum height difference a jump link may cover. `[Units: wu]`
    pub max_jump_height: f32,

    /// Minimum spacing between jump links connecting the same pair of
    /// islands. `[Units: wu]`
    pub jump_link_spacing: f32,

    /// Height above the floor at which jump arcs are swept. `[Units: wu]`
    pub jump_clearance: f32,

    /// Half-extents of the box swept along candidate jump arcs. `[Units: wu]`
    ///
    /// Usually the agent's collision box.
    pub agent_half_extents: glam::Vec3,
}

impl NavConfig {
    /// Side length of a tile's padded build region in voxels.
    #[inline]
    pub fn padded_tile_size(&self) -> u16 {
        self.tile_size + self.tile_padding * 2
    }
}

/// A builder for [`NavConfig`]. The config has many interdependent voxel-unit
/// values, so this builder derives them from agent dimensions in world units.
/// The default values are reasonable for an agent resembling an adult human
/// in a world measured in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct NavConfigBuilder {
    /// The horizontal cell size of the voxel grid. `[Limit: > 0] [Units: wu]`
    pub cell_size: f32,
    /// The vertical cell size of the voxel grid. `[Limit: > 0] [Units: wu]`
    pub cell_height: f32,
    /// The height of the agent. `[Limit: > 0] [Units: wu]`
    ///
    /// It's often a good idea to add a little padding: an agent that is 1.8
    /// units tall might want 2.0 here.
    pub agent_height: f32,
    /// The radius of the agent. `[Limit: > 0] [Units: wu]`
    pub agent_radius: f32,
    /// The maximum ledge height the agent steps over without jumping.
    /// `[Limit: >= 0] [Units: wu]`
    pub agent_max_climb: f32,
    /// The maximum walkable surface slope. `[Units: Radians]`
    pub agent_max_slope: f32,
    /// Side length of the smallest region kept, before squaring. `[Units: vx]`
    pub region_min_size: f32,
    /// Side length below which regions are merged, before squaring. `[Units: vx]`
    pub region_merge_size: f32,
    /// Maximum border edge length. `[Units: wu]`
    pub edge_max_len: f32,
    /// Maximum contour simplification deviation. `[Units: vx]`
    pub edge_max_error: f32,
    /// Maximum vertices per polygon. `[Limit: >= 3]`
    pub verts_per_poly: usize,
    /// Detail mesh sample step. `[Units: wu]`
    pub detail_sample_step: f32,
    /// Tile core size. `[Units: vx]`
    pub tile_size: u16,
    /// World AABB to build inside. `[Units: wu]`
    pub aabb: Aabb3d,
    /// Maximum horizontal jump distance. `[Units: wu]`
    pub max_jump_distance: f32,
    /// Maximum jump height difference. `[Units: wu]`
    pub max_jump_height: f32,
    /// Minimum spacing between jump links of one island pair. `[Units: wu]`
    pub jump_link_spacing: f32,
}

impl Default for NavConfigBuilder {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0_f32.to_radians(),
            region_min_size: 8.0,
            region_merge_size: 20.0,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            verts_per_poly: 6,
            detail_sample_step: 1.8,
            tile_size: 32,
            aabb: Aabb3d::default(),
            max_jump_distance: 2.5,
            max_jump_height: 1.8,
            jump_link_spacing: 2.0,
        }
    }
}

impl NavConfigBuilder {
    /// Builds a [`NavConfig`] from the current parameters.
    pub fn build(self) -> Result<NavConfig, ConfigError> {
        if self.cell_size <= 0.0 || self.cell_height <= 0.0 {
            return Err(ConfigError::NonPositiveCellSize {
                cell_size: self.cell_size,
                cell_height: self.cell_height,
            });
        }
        if self.verts_per_poly < 3 {
            return Err(ConfigError::TooFewVerticesPerPolygon {
                verts_per_poly: self.verts_per_poly,
            });
        }
        if self.tile_size == 0 {
            return Err(ConfigError::ZeroTileSize);
        }
        let walkable_radius = (self.agent_radius / self.cell_size).ceil() as u16;
        // Reserve enough padding for erosion and neighbor context.
        let tile_padding = walkable_radius + 3;
        Ok(NavConfig {
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            aabb: self.aabb,
            max_slope: self.agent_max_slope,
            walkable_height: (self.agent_height / self.cell_height).ceil() as u16,
            walkable_climb: (self.agent_max_climb / self.cell_height).floor() as u16,
            walkable_radius,
            max_edge_len: (self.edge_max_len / self.cell_size) as u16,
            max_simplification_error: self.edge_max_error,
            min_region_area: (self.region_min_size * self.region_min_size) as u16,
            merge_region_area: (self.region_merge_size * self.region_merge_size) as u16,
            max_vertices_per_polygon: self.verts_per_poly,
            detail_sample_step: ((self.detail_sample_step / self.cell_size) as u16).max(1),
            tile_size: self.tile_size,
            tile_padding,
            max_jump_distance: self.max_jump_distance,
            max_jump_height: self.max_jump_height,
            jump_link_spacing: self.jump_link_spacing,
            jump_clearance: self.agent_max_climb,
            agent_half_extents: glam::Vec3::new(
                self.agent_radius,
                self.agent_radius,
                self.agent_height * 0.5,
            ),
        })
    }
}

/// Errors that can occur when building a [`NavConfig`] with
/// [`NavConfigBuilder::build`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Happens when a cell dimension is zero or negative.
    #[error("cell dimensions must be positive, got cell_size={cell_size}, cell_height={cell_height}")]
    NonPositiveCellSize {
        /// The offending horizontal cell size.
        cell_size: f32,
        /// The offending vertical cell size.
        cell_height: f32,
    },
    /// Happens when fewer than 3 vertices per polygon are requested.
    #[error("polygons need at least 3 vertices, got {verts_per_poly}")]
    TooFewVerticesPerPolygon {
        /// The offending vertex limit.
        verts_per_poly: usize,
    },
    /// Happens when the tile size is zero.
    #[error("tile size must be positive")]
    ZeroTileSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_voxel_units_from_agent_dimensions() {
        let config = NavConfigBuilder::default().build().unwrap();
        assert_eq!(config.walkable_height, 10);
        assert_eq!(config.walkable_climb, 4);
        assert_eq!(config.walkable_radius, 2);
        assert_eq!(config.tile_padding, 5);
        assert_eq!(config.padded_tile_size(), 42);
    }

    #[test]
    fn rejects_degenerate_cell_sizes() {
        let builder = NavConfigBuilder {
            cell_size: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            builder.build(),
            Err(ConfigError::NonPositiveCellSize { .. })
        ));
    }
}
