//! The seam between the navmesh build and the host's solid geometry.
//!
//! The build never inspects world geometry directly. Everything it learns
//! about the world comes through [`SolidProbe`] (vertical probes during
//! voxelization, swept boxes during jump-link validation) and
//! [`MarkerSource`] (named marker enumeration for ladder endpoints and
//! reachability seeds). Hosts back these with a static mesh, a physics
//! engine, or a test double.

use glam::Vec3;

/// Result of a successful downward probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeHit {
    /// Height of the surface that was hit.
    pub z: f32,
    /// Contact normal of the surface. Unit length, pointing away from the solid.
    pub normal: Vec3,
}

/// Blocking, synchronous access to the host's solid geometry.
pub trait SolidProbe {
    /// Casts a vertical probe downwards from `(x, y, z_top)` to `(x, y, z_bottom)`.
    ///
    /// Returns the first downward-facing surface hit, or `None` if the probe
    /// reaches `z_bottom` without hitting anything. A miss is normal control
    /// flow: void space simply has no floor.
    fn probe_down(&self, x: f32, y: f32, z_top: f32, z_bottom: f32) -> Option<ProbeHit>;

    /// Casts a vertical probe upwards from `(x, y, z_from)` to `(x, y, z_top)`.
    ///
    /// Returns the height of the first ceiling hit, or `None` if the probe
    /// reaches `z_top` unobstructed.
    fn probe_up(&self, x: f32, y: f32, z_from: f32, z_top: f32) -> Option<f32>;

    /// Sweeps an axis-aligned box with local extents `mins..maxs` from
    /// `start` to `end`. Returns `true` if the sweep hits any solid.
    fn sweep_box(&self, mins: Vec3, maxs: Vec3, start: Vec3, end: Vec3) -> bool;
}

/// A named point marker placed in the world by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// The full marker name, including its prefix.
    pub name: String,
    /// World position of the marker.
    pub position: Vec3,
}

/// Enumeration of host-placed markers.
pub trait MarkerSource {
    /// Returns all markers whose name starts with `prefix`.
    fn markers_by_prefix(&self, prefix: &str) -> Vec<Marker>;
}

/// Marker prefix for ladder endpoint pairs. The part of the name after the
/// prefix is the group tag; each tag must name exactly two markers.
pub const LADDER_MARKER_PREFIX: &str = "ladder_";

/// Marker prefix for reachability-pruning seed points.
pub const SEED_MARKER_PREFIX: &str = "nav_seed";

/// A [`MarkerSource`] with no markers. Ladder links are skipped and
/// reachability pruning becomes a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMarkers;

impl MarkerSource for NoMarkers {
    fn markers_by_prefix(&self, _prefix: &str) -> Vec<Marker> {
        Vec::new()
    }
}
