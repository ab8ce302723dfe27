//! A synthetic box world implementing the waymesh probe interface, so the
//! full build-then-query flow runs without an engine.
#![allow(dead_code)]

use glam::Vec3;
use waymesh::{Aabb3d, Marker, MarkerSource, ProbeHit, SolidProbe};

/// Solid geometry made of axis-aligned boxes.
pub struct BoxWorld {
    solids: Vec<Aabb3d>,
}

impl BoxWorld {
    pub fn new(solids: Vec<Aabb3d>) -> Self {
        Self { solids }
    }

    fn contains_xy(aabb: &Aabb3d, x: f32, y: f32) -> bool {
        x >= aabb.min.x && x <= aabb.max.x && y >= aabb.min.y && y <= aabb.max.y
    }

    fn overlaps_strictly(a_min: Vec3, a_max: Vec3, b: &Aabb3d) -> bool {
        a_min.x < b.max.x
            && b.min.x < a_max.x
            && a_min.y < b.max.y
            && b.min.y < a_max.y
            && a_min.z < b.max.z
            && b.min.z < a_max.z
    }
}

impl SolidProbe for BoxWorld {
    fn probe_down(&self, x: f32, y: f32, z_top: f32, z_bottom: f32) -> Option<ProbeHit> {
        self.solids
            .iter()
            .filter(|solid| {
                Self::contains_xy(solid, x, y)
                    && solid.max.z <= z_top
                    && solid.max.z >= z_bottom
            })
            .map(|solid| solid.max.z)
            .max_by(f32::total_cmp)
            .map(|z| ProbeHit { z, normal: Vec3::Z })
    }

    fn probe_up(&self, x: f32, y: f32, z_from: f32, z_top: f32) -> Option<f32> {
        self.solids
            .iter()
            .filter(|solid| {
                Self::contains_xy(solid, x, y)
                    && solid.min.z >= z_from
                    && solid.min.z <= z_top
            })
            .map(|solid| solid.min.z)
            .min_by(f32::total_cmp)
    }

    fn sweep_box(&self, mins: Vec3, maxs: Vec3, start: Vec3, end: Vec3) -> bool {
        const STEPS: usize = 64;
        for step in 0..=STEPS {
            let center = start.lerp(end, step as f32 / STEPS as f32);
            if self
                .solids
                .iter()
                .any(|solid| Self::overlaps_strictly(center + mins, center + maxs, solid))
            {
                return true;
            }
        }
        false
    }
}

/// A fixed list of markers behind the [`MarkerSource`] interface.
pub struct FixedMarkers(pub Vec<Marker>);

impl MarkerSource for FixedMarkers {
    fn markers_by_prefix(&self, prefix: &str) -> Vec<Marker> {
        self.0
            .iter()
            .filter(|marker| marker.name.starts_with(prefix))
            .cloned()
            .collect()
    }
}
