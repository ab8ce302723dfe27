//! Non-fatal build diagnostics.

/// Counters for recoverable failures encountered during a build.
///
/// None of these abort the build: the offending contour, hole, polygon or
/// marker group is skipped and the rest of the tile is produced normally.
/// Callers that want to surface data problems to content authors should
/// inspect the report after building; each increment is also logged via
/// [`tracing::warn!`] at the failure site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Contours rejected as degenerate (fewer than 3 distinct vertices or
    /// near-zero signed area) after simplification.
    pub degenerate_contours: u32,
    /// Holes that could not be bridged into their outer contour without
    /// crossing an existing edge.
    pub unmerged_holes: u32,
    /// Contour loops that ear-clip triangulation failed to consume.
    pub failed_triangulations: u32,
    /// Ladder marker groups with a point count other than 2.
    pub bad_ladder_groups: u32,
    /// Ladder marker groups whose endpoints could not be snapped to any
    /// polygon.
    pub unsnapped_ladders: u32,
}

impl BuildReport {
    /// Whether any recoverable failure was recorded.
    pub fn any(&self) -> bool {
        *self != Self::default()
    }

    /// Folds another report into this one.
    pub fn absorb(&mut self, other: &BuildReport) {
        self.degenerate_contours += other.degenerate_contours;
        self.unmerged_holes += other.unmerged_holes;
        self.failed_triangulations += other.failed_triangulations;
        self.bad_ladder_groups += other.bad_ladder_groups;
        self.unsnapped_ladders += other.unsnapped_ladders;
    }
}
