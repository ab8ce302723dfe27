//! Watershed partitioning of the walkable surface into regions.
//!
//! Flood-fill segmentation driven by the distance-to-boundary field,
//! processed from high to low distance in bands of width 2. Each band first
//! attaches spans bordering already-assigned regions (BFS), then seeds new
//! regions from whatever is left (DFS), approximating priority-ordered
//! watershed growing without a priority queue. Small regions are merged into
//! their dominant neighbor and leftovers below the minimum area are dropped.

use std::collections::VecDeque;

use tracing::debug;

use crate::span_field::SpanField;

/// Id of the region a span belongs to. Regions are not materialized as
/// objects; a region is the set of spans sharing a positive id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionId(pub u16);

impl RegionId {
    /// Not walkable or not assigned to any region.
    pub const NONE: Self = Self(0);

    /// Whether this id names an actual region.
    #[inline]
    pub fn is_some(&self) -> bool {
        *self != Self::NONE
    }
}

impl SpanField {
    /// Computes the raw boundary distance field and segments all walkable
    /// spans into regions.
    ///
    /// Afterwards every walkable span in the core carries a region id, every
    /// surviving region has at least `min_region_area` spans, and
    /// [`SpanField::max_region`] holds the highest id in use.
    pub fn build_regions(&mut self, min_region_area: u16, merge_region_area: u16) {
        self.build_distance_field();
        let smooth = self.smooth_distances();

        let span_count = self.spans.len();
        self.regions = vec![RegionId::NONE; span_count];
        let mut next_region = 1_u16;

        // Cell coordinates per span, for neighbor walks without re-deriving.
        let coords = self.span_coordinates();

        let max_band = smooth.iter().copied().max().unwrap_or(0) >> 1;
        let mut members: Vec<usize> = Vec::new();
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut stack: Vec<usize> = Vec::new();

        for band in (0..=max_band).rev() {
            members.clear();
            members.extend((0..span_count).filter(|&i| {
                self.areas[i].is_walkable()
                    && self.regions[i] == RegionId::NONE
                    && smooth[i] >> 1 == band
            }));

            // (a) Attach spans bordering an assigned region to the
            // highest-distance neighboring region, and let those grow first.
            queue.clear();
            for &i in &members {
                let mut best: Option<(RegionId, u16)> = None;
                self.for_each_neighbor(i, &coords, |neighbor| {
                    let region = self.regions[neighbor];
                    if region.is_some()
                        && best.is_none_or(|(_, d)| smooth[neighbor] > d)
                    {
                        best = Some((region, smooth[neighbor]));
                    }
                });
                if let Some((region, _)) = best {
                    self.regions[i] = region;
                    queue.push_back(i);
                }
            }
            while let Some(i) = queue.pop_front() {
                let region = self.regions[i];
                let mut grown = Vec::new();
                self.for_each_neighbor(i, &coords, |neighbor| {
                    if self.regions[neighbor] == RegionId::NONE
                        && self.areas[neighbor].is_walkable()
                        && smooth[neighbor] >> 1 == band
                    {
                        grown.push(neighbor);
                    }
                });
                for neighbor in grown {
                    if self.regions[neighbor] == RegionId::NONE {
                        self.regions[neighbor] = region;
                        queue.push_back(neighbor);
                    }
                }
            }

            // (c) Whatever is still unassigned in this band seeds a brand-new
            // region, flooded depth-first within the band.
            for &i in &members {
                if self.regions[i] != RegionId::NONE {
                    continue;
                }
                let region = RegionId(next_region);
                next_region += 1;
                self.regions[i] = region;
                stack.clear();
                stack.push(i);
                while let Some(current) = stack.pop() {
                    let mut grown = Vec::new();
                    self.for_each_neighbor(current, &coords, |neighbor| {
                        if self.regions[neighbor] == RegionId::NONE
                            && self.areas[neighbor].is_walkable()
                            && smooth[neighbor] >> 1 == band
                        {
                            grown.push(neighbor);
                        }
                    });
                    for neighbor in grown {
                        if self.regions[neighbor] == RegionId::NONE {
                            self.regions[neighbor] = region;
                            stack.push(neighbor);
                        }
                    }
                }
            }
        }

        self.merge_and_filter_regions(min_region_area, merge_region_area, &coords);
        debug!(
            regions = self.max_region.0,
            max_distance = self.max_distance,
            "built regions"
        );
    }

    /// Computes the raw distance-to-boundary value of every span into
    /// [`SpanField::dist`] and updates [`SpanField::max_distance`].
    fn build_distance_field(&mut self) {
        let mut distance = vec![u16::MAX; self.spans.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    if !self.areas[i].is_walkable() {
                        distance[i] = 0;
                        continue;
                    }
                    let span = &self.spans[i];
                    let mut neighbor_count = 0;
                    for dir in 0..4 {
                        let Some(con) = span.con(dir) else {
                            break;
                        };
                        let (_, _, neighbor) = self.con_indices(x as i32, y as i32, dir, con);
                        if !self.areas[neighbor].is_walkable() {
                            break;
                        }
                        neighbor_count += 1;
                    }
                    if neighbor_count != 4 {
                        distance[i] = 0;
                    }
                }
            }
        }
        self.relax_distances(&mut distance);
        self.max_distance = distance
            .iter()
            .copied()
            .filter(|d| *d != u16::MAX)
            .max()
            .unwrap_or(0);
        // Isolated spans never got relaxed; treat them as boundary.
        for d in &mut distance {
            if *d == u16::MAX {
                *d = 0;
            }
        }
        self.dist = distance;
    }

    /// Denoises the raw distance field: every span's value becomes the
    /// average over itself and its 8 neighbors (4 straight, 4 diagonal),
    /// substituting the span's own value where a neighbor is absent.
    fn smooth_distances(&self) -> Vec<u16> {
        let mut smooth = vec![0_u16; self.spans.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    let own = self.dist[i] as u32;
                    let mut sum = own;
                    for dir in 0..4_u8 {
                        let Some(con) = self.spans[i].con(dir) else {
                            // Straight and diagonal neighbor both absent.
                            sum += own * 2;
                            continue;
                        };
                        let (nx, ny, neighbor) = self.con_indices(x as i32, y as i32, dir, con);
                        sum += self.dist[neighbor] as u32;
                        // Diagonal through the straight neighbor.
                        let diagonal_dir = (dir + 1) & 0x3;
                        if let Some(diagonal_con) = self.spans[neighbor].con(diagonal_dir) {
                            let (_, _, diagonal) =
                                self.con_indices(nx, ny, diagonal_dir, diagonal_con);
                            sum += self.dist[diagonal] as u32;
                        } else {
                            sum += own;
                        }
                    }
                    smooth[i] = (sum / 9) as u16;
                }
            }
        }
        smooth
    }

    /// Absorbs regions below `merge_region_area` into the neighbor sharing
    /// the most boundary spans, then drops regions still below
    /// `min_region_area` and compacts the surviving ids.
    fn merge_and_filter_regions(
        &mut self,
        min_region_area: u16,
        merge_region_area: u16,
        coords: &[(u16, u16)],
    ) {
        loop {
            let (areas, shared) = self.region_statistics(coords);
            // First-encountered small region with a neighbor wins the merge;
            // ties on shared-boundary count also break on first encountered.
            let mut merge: Option<(u16, u16)> = None;
            for (region, &area) in areas.iter().enumerate().skip(1) {
                if area == 0 || area >= merge_region_area as usize {
                    continue;
                }
                let mut best: Option<(u16, usize)> = None;
                let mut pairs: Vec<_> = shared.iter().collect();
                pairs.sort_by_key(|(key, _)| **key);
                for (&(a, b), &count) in pairs {
                    let other = if a == region as u16 {
                        b
                    } else if b == region as u16 {
                        a
                    } else {
                        continue;
                    };
                    if best.is_none_or(|(_, c)| count > c) {
                        best = Some((other, count));
                    }
                }
                if let Some((target, _)) = best {
                    merge = Some((region as u16, target));
                    break;
                }
            }
            let Some((from, into)) = merge else {
                break;
            };
            for region in &mut self.regions {
                if region.0 == from {
                    region.0 = into;
                }
            }
        }

        // Drop regions that stayed too small, then compact the id space.
        let (areas, _) = self.region_statistics(coords);
        let mut remap = vec![0_u16; areas.len()];
        let mut next = 0_u16;
        for (region, &area) in areas.iter().enumerate().skip(1) {
            if area >= min_region_area as usize {
                next += 1;
                remap[region] = next;
            }
        }
        for region in &mut self.regions {
            region.0 = remap[region.0 as usize];
        }
        self.max_region = RegionId(next);
    }

    /// Span count per region and shared-boundary span counts per region pair
    /// (keyed with the smaller id first).
    fn region_statistics(
        &self,
        coords: &[(u16, u16)],
    ) -> (Vec<usize>, std::collections::HashMap<(u16, u16), usize>) {
        let max_region = self
            .regions
            .iter()
            .map(|r| r.0)
            .max()
            .unwrap_or(0) as usize;
        let mut areas = vec![0_usize; max_region + 1];
        let mut shared = std::collections::HashMap::new();
        for (i, region) in self.regions.iter().enumerate() {
            if !region.is_some() {
                continue;
            }
            areas[region.0 as usize] += 1;
            self.for_each_neighbor(i, coords, |neighbor| {
                let other = self.regions[neighbor];
                if other.is_some() && other != *region {
                    let key = (region.0.min(other.0), region.0.max(other.0));
                    *shared.entry(key).or_insert(0) += 1;
                }
            });
        }
        (areas, shared)
    }

    /// Grid coordinates of every span, in span-index order.
    pub(crate) fn span_coordinates(&self) -> Vec<(u16, u16)> {
        let mut coords = vec![(0_u16, 0_u16); self.spans.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, y);
                for i in cell.index_range() {
                    coords[i] = (x, y);
                }
            }
        }
        coords
    }

    #[inline]
    fn for_each_neighbor(
        &self,
        span_index: usize,
        coords: &[(u16, u16)],
        mut f: impl FnMut(usize),
    ) {
        let (x, y) = coords[span_index];
        let span = &self.spans[span_index];
        for dir in 0..4_u8 {
            let Some(con) = span.con(dir) else {
                continue;
            };
            let (_, _, neighbor) = self.con_indices(x as i32, y as i32, dir, con);
            f(neighbor);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::{
        config::NavConfigBuilder,
        heightfield::{HeightfieldBuilder, SpanInsertion},
        math::Aabb3d,
        region::RegionId,
        span::SpanBuilder,
        span_field::SpanField,
    };

    #[test]
    fn flat_plate_becomes_one_region() {
        let aabb = Aabb3d::new(Vec3::ZERO, Vec3::new(16.0, 16.0, 51.2));
        let config = NavConfigBuilder {
            cell_size: 1.0,
            cell_height: 0.2,
            aabb,
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
        for y in 0..heightfield.height {
            for x in 0..heightfield.width {
                heightfield
                    .add_span(SpanInsertion {
                        x,
                        y,
                        span: SpanBuilder {
                            floor: 5,
                            ceiling: 250,
                            next: None,
                        }
                        .build(),
                    })
                    .unwrap();
            }
        }
        let mut field = SpanField::from_heightfield(&heightfield, &config).unwrap();
        field.build_regions(4, 100);

        assert_eq!(field.max_region, RegionId(1));
        for (i, region) in field.regions.iter().enumerate() {
            assert_eq!(
                region.is_some(),
                field.areas[i].is_walkable(),
                "walkable spans and regions must coincide"
            );
        }
    }

    #[test]
    fn disconnected_plates_get_distinct_regions() {
        let aabb = Aabb3d::new(Vec3::ZERO, Vec3::new(20.0, 8.0, 51.2));
        let config = NavConfigBuilder {
            cell_size: 1.0,
            cell_height: 0.2,
            aabb,
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
        // Two 8x8 plates with a 4-cell gap between them.
        for y in 0..8_u16 {
            for x in (0..8_u16).chain(12..20) {
                heightfield
                    .add_span(SpanInsertion {
                        x,
                        y,
                        span: SpanBuilder {
                            floor: 5,
                            ceiling: 250,
                            next: None,
                        }
                        .build(),
                    })
                    .unwrap();
            }
        }
        let mut field = SpanField::from_heightfield(&heightfield, &config).unwrap();
        field.build_regions(4, 10);

        assert_eq!(field.max_region, RegionId(2));
        // Spans on opposite plates must not share a region.
        let coords = field.span_coordinates();
        let mut left = None;
        let mut right = None;
        for (i, &(x, _)) in coords.iter().enumerate() {
            if field.regions[i].is_some() {
                if x < 8 {
                    left = Some(field.regions[i]);
                } else {
                    right = Some(field.regions[i]);
                }
            }
        }
        assert_ne!(left.unwrap(), right.unwrap());
    }
}
