//! A* search over the polygon graph.
//!
//! Edges are mesh adjacency (cost = centroid distance) plus links, reachable
//! from either endpoint with the configured cost policy. The heuristic is
//! deliberately inadmissible (scaled centroid distance) for speed; when the
//! open set drains before the goal is reached the search degrades to the
//! best-effort path towards the node closest to the goal ever seen.

use std::collections::HashMap;

use glam::Vec3;
use tracing::trace;
use waymesh::{Link, NavMesh};

use crate::{LinkCostPolicy, heap::MinHeap};

/// One step of a polygon corridor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorridorStep {
    /// The polygon entered at this step.
    pub polygon: u32,
    /// The link traversed to enter it, if any; `None` means plain adjacency.
    pub link: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Unvisited,
    Open,
    Closed,
}

/// The polygon search over one published mesh.
pub(crate) struct PolygonSearch<'m> {
    mesh: &'m NavMesh,
    links: &'m [Link],
    centroids: Vec<Vec3>,
    /// Link indices reachable from each polygon (either endpoint).
    links_of: HashMap<u32, Vec<u32>>,
}

impl<'m> PolygonSearch<'m> {
    pub(crate) fn new(mesh: &'m NavMesh, links: &'m [Link]) -> Self {
        let centroids = (0..mesh.polygon_count())
            .map(|polygon| mesh.centroid(polygon))
            .collect();
        let mut links_of: HashMap<u32, Vec<u32>> = HashMap::new();
        for (index, link) in links.iter().enumerate() {
            links_of
                .entry(link.polygon_a)
                .or_default()
                .push(index as u32);
            if link.polygon_b != link.polygon_a {
                links_of
                    .entry(link.polygon_b)
                    .or_default()
                    .push(index as u32);
            }
        }
        Self {
            mesh,
            links,
            centroids,
            links_of,
        }
    }

    pub(crate) fn centroid(&self, polygon: u32) -> Vec3 {
        self.centroids[polygon as usize]
    }

    /// Finds a polygon corridor from `start` to `goal`.
    ///
    /// Always returns a corridor starting at `start`: if the goal cannot be
    /// reached the corridor leads to the node with the smallest heuristic
    /// value seen. The first step always has `link: None`.
    pub(crate) fn find_corridor(
        &self,
        start: u32,
        goal: u32,
        goal_point: Vec3,
        heuristic_scale: f32,
        link_cost_policy: LinkCostPolicy,
    ) -> Vec<CorridorStep> {
        let polygon_count = self.mesh.polygon_count();
        if start as usize >= polygon_count || goal as usize >= polygon_count {
            return Vec::new();
        }
        if start == goal {
            return vec![CorridorStep {
                polygon: start,
                link: None,
            }];
        }

        let heuristic =
            |polygon: u32| self.centroids[polygon as usize].distance(goal_point) * heuristic_scale;

        let mut g = vec![f32::MAX; polygon_count];
        let mut status = vec![NodeStatus::Unvisited; polygon_count];
        let mut parent: Vec<u32> = vec![u32::MAX; polygon_count];
        let mut parent_link: Vec<u32> = vec![u32::MAX; polygon_count];
        let mut heap = MinHeap::new(polygon_count);

        g[start as usize] = 0.0;
        status[start as usize] = NodeStatus::Open;
        heap.push_or_update(start, heuristic(start));

        let mut best_node = start;
        let mut best_h = heuristic(start);

        while let Some(current) = heap.pop() {
            status[current as usize] = NodeStatus::Closed;
            if current == goal {
                best_node = goal;
                break;
            }
            let h = heuristic(current);
            if h < best_h {
                best_h = h;
                best_node = current;
            }

            let mut relax = |neighbor: u32,
                             cost: f32,
                             link: Option<u32>,
                             g: &mut Vec<f32>,
                             status: &mut Vec<NodeStatus>,
                             heap: &mut MinHeap| {
                if status[neighbor as usize] == NodeStatus::Closed {
                    return;
                }
                let tentative = g[current as usize] + cost;
                if tentative < g[neighbor as usize] {
                    g[neighbor as usize] = tentative;
                    parent[neighbor as usize] = current;
                    parent_link[neighbor as usize] = link.unwrap_or(u32::MAX);
                    status[neighbor as usize] = NodeStatus::Open;
                    heap.push_or_update(neighbor, tentative + heuristic(neighbor));
                }
            };

            // Mesh adjacency.
            let vertex_count = self.mesh.polygon_vertex_count(current as usize);
            for edge in 0..vertex_count {
                for &neighbor in self.mesh.edge_neighbors(current as usize, edge) {
                    let cost = self.centroids[current as usize]
                        .distance(self.centroids[neighbor as usize]);
                    relax(neighbor, cost, None, &mut g, &mut status, &mut heap);
                }
            }
            // Links, from either endpoint.
            if let Some(link_ids) = self.links_of.get(&current) {
                for &link_id in link_ids {
                    let link = &self.links[link_id as usize];
                    let neighbor = if link.polygon_a == current {
                        link.polygon_b
                    } else {
                        link.polygon_a
                    };
                    let cost = match link_cost_policy {
                        LinkCostPolicy::Linear => link.cost,
                        LinkCostPolicy::Squared => link.cost * link.cost,
                    };
                    relax(
                        neighbor,
                        cost,
                        Some(link_id),
                        &mut g,
                        &mut status,
                        &mut heap,
                    );
                }
            }
        }

        // Walk the parents back from the best node reached.
        let mut corridor = Vec::new();
        let mut node = best_node;
        loop {
            let link = parent_link[node as usize];
            corridor.push(CorridorStep {
                polygon: node,
                link: (link != u32::MAX).then_some(link),
            });
            if node == start {
                break;
            }
            node = parent[node as usize];
            if node == u32::MAX {
                // Unreached best node; should not happen, bail out safely.
                return Vec::new();
            }
        }
        corridor.reverse();
        // The first step is the start polygon and is never link-entered.
        if let Some(first) = corridor.first_mut() {
            first.link = None;
        }
        trace!(steps = corridor.len(), "polygon corridor found");
        corridor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes::{quad_strip_mesh, two_quad_mesh_with_gap};
    use waymesh::TravelMode;

    #[test]
    fn corridor_crosses_the_shared_edge() {
        let mesh = quad_strip_mesh(2);
        let search = PolygonSearch::new(&mesh, &[]);
        let corridor = search.find_corridor(
            0,
            1,
            search.centroid(1),
            1.25,
            LinkCostPolicy::Linear,
        );
        assert_eq!(
            corridor.iter().map(|s| s.polygon).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(corridor.iter().all(|s| s.link.is_none()));
    }

    #[test]
    fn unreachable_goal_yields_best_effort_corridor() {
        let (mesh, _) = two_quad_mesh_with_gap();
        let search = PolygonSearch::new(&mesh, &[]);
        // No links: polygon 1 is unreachable, so the corridor stays on the
        // start polygon (the closest node seen).
        let corridor = search.find_corridor(
            0,
            1,
            search.centroid(1),
            1.25,
            LinkCostPolicy::Linear,
        );
        assert_eq!(corridor.len(), 1);
        assert_eq!(corridor[0].polygon, 0);
    }

    #[test]
    fn links_connect_disconnected_polygons() {
        let (mesh, links) = two_quad_mesh_with_gap();
        let search = PolygonSearch::new(&mesh, &links);
        let corridor = search.find_corridor(
            0,
            1,
            search.centroid(1),
            1.25,
            LinkCostPolicy::Linear,
        );
        assert_eq!(corridor.len(), 2);
        assert_eq!(corridor[1].link, Some(0));
        assert_eq!(links[0].mode, TravelMode::Jump);
    }
}
