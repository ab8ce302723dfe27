//! Build-then-query scenarios: the full pipeline feeding the pathfinder.

mod common;

use anyhow::Result;
use approx::assert_relative_eq;
use common::BoxWorld;
use glam::Vec3;
use waymesh::{Aabb3d, NavConfigBuilder, NoMarkers, TileNavigator, TravelMode};
use waymesh_query::{PathQuery, QueryConfig};

fn path_length(points: &[waymesh_query::PathPoint]) -> f32 {
    points
        .windows(2)
        .map(|pair| pair[0].position.distance(pair[1].position))
        .sum()
}

#[test]
fn corridor_path_is_straight() -> Result<()> {
    let world = BoxWorld::new(vec![Aabb3d::new(
        Vec3::new(0.0, 0.0, -0.5),
        Vec3::new(2.0, 10.0, 0.0),
    )]);
    let config = NavConfigBuilder {
        cell_size: 0.25,
        cell_height: 0.2,
        agent_radius: 0.25,
        agent_height: 1.8,
        aabb: Aabb3d::new(Vec3::new(0.0, 0.0, -1.0), Vec3::new(2.0, 10.0, 3.0)),
        tile_size: 64,
        ..Default::default()
    }
    .build()?;
    let mut navigator = TileNavigator::new(config);
    navigator.build_all(&world, &NoMarkers);

    let query = PathQuery::new(navigator.published(), QueryConfig::default());
    let start = Vec3::new(1.0, 1.0, 0.0);
    let end = Vec3::new(1.0, 9.0, 0.0);
    let path = query.find_path(start, end);

    assert!(path.len() >= 2);
    assert!(path.iter().all(|p| p.mode == TravelMode::Walk));
    // A straight corridor straightens to (almost) the euclidean distance.
    let euclidean = start.truncate().distance(end.truncate());
    let length = path_length(&path);
    assert!(
        (length - euclidean).abs() < 0.5,
        "path length {length} deviates from straight-line {euclidean}"
    );
    Ok(())
}

#[test]
fn platform_path_crosses_the_jump_link() -> Result<()> {
    let world = BoxWorld::new(vec![
        Aabb3d::new(Vec3::new(0.0, 0.0, -1.0), Vec3::new(20.0, 20.0, 0.0)),
        Aabb3d::new(Vec3::new(60.0, 0.0, 19.0), Vec3::new(80.0, 20.0, 20.0)),
    ]);
    let config = NavConfigBuilder {
        cell_size: 1.0,
        cell_height: 0.5,
        aabb: Aabb3d::new(Vec3::new(0.0, 0.0, -2.0), Vec3::new(80.0, 20.0, 30.0)),
        tile_size: 128,
        max_jump_distance: 45.0,
        max_jump_height: 25.0,
        ..Default::default()
    }
    .build()?;
    let mut navigator = TileNavigator::new(config);
    navigator.build_all(&world, &NoMarkers);

    let query = PathQuery::new(navigator.published(), QueryConfig::default());
    let path = query.find_path(Vec3::new(10.0, 10.0, 0.0), Vec3::new(70.0, 10.0, 20.0));

    assert!(!path.is_empty(), "platforms are linked, a path must exist");
    let jumps: Vec<usize> = path
        .iter()
        .enumerate()
        .filter(|(_, p)| p.mode == TravelMode::Jump)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(jumps.len(), 1, "exactly one jump transition expected");

    // Before the jump the agent is on the low platform, after it on the
    // high one.
    let jump = jumps[0];
    assert!(path[jump - 1].position.z < 5.0);
    assert_relative_eq!(path[jump].position.z, 20.0, epsilon = 1.0);
    assert!(path.last().unwrap().position.z > 15.0);
    Ok(())
}

#[test]
fn unreachable_goal_gives_best_effort_path() -> Result<()> {
    // Two platforms too far apart for any jump link.
    let world = BoxWorld::new(vec![
        Aabb3d::new(Vec3::new(0.0, 0.0, -1.0), Vec3::new(20.0, 20.0, 0.0)),
        Aabb3d::new(Vec3::new(160.0, 0.0, -1.0), Vec3::new(180.0, 20.0, 0.0)),
    ]);
    let config = NavConfigBuilder {
        cell_size: 1.0,
        cell_height: 0.5,
        aabb: Aabb3d::new(Vec3::new(0.0, 0.0, -2.0), Vec3::new(180.0, 20.0, 30.0)),
        tile_size: 256,
        ..Default::default()
    }
    .build()?;
    let mut navigator = TileNavigator::new(config);
    navigator.build_all(&world, &NoMarkers);

    let query = PathQuery::new(navigator.published(), QueryConfig::default());
    let path = query.find_path(Vec3::new(10.0, 10.0, 0.0), Vec3::new(170.0, 10.0, 0.0));

    // The search cannot reach the far platform; it returns the best-effort
    // path on the near one rather than failing.
    assert!(!path.is_empty());
    for point in &path {
        assert!(point.position.x <= 20.0);
        assert_eq!(point.mode, TravelMode::Walk);
    }
    Ok(())
}
