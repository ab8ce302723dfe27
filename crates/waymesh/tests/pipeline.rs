//! End-to-end pipeline scenarios over synthetic probe worlds.

mod common;

use common::{BoxWorld, FixedMarkers};
use glam::Vec3;
use waymesh::{
    Aabb3d, BuildReport, HeightfieldBuilder, Marker, NavConfig, NavConfigBuilder, NoMarkers,
    RegionId, SpanField, TileNavigator, TravelMode,
};

/// A flat corridor, 2 world units wide and 10 long, floored by one slab.
fn corridor_world() -> (BoxWorld, NavConfig) {
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
    .build()
    .unwrap();
    (world, config)
}

#[test]
fn corridor_produces_one_region_one_contour_one_polygon() {
    let (world, config) = corridor_world();

    // Run the stages directly, without tiling, to inspect the
    // intermediate outputs the scenario is about.
    let mut heightfield = HeightfieldBuilder {
        aabb: config.aabb,
        cell_size: config.cell_size,
        cell_height: config.cell_height,
    }
    .build()
    .unwrap();
    heightfield.populate_from_probe(&world, &config).unwrap();

    let mut field = SpanField::from_heightfield(&heightfield, &config).unwrap();
    field.erode_walkable_area(config.walkable_radius);
    field.build_regions(config.min_region_area, config.merge_region_area);
    assert_eq!(field.max_region, RegionId(1), "expected exactly one region");

    let mut report = BuildReport::default();
    let contours = field.build_contours(config.max_simplification_error, 0, &mut report);
    assert_eq!(contours.contours.len(), 1, "expected exactly one contour");
    assert_eq!(
        contours.contours[0].vertices.len(),
        4,
        "a rectangle must simplify to its 4 corners"
    );

    let mesh = contours.into_nav_mesh(config.max_vertices_per_polygon, &mut report);
    assert!(!report.any(), "unexpected failures: {report:?}");
    assert_eq!(mesh.polygon_count(), 1, "expected one convex polygon");
    assert_eq!(mesh.polygon_vertex_count(0), 4);
}

/// Two disconnected platforms 40 units apart with a 20 unit height
/// difference: below the jump limits, above the walkable step.
fn platform_world() -> (BoxWorld, NavConfig) {
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
    .build()
    .unwrap();
    (world, config)
}

#[test]
fn platforms_get_exactly_one_validated_jump_link() {
    let (world, config) = platform_world();
    let mut navigator = TileNavigator::new(config);
    navigator.build_all(&world, &NoMarkers);

    let published = navigator.published();
    assert!(published.mesh.polygon_count() >= 2);

    let jumps: Vec<_> = published
        .links
        .iter()
        .filter(|link| link.mode == TravelMode::Jump)
        .collect();
    let walks = published
        .links
        .iter()
        .filter(|link| link.mode == TravelMode::Walk)
        .count();
    assert_eq!(jumps.len(), 1, "expected exactly one jump link");
    assert_eq!(walks, 0, "walk links must never be generated");

    let link = jumps[0];
    assert!((link.position_a.z - link.position_b.z).abs() > 19.0);
    assert!(link.cost > 0.0);
}

#[test]
fn blocked_gap_gets_no_jump_link() {
    let (_, config) = platform_world();
    // The same platforms, plus a wall across the gap reaching past the sky.
    let world = BoxWorld::new(vec![
        Aabb3d::new(Vec3::new(0.0, 0.0, -1.0), Vec3::new(20.0, 20.0, 0.0)),
        Aabb3d::new(Vec3::new(60.0, 0.0, 19.0), Vec3::new(80.0, 20.0, 20.0)),
        Aabb3d::new(Vec3::new(38.0, 0.0, 0.0), Vec3::new(42.0, 20.0, 60.0)),
    ]);

    let mut navigator = TileNavigator::new(config);
    navigator.build_all(&world, &NoMarkers);
    let jumps = navigator
        .published()
        .links
        .iter()
        .filter(|link| link.mode == TravelMode::Jump)
        .count();
    assert_eq!(jumps, 0, "a wall across the arc must reject the link");
}

#[test]
fn ladder_markers_connect_the_platforms() {
    let (world, config) = platform_world();
    let markers = FixedMarkers(vec![
        Marker {
            name: "ladder_tower".into(),
            position: Vec3::new(19.0, 10.0, 0.0),
        },
        Marker {
            name: "ladder_tower".into(),
            position: Vec3::new(61.0, 10.0, 20.0),
        },
    ]);
    let mut navigator = TileNavigator::new(config);
    navigator.build_all(&world, &markers);

    let ladders: Vec<_> = navigator
        .published()
        .links
        .iter()
        .filter(|link| link.mode == TravelMode::Ladder)
        .collect();
    assert_eq!(ladders.len(), 1);
    assert!(ladders[0].cost >= 20.0, "ladder cost is the snapped distance");
}

#[test]
fn pruning_removes_platforms_unreachable_from_the_seed() {
    let (_, config) = platform_world();
    // Wall across the gap: no jump link, so platform B is unreachable.
    let world = BoxWorld::new(vec![
        Aabb3d::new(Vec3::new(0.0, 0.0, -1.0), Vec3::new(20.0, 20.0, 0.0)),
        Aabb3d::new(Vec3::new(60.0, 0.0, 19.0), Vec3::new(80.0, 20.0, 20.0)),
        Aabb3d::new(Vec3::new(38.0, 0.0, 0.0), Vec3::new(42.0, 20.0, 60.0)),
    ]);
    let markers = FixedMarkers(vec![Marker {
        name: "nav_seed_start".into(),
        position: Vec3::new(10.0, 10.0, 0.0),
    }]);

    let mut navigator = TileNavigator::new(config);
    navigator.build_all(&world, &markers);

    let published = navigator.published();
    assert!(published.mesh.polygon_count() >= 1);
    for polygon in 0..published.mesh.polygon_count() {
        let centroid = published.mesh.centroid(polygon);
        assert!(
            centroid.x < 40.0,
            "polygon {polygon} at {centroid} survived pruning on the far platform"
        );
    }
}
