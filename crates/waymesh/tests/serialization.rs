//! JSON round-trip of the published mesh data.
#![cfg(feature = "serialize")]

mod common;

use common::BoxWorld;
use glam::Vec3;
use waymesh::{
    Aabb3d, DetailMesh, Link, NavConfigBuilder, NavMesh, NoMarkers, TileNavigator, TileRecord,
};

#[test]
fn mesh_bundle_round_trips_through_json() {
    let world = BoxWorld::new(vec![
        Aabb3d::new(Vec3::new(0.0, 0.0, -1.0), Vec3::new(20.0, 20.0, 0.0)),
        Aabb3d::new(Vec3::new(60.0, 0.0, 19.0), Vec3::new(80.0, 20.0, 20.0)),
    ]);
    let config = NavConfigBuilder {
        cell_size: 1.0,
        cell_height: 0.5,
        aabb: Aabb3d::new(Vec3::new(0.0, 0.0, -2.0), Vec3::new(80.0, 20.0, 30.0)),
        tile_size: 48,
        max_jump_distance: 45.0,
        max_jump_height: 25.0,
        ..Default::default()
    }
    .build()
    .unwrap();
    let mut navigator = TileNavigator::new(config);
    navigator.build_all(&world, &NoMarkers);

    let (mesh, detail, links) = navigator.master();
    assert!(mesh.polygon_count() > 0, "fixture must be non-trivial");
    assert!(!links.is_empty(), "fixture must carry links");

    let json = serde_json::to_string(&(mesh, detail, links, navigator.tiles())).unwrap();
    let (mesh2, detail2, links2, tiles2): (NavMesh, DetailMesh, Vec<Link>, Vec<TileRecord>) =
        serde_json::from_str(&json).unwrap();

    assert_eq!(*mesh, mesh2);
    assert_eq!(*detail, detail2);
    assert_eq!(links, links2.as_slice());
    assert_eq!(navigator.tiles(), tiles2.as_slice());
}
