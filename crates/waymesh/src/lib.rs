#![doc = include_str!("../../../readme.md")]

mod config;
mod contour;
mod detail_mesh;
mod erosion;
mod heightfield;
mod link;
mod lookup;
pub(crate) mod math;
mod poly_mesh;
mod probe;
mod region;
mod report;
mod span;
mod span_field;
mod tile;

pub use config::{ConfigError, NavConfig, NavConfigBuilder};
pub use contour::{Contour, ContourSet, ContourVertex};
pub use detail_mesh::{DetailMesh, SubMesh};
pub use heightfield::{
    Heightfield, HeightfieldBuilder, HeightfieldBuilderError, SpanInsertionError,
};
pub use link::{Link, TravelMode, build_jump_links, build_ladder_links, polygon_islands};
pub use lookup::PolyLookup;
pub use math::Aabb3d;
pub use poly_mesh::NavMesh;
pub use probe::{
    LADDER_MARKER_PREFIX, Marker, MarkerSource, NoMarkers, ProbeHit, SEED_MARKER_PREFIX,
    SolidProbe,
};
pub use region::RegionId;
pub use report::BuildReport;
pub use span::{Span, SpanKey, Spans};
pub use span_field::{AreaType, FieldCell, FieldSpan, SpanField, SpanFieldError};
pub use tile::{
    PublishedMesh, TileBuildError, TileCoord, TileNavigator, TileRecord, TileUpdateError,
    UpdatePhase,
};
