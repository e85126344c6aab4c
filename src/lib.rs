//! On-demand 3D terrain surfaces built from elevation-contour vector tiles:
//! deduplicated fetching, an on-disk LRU tile cache, contour decoding, and a
//! divide-and-conquer Delaunay mesh over the sampled points.

pub mod concurrency;
pub mod config;
pub mod delaunay;
pub mod fetch;
pub mod geo_trig;
pub mod labels;
pub mod mvt;
pub mod point;
pub mod point_index;
pub mod primitives;
pub mod tile_cache;
pub mod tile_source;
pub mod triangulate;
pub mod wire;
pub mod world_model;

pub use crate::delaunay::Delaunay;
pub use crate::point::Point;
pub use crate::tile_source::{TileId, TileSource};
pub use crate::world_model::WorldModel;
