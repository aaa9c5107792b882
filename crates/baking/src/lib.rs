//! Retex texture synthesis and permutation baking engine
//!
//! This crate turns multi-object scanned assets into baked texture sets:
//! - [`mesh`] - Consolidated triangle mesh with named material slots
//! - [`consolidate`] - OBJ import, join, weld, and export
//! - [`rig`] - Ring camera planning around the object bounds
//! - [`material`] - Texture channels, materials, and permutation slot groups
//! - [`shading`] - Material graph compositing and the surface shader seam
//! - [`raster`] - CPU RGBA f32 bake target
//! - [`bake`] - UV rasterizing baker and the permutation sweep
//! - [`project`] - Projective photograph accumulation
//! - [`raycast`] - Ray-mesh visibility queries
//! - [`error`] - Pipeline error type

pub mod bake;
pub mod consolidate;
pub mod error;
pub mod material;
pub mod mesh;
pub mod project;
pub mod raster;
pub mod raycast;
pub mod rig;
pub mod shading;

pub use bake::*;
pub use consolidate::*;
pub use error::*;
pub use material::*;
pub use mesh::*;
pub use project::*;
pub use raster::*;
pub use raycast::*;
pub use rig::*;
pub use shading::*;
