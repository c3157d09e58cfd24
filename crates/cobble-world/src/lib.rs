//! Cobble World - chunk streaming and voxel terrain
//!
//! Owns the live working set of chunks around a moving viewer: procedural
//! generation, dirty tracking, mesh/collider reconciliation, and the local
//! side of the authoritative edit protocol.

pub mod chunk;
pub mod render;
pub mod sync;
pub mod terrain;
pub mod world;

pub use chunk::Chunk;
pub use render::{ColliderPart, FaceMask, NullBackend, RenderBackend, VisualPart};
pub use sync::{ChunkSync, OfflineSync, SyncError, SyncFuture};
pub use terrain::TerrainGenerator;
pub use world::{RayHit, World, WorldError};
