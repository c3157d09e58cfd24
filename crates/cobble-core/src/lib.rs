//! Cobble Core - shared foundation for the Cobble voxel engine
//!
//! This crate provides the types every other layer builds on:
//! - Chunk/block coordinate math
//! - The static block catalog
//! - Per-block edit sequence arithmetic
//! - The world configuration passed down to every component

pub mod block;
pub mod config;
pub mod coords;
pub mod seq;

pub use block::{BlockCatalog, BlockInfo, BlockType, ColliderKind, MaterialKind, Outlook};
pub use config::WorldConfig;
pub use coords::{ChunkCoord, ChunkShape};
pub use seq::BlockVariation;
