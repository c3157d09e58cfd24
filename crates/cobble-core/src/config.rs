//! World configuration
//!
//! Shared tunables are an explicitly constructed value handed to every
//! component at creation, never ambient global state. The binary can load
//! one from TOML; everything has a sensible default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ChunkShape;

/// Tunables for one world session. Identical on the host and every peer;
/// only the seed travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Fixed extent of every chunk.
    pub chunk_shape: ChunkShape,
    /// Ring count of the render window around the viewer.
    pub view_distance: u32,
    /// Manhattan radius within which colliders are kept current and edits
    /// trigger an immediate rebuild.
    pub fast_update_distance: u32,
    /// Modulus for per-block edit sequence numbers.
    pub max_seq: u32,
    /// Freshness window for rejecting reordered edit deliveries.
    pub max_seq_delta: u32,
    /// Interval of the periodic reconciliation pass, in milliseconds.
    pub update_interval_ms: u64,
    /// Bound on the catch-up round trip; on expiry the chunk keeps its
    /// freshly generated terrain and self-heals on the next reload.
    pub catch_up_timeout_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_shape: ChunkShape::default(),
            view_distance: 4,
            fast_update_distance: 2,
            max_seq: 100,
            max_seq_delta: 50,
            update_interval_ms: 500,
            catch_up_timeout_ms: 3000,
        }
    }
}

impl WorldConfig {
    /// Number of chunks in the render window.
    pub fn render_chunk_count(&self) -> usize {
        let side = (self.view_distance * 2 + 1) as usize;
        side * side
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn catch_up_timeout(&self) -> Duration {
        Duration::from_millis(self.catch_up_timeout_ms)
    }
}
