//! Authoritative variation store
//!
//! The host-side record of every block that ever deviated from procedural
//! generation, with its sequence number. Source of truth for catch-up
//! replies; survives chunk unload/reload for the lifetime of the session.

use std::collections::HashMap;

use cobble_core::{seq, BlockType, BlockVariation, ChunkCoord};
use glam::IVec3;

#[derive(Default)]
struct ChunkVariations {
    blocks: HashMap<IVec3, (BlockType, u32)>,
}

/// Session-lifetime record of accepted edits, keyed by chunk coordinate.
/// Grows with distinct edited positions and is never evicted.
pub struct VariationStore {
    max_seq: u32,
    chunks: HashMap<ChunkCoord, ChunkVariations>,
}

impl VariationStore {
    pub fn new(max_seq: u32) -> Self {
        Self {
            max_seq,
            chunks: HashMap::new(),
        }
    }

    /// Record one accepted edit and return its sequence number. The first
    /// edit of a position starts at zero; later edits advance modulo the
    /// configured maximum.
    pub fn record_edit(&mut self, chunk: ChunkCoord, local: IVec3, block: BlockType) -> u32 {
        let vars = self.chunks.entry(chunk).or_default();
        let next = seq::next_seq(vars.blocks.get(&local).map(|&(_, s)| s), self.max_seq);
        vars.blocks.insert(local, (block, next));
        next
    }

    /// Every recorded variation of a chunk; empty when none exist.
    pub fn catch_up(&self, chunk: ChunkCoord) -> Vec<BlockVariation> {
        let Some(vars) = self.chunks.get(&chunk) else {
            return Vec::new();
        };
        vars.blocks
            .iter()
            .map(|(&local, &(block, seq))| BlockVariation { local, block, seq })
            .collect()
    }

    /// Number of distinct edited positions in a chunk.
    pub fn recorded_count(&self, chunk: ChunkCoord) -> usize {
        self.chunks.get(&chunk).map_or(0, |v| v.blocks.len())
    }
}
