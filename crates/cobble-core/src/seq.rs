//! Per-block edit sequencing
//!
//! Every edited block position carries a sequence number advancing modulo
//! `max_seq`. Receivers use a sliding freshness window to drop stale or
//! duplicate deliveries without assuming ordered transport: there is no
//! chunk-wide ordering, only per-position freshness.

use glam::IVec3;
use serde::{Deserialize, Serialize};

/// One recorded deviation from procedural generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVariation {
    pub local: IVec3,
    pub block: crate::BlockType,
    pub seq: u32,
}

/// Sequence number for the next edit of a position. First-ever edits start
/// at zero; later edits advance modulo `max_seq`.
pub fn next_seq(old: Option<u32>, max_seq: u32) -> u32 {
    match old {
        Some(seq) => (seq + 1) % max_seq,
        None => 0,
    }
}

/// Freshness test for an incoming sequence number against the locally
/// recorded one. The incoming edit is stale when the local number is equal
/// or newer within a bounded window; an incoming number far below the local
/// one is treated as post-wraparound and accepted. Assumes in-flight
/// reorderings for a single position never span more than `max_delta`.
pub fn is_stale(old: u32, incoming: u32, max_delta: u32) -> bool {
    old >= incoming && old <= incoming + max_delta
}
