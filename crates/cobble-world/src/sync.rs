//! Seam to the network layer
//!
//! The world only knows how to ask the authority for a chunk's recorded
//! variations and how to submit an edit; transport, framing, and peer
//! identity live behind this trait.

use std::future::Future;
use std::pin::Pin;

use cobble_core::{BlockType, BlockVariation, ChunkCoord};
use glam::IVec3;
use thiserror::Error;

/// Boxed future returned by [`ChunkSync`] operations.
pub type SyncFuture<T> = Pin<Box<dyn Future<Output = Result<T, SyncError>> + Send>>;

/// Failures surfaced by the sync transport.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync transport error: {0}")]
    Transport(String),

    #[error("sync connection closed")]
    Closed,
}

/// The world's handle to the authoritative process.
pub trait ChunkSync: Send + Sync {
    /// Request the full variation record of a chunk. The returned future
    /// resolves when the authority's reply arrives, including the case where
    /// the reply lands before the caller awaits it.
    fn request_catch_up(&self, chunk: ChunkCoord) -> SyncFuture<Vec<BlockVariation>>;

    /// Submit a block edit to the authority. Resolution means the message
    /// left this process, not that the edit was accepted; acceptance comes
    /// back as a broadcast.
    fn submit_edit(&self, chunk: ChunkCoord, local: IVec3, block: BlockType) -> SyncFuture<()>;
}

/// Sync handle for a world with no authority behind it: catch-up always
/// returns an empty record and edits resolve immediately. Single-process
/// sessions and unit tests use this.
pub struct OfflineSync;

impl ChunkSync for OfflineSync {
    fn request_catch_up(&self, _chunk: ChunkCoord) -> SyncFuture<Vec<BlockVariation>> {
        Box::pin(std::future::ready(Ok(Vec::new())))
    }

    fn submit_edit(&self, _chunk: ChunkCoord, _local: IVec3, _block: BlockType) -> SyncFuture<()> {
        Box::pin(std::future::ready(Ok(())))
    }
}
