//! The authoritative host
//!
//! Owns the session seed and the variation store, serializes all message
//! handling behind one lock (two concurrent edits to the same chunk must
//! not race on sequence allocation), and fans accepted edits out to every
//! connected peer including the submitter.

use std::collections::HashMap;
use std::sync::Arc;

use cobble_core::{BlockType, BlockVariation, ChunkCoord, ChunkShape, WorldConfig};
use cobble_world::{ChunkSync, SyncError, SyncFuture};
use futures_util::{SinkExt, StreamExt};
use glam::IVec3;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::message::{ClientMessage, PeerId, RemoteEdit, ServerMessage};
use crate::router::{CatchUpWait, ReplyRouter};
use crate::store::VariationStore;
use crate::NetError;

struct AuthorityInner {
    store: VariationStore,
    peers: HashMap<PeerId, mpsc::UnboundedSender<ServerMessage>>,
    next_peer: PeerId,
}

/// One authoritative process per session.
pub struct Authority {
    seed: u32,
    shape: ChunkShape,
    inner: Mutex<AuthorityInner>,
}

impl Authority {
    pub fn new(seed: u32, config: &WorldConfig) -> Self {
        Self {
            seed,
            shape: config.chunk_shape,
            inner: Mutex::new(AuthorityInner {
                store: VariationStore::new(config.max_seq),
                peers: HashMap::new(),
                next_peer: 1,
            }),
        }
    }

    /// The session seed. The authority is its only source of truth.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Number of distinct edited positions recorded for a chunk.
    pub fn recorded_count(&self, chunk: ChunkCoord) -> usize {
        self.inner.lock().store.recorded_count(chunk)
    }

    /// Handle one message from a peer. `from` is the connection identity;
    /// the requester field embedded in the message is advisory only.
    pub fn handle_message(&self, from: PeerId, msg: ClientMessage) {
        match msg {
            ClientMessage::RequestSeed { .. } => {
                debug!(peer = from, "seed requested");
                self.send_to(from, ServerMessage::ReplySeed { seed: self.seed });
            }
            ClientMessage::RequestCatchUp { chunk, .. } => {
                let entries = self.inner.lock().store.catch_up(chunk);
                self.send_to(from, ServerMessage::ReplyCatchUp { chunk, entries });
            }
            ClientMessage::SubmitEdit {
                chunk,
                local,
                block,
                ..
            } => {
                if !self.shape.contains(local) {
                    // Expected from races against a moving render window.
                    debug!(peer = from, ?chunk, ?local, "out-of-bounds edit dropped");
                    return;
                }
                let seq = {
                    let mut inner = self.inner.lock();
                    inner.store.record_edit(chunk, local, block)
                };
                self.broadcast(ServerMessage::BroadcastEdit {
                    chunk,
                    local,
                    block,
                    seq,
                });
            }
        }
    }

    /// Serve websocket peers on `listener` until the task is dropped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), NetError> {
        info!(addr = ?listener.local_addr().ok(), "authority listening");
        loop {
            let (stream, addr) = listener.accept().await?;
            let authority = self.clone();
            tokio::spawn(async move {
                if let Err(err) = authority.handle_connection(stream).await {
                    warn!(%addr, "peer connection ended: {err}");
                }
            });
        }
    }

    /// Connect an in-process peer (the hosting process's own world, or a
    /// test). Returns the sync handle and the stream of broadcast edits.
    pub fn local_peer(self: &Arc<Self>) -> (LocalPeer, mpsc::UnboundedReceiver<RemoteEdit>) {
        let (id, mut server_rx) = self.register_peer();
        let (edit_tx, edit_rx) = mpsc::unbounded_channel();
        let router = Arc::new(ReplyRouter::new(edit_tx));

        let pump_router = router.clone();
        tokio::spawn(async move {
            while let Some(msg) = server_rx.recv().await {
                pump_router.route(msg);
            }
        });

        info!(peer = id, "local peer attached");
        (
            LocalPeer {
                id,
                authority: self.clone(),
                router,
            },
            edit_rx,
        )
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> Result<(), NetError> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut sink, mut stream) = ws.split();
        let (id, mut server_rx) = self.register_peer();
        info!(peer = id, "peer connected");

        let writer = tokio::spawn(async move {
            while let Some(msg) = server_rx.recv().await {
                let text = serde_json::to_string(&msg)?;
                sink.send(Message::Text(text)).await?;
            }
            Ok::<(), NetError>(())
        });

        let result = async {
            while let Some(frame) = stream.next().await {
                match frame? {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(msg) => self.handle_message(id, msg),
                        Err(err) => warn!(peer = id, "dropping malformed message: {err}"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Ok::<(), NetError>(())
        }
        .await;

        self.deregister_peer(id);
        writer.abort();
        info!(peer = id, "peer disconnected");
        result
    }

    fn register_peer(&self) -> (PeerId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_peer;
        inner.next_peer += 1;
        inner.peers.insert(id, tx);
        (id, rx)
    }

    fn deregister_peer(&self, id: PeerId) {
        self.inner.lock().peers.remove(&id);
    }

    fn send_to(&self, peer: PeerId, msg: ServerMessage) {
        let inner = self.inner.lock();
        if let Some(tx) = inner.peers.get(&peer) {
            let _ = tx.send(msg);
        }
    }

    fn broadcast(&self, msg: ServerMessage) {
        let inner = self.inner.lock();
        for tx in inner.peers.values() {
            let _ = tx.send(msg.clone());
        }
    }
}

/// Channel-backed peer living in the authority's own process.
pub struct LocalPeer {
    id: PeerId,
    authority: Arc<Authority>,
    router: Arc<ReplyRouter>,
}

impl LocalPeer {
    pub fn peer_id(&self) -> PeerId {
        self.id
    }
}

impl ChunkSync for LocalPeer {
    fn request_catch_up(&self, chunk: ChunkCoord) -> SyncFuture<Vec<BlockVariation>> {
        // Register before asking so the reply cannot race past us.
        let wait = self.router.register_catch_up(chunk);
        self.authority.handle_message(
            self.id,
            ClientMessage::RequestCatchUp {
                requester: self.id,
                chunk,
            },
        );
        Box::pin(async move {
            match wait {
                CatchUpWait::Ready(entries) => Ok(entries),
                CatchUpWait::Pending(rx) => rx.await.map_err(|_| SyncError::Closed),
            }
        })
    }

    fn submit_edit(&self, chunk: ChunkCoord, local: IVec3, block: BlockType) -> SyncFuture<()> {
        self.authority.handle_message(
            self.id,
            ClientMessage::SubmitEdit {
                requester: self.id,
                chunk,
                local,
                block,
            },
        );
        Box::pin(std::future::ready(Ok(())))
    }
}

impl Drop for LocalPeer {
    fn drop(&mut self) {
        self.authority.deregister_peer(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> Arc<Authority> {
        Arc::new(Authority::new(7, &WorldConfig::default()))
    }

    #[tokio::test]
    async fn test_out_of_bounds_edit_is_silently_dropped() {
        let auth = authority();
        let (peer, mut edits) = auth.local_peer();

        peer.submit_edit(ChunkCoord::new(0, 0), IVec3::new(-1, 0, 0), BlockType::Dirt)
            .await
            .unwrap();
        peer.submit_edit(ChunkCoord::new(0, 0), IVec3::new(0, 64, 0), BlockType::Dirt)
            .await
            .unwrap();

        assert_eq!(auth.recorded_count(ChunkCoord::new(0, 0)), 0);
        assert!(edits.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_edit_broadcasts_to_submitter_too() {
        let auth = authority();
        let (peer, mut edits) = auth.local_peer();

        let chunk = ChunkCoord::new(2, -1);
        let pos = IVec3::new(3, 10, 3);
        peer.submit_edit(chunk, pos, BlockType::Air).await.unwrap();

        let echo = edits.recv().await.unwrap();
        assert_eq!(echo.chunk, chunk);
        assert_eq!(echo.local, pos);
        assert_eq!(echo.block, BlockType::Air);
        assert_eq!(echo.seq, 0);
    }

    #[tokio::test]
    async fn test_catch_up_reply_round_trip() {
        let auth = authority();
        let (peer, _edits) = auth.local_peer();

        let chunk = ChunkCoord::new(1, 1);
        peer.submit_edit(chunk, IVec3::new(0, 0, 0), BlockType::Air)
            .await
            .unwrap();
        peer.submit_edit(chunk, IVec3::new(1, 0, 0), BlockType::Rose)
            .await
            .unwrap();

        let entries = peer.request_catch_up(chunk).await.unwrap();
        assert_eq!(entries.len(), 2);

        let empty = peer.request_catch_up(ChunkCoord::new(50, 50)).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_two_peers_converge() {
        let auth = authority();
        let (peer_a, mut edits_a) = auth.local_peer();
        let (_peer_b, mut edits_b) = auth.local_peer();

        let chunk = ChunkCoord::new(0, 0);
        let pos = IVec3::new(5, 5, 5);
        peer_a.submit_edit(chunk, pos, BlockType::Stone).await.unwrap();

        let at_a = edits_a.recv().await.unwrap();
        let at_b = edits_b.recv().await.unwrap();
        assert_eq!(at_a, at_b);
        assert_eq!(at_b.block, BlockType::Stone);

        // Resubmitting the identical edit still advances the authority's
        // sequence but yields the same resulting type everywhere.
        peer_a.submit_edit(chunk, pos, BlockType::Stone).await.unwrap();
        let again = edits_b.recv().await.unwrap();
        assert_eq!(again.block, BlockType::Stone);
        assert_eq!(again.seq, 1);
    }

    #[tokio::test]
    async fn test_two_worlds_converge_on_block_type() {
        use cobble_world::{NullBackend, TerrainGenerator, World};

        let config = WorldConfig {
            chunk_shape: cobble_core::ChunkShape::new(8, 16, 8),
            view_distance: 1,
            fast_update_distance: 1,
            ..Default::default()
        };
        let auth = Arc::new(Authority::new(3, &config));

        let mut worlds = Vec::new();
        let mut edit_streams = Vec::new();
        for _ in 0..2 {
            let (peer, edits) = auth.local_peer();
            let world = World::new(
                config.clone(),
                Arc::new(cobble_core::BlockCatalog::builtin()),
                Arc::new(TerrainGenerator::new(3, config.chunk_shape)),
                Arc::new(NullBackend),
                Arc::new(peer),
            );
            world.init(ChunkCoord::new(0, 0)).await.unwrap();
            worlds.push(world);
            edit_streams.push(edits);
        }

        // The first world carves a block; both apply the broadcast echo.
        let chunk = ChunkCoord::new(0, 1);
        let pos = IVec3::new(3, 0, 3);
        worlds[0].submit_edit(chunk, pos, BlockType::Air).await.unwrap();
        for (world, edits) in worlds.iter().zip(edit_streams.iter_mut()) {
            let edit = edits.recv().await.unwrap();
            world
                .apply_remote_edit(edit.chunk, edit.local, edit.block, edit.seq)
                .await;
        }

        // Submitter, non-submitter, and authority all agree.
        let world_pos = chunk.world_origin(config.chunk_shape) + pos;
        let at_submitter = worlds[0].block_type_at(world_pos).await;
        let at_other = worlds[1].block_type_at(world_pos).await;
        assert_eq!(at_submitter, BlockType::Air);
        assert_eq!(at_submitter, at_other);
        assert_eq!(auth.recorded_count(chunk), 1);
    }

    #[tokio::test]
    async fn test_reloaded_chunk_replays_recorded_variations() {
        use cobble_world::{NullBackend, TerrainGenerator, World};

        let config = WorldConfig {
            chunk_shape: cobble_core::ChunkShape::new(8, 16, 8),
            view_distance: 1,
            fast_update_distance: 1,
            ..Default::default()
        };
        let auth = Arc::new(Authority::new(7, &config));
        let (peer, _edits) = auth.local_peer();
        let world = World::new(
            config.clone(),
            Arc::new(cobble_core::BlockCatalog::builtin()),
            Arc::new(TerrainGenerator::new(7, config.chunk_shape)),
            Arc::new(NullBackend),
            Arc::new(peer),
        );
        world.init(ChunkCoord::new(0, 0)).await.unwrap();

        // Carve the bottom of a resident chunk; the authority records it.
        let chunk = ChunkCoord::new(1, 1);
        let pos = IVec3::new(2, 0, 2);
        world.submit_edit(chunk, pos, BlockType::Air).await.unwrap();
        assert_eq!(auth.recorded_count(chunk), 1);

        // Walk far enough that the chunk leaves the window, then return.
        world.update(ChunkCoord::new(10, 10)).await.unwrap();
        assert!(!world.resident_chunks().await.contains(&chunk));
        world.update(ChunkCoord::new(0, 0)).await.unwrap();

        // Regenerated terrain alone would put stone back at the bottom; the
        // catch-up exchange restores the recorded edit.
        let world_pos = chunk.world_origin(config.chunk_shape) + pos;
        assert_eq!(world.block_type_at(world_pos).await, BlockType::Air);
    }
}
