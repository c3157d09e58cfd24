//! Websocket peer client
//!
//! A dependent process's connection to the authority. Outbound messages go
//! through an unbounded channel drained by a writer task; inbound frames are
//! demultiplexed by the reply router. The client implements the world's
//! `ChunkSync` seam.

use std::sync::Arc;
use std::time::Duration;

use cobble_core::{BlockType, BlockVariation, ChunkCoord};
use cobble_world::{ChunkSync, SyncError, SyncFuture};
use futures_util::{SinkExt, StreamExt};
use glam::IVec3;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::message::{ClientMessage, PeerId, RemoteEdit, ServerMessage};
use crate::router::{CatchUpWait, ReplyRouter};
use crate::NetError;

/// Connection to a remote authority.
pub struct PeerClient {
    id: PeerId,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    router: Arc<ReplyRouter>,
}

impl PeerClient {
    /// Connect to the authority at `url` (e.g. `ws://host:4650`). Returns
    /// the client and the stream of broadcast edits the session must pump
    /// into its world.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RemoteEdit>), NetError> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, mut stream) = ws.split();
        info!(url, "connected to authority");

        let (edit_tx, edit_rx) = mpsc::unbounded_channel();
        let router = Arc::new(ReplyRouter::new(edit_tx));

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("failed to encode message: {err}");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let read_router = router.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => read_router.route(msg),
                            Err(err) => warn!("dropping malformed message: {err}"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            info!("authority connection closed");
        });

        Ok((
            Self {
                id: rand::random(),
                outbound: out_tx,
                router,
            },
            edit_rx,
        ))
    }

    pub fn peer_id(&self) -> PeerId {
        self.id
    }

    /// Fetch the session seed. All terrain generation must use this value,
    /// never a locally guessed one.
    pub async fn request_seed(&self, timeout: Duration) -> Result<u32, NetError> {
        let reply = self.router.expect_seed();
        self.outbound
            .send(ClientMessage::RequestSeed { requester: self.id })
            .map_err(|_| NetError::Closed)?;
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(seed)) => Ok(seed),
            Ok(Err(_)) => Err(NetError::Closed),
            Err(_) => Err(NetError::Timeout),
        }
    }
}

impl ChunkSync for PeerClient {
    fn request_catch_up(&self, chunk: ChunkCoord) -> SyncFuture<Vec<BlockVariation>> {
        // Register before sending so the reply cannot race past us.
        let wait = self.router.register_catch_up(chunk);
        let sent = self
            .outbound
            .send(ClientMessage::RequestCatchUp {
                requester: self.id,
                chunk,
            })
            .map_err(|_| SyncError::Closed);
        Box::pin(async move {
            sent?;
            match wait {
                CatchUpWait::Ready(entries) => Ok(entries),
                CatchUpWait::Pending(rx) => rx.await.map_err(|_| SyncError::Closed),
            }
        })
    }

    fn submit_edit(&self, chunk: ChunkCoord, local: IVec3, block: BlockType) -> SyncFuture<()> {
        let result = self
            .outbound
            .send(ClientMessage::SubmitEdit {
                requester: self.id,
                chunk,
                local,
                block,
            })
            .map_err(|_| SyncError::Closed);
        Box::pin(std::future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Authority;
    use cobble_core::WorldConfig;
    use tokio::net::TcpListener;

    async fn serve_authority() -> (Arc<Authority>, String) {
        let authority = Arc::new(Authority::new(31337, &WorldConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(authority.clone().serve(listener));
        (authority, url)
    }

    #[tokio::test]
    async fn test_seed_round_trip_over_websocket() {
        let (_authority, url) = serve_authority().await;
        let (client, _edits) = PeerClient::connect(&url).await.unwrap();

        let seed = client.request_seed(Duration::from_secs(5)).await.unwrap();
        assert_eq!(seed, 31337);
    }

    #[tokio::test]
    async fn test_edit_and_catch_up_over_websocket() {
        let (authority, url) = serve_authority().await;
        let (client, mut edits) = PeerClient::connect(&url).await.unwrap();

        let chunk = ChunkCoord::new(4, -4);
        let pos = IVec3::new(8, 20, 8);
        client.submit_edit(chunk, pos, BlockType::Dirt).await.unwrap();

        // The submitter receives its own broadcast echo.
        let echo = edits.recv().await.unwrap();
        assert_eq!(echo.chunk, chunk);
        assert_eq!(echo.block, BlockType::Dirt);
        assert_eq!(echo.seq, 0);
        assert_eq!(authority.recorded_count(chunk), 1);

        let entries = client.request_catch_up(chunk).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].local, pos);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_remote_and_local_peers() {
        let (authority, url) = serve_authority().await;
        let (remote, mut remote_edits) = PeerClient::connect(&url).await.unwrap();
        let (_local, mut local_edits) = authority.local_peer();

        remote
            .submit_edit(ChunkCoord::new(0, 0), IVec3::new(1, 1, 1), BlockType::Rose)
            .await
            .unwrap();

        let at_local = local_edits.recv().await.unwrap();
        let at_remote = remote_edits.recv().await.unwrap();
        assert_eq!(at_local, at_remote);
        assert_eq!(at_local.block, BlockType::Rose);
    }
}
