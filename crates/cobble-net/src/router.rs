//! Routing of authority replies on the peer side
//!
//! Catch-up replies are matched to their waiting request by chunk
//! coordinate. Registration happens before the request is sent, and a reply
//! that lands before anyone registered is buffered, so the exchange cannot
//! lose a reply regardless of scheduling.

use std::collections::HashMap;

use cobble_core::{BlockVariation, ChunkCoord};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::message::{RemoteEdit, ServerMessage};

/// Outcome of registering interest in a catch-up reply.
pub(crate) enum CatchUpWait {
    /// The reply already arrived; no waiting needed.
    Ready(Vec<BlockVariation>),
    Pending(oneshot::Receiver<Vec<BlockVariation>>),
}

#[derive(Default)]
struct CatchUpTable {
    waiting: HashMap<ChunkCoord, oneshot::Sender<Vec<BlockVariation>>>,
    arrived: HashMap<ChunkCoord, Vec<BlockVariation>>,
}

/// Demultiplexes the authority's message stream into pending requests and
/// the broadcast edit channel.
pub(crate) struct ReplyRouter {
    seed: Mutex<Option<oneshot::Sender<u32>>>,
    catch_ups: Mutex<CatchUpTable>,
    edits: mpsc::UnboundedSender<RemoteEdit>,
}

impl ReplyRouter {
    pub fn new(edits: mpsc::UnboundedSender<RemoteEdit>) -> Self {
        Self {
            seed: Mutex::new(None),
            catch_ups: Mutex::new(CatchUpTable::default()),
            edits,
        }
    }

    /// Arm the one-shot seed reply.
    pub fn expect_seed(&self) -> oneshot::Receiver<u32> {
        let (tx, rx) = oneshot::channel();
        *self.seed.lock() = Some(tx);
        rx
    }

    /// Register for the catch-up reply of `chunk`. Must be called before
    /// the request is sent.
    pub fn register_catch_up(&self, chunk: ChunkCoord) -> CatchUpWait {
        let mut table = self.catch_ups.lock();
        if let Some(entries) = table.arrived.remove(&chunk) {
            return CatchUpWait::Ready(entries);
        }
        let (tx, rx) = oneshot::channel();
        table.waiting.insert(chunk, tx);
        CatchUpWait::Pending(rx)
    }

    /// Dispatch one message from the authority.
    pub fn route(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::ReplySeed { seed } => {
                if let Some(tx) = self.seed.lock().take() {
                    let _ = tx.send(seed);
                }
            }
            ServerMessage::ReplyCatchUp { chunk, entries } => {
                let mut table = self.catch_ups.lock();
                match table.waiting.remove(&chunk) {
                    Some(tx) => {
                        // Waiter may have timed out meanwhile; that is fine.
                        let _ = tx.send(entries);
                    }
                    None => {
                        debug!(?chunk, "catch-up reply arrived before registration");
                        table.arrived.insert(chunk, entries);
                    }
                }
            }
            ServerMessage::BroadcastEdit {
                chunk,
                local,
                block,
                seq,
            } => {
                let _ = self.edits.send(RemoteEdit {
                    chunk,
                    local,
                    block,
                    seq,
                });
            }
        }
    }
}
