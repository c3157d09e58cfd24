//! Cobble Net - authoritative edit synchronization
//!
//! One authoritative process (the host) owns the session seed and the record
//! of every block that ever deviated from procedural generation. Any number
//! of peers submit edits, receive sequence-numbered broadcasts, and bulk
//! catch up whenever they (re)load a chunk. Duplicate and out-of-order
//! delivery is tolerated by the per-position freshness window; lost
//! broadcasts self-heal on the next catch-up.

pub mod authority;
pub mod client;
pub mod message;
pub mod store;

mod router;

pub use authority::{Authority, LocalPeer};
pub use client::PeerClient;
pub use message::{ClientMessage, PeerId, RemoteEdit, ServerMessage};
pub use store::VariationStore;

use thiserror::Error;

/// Failures of the sync transport.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,

    #[error("request timed out")]
    Timeout,
}

impl From<NetError> for cobble_world::SyncError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Closed => cobble_world::SyncError::Closed,
            other => cobble_world::SyncError::Transport(other.to_string()),
        }
    }
}
