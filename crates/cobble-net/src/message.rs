//! Wire protocol between peers and the authority
//!
//! Messages travel as JSON text frames over one reliable, ordered channel
//! per connection. Ordering across connections is not assumed anywhere; the
//! per-position sequence window does the conflict resolution.

use cobble_core::{BlockType, BlockVariation, ChunkCoord};
use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Identity of one connected process. Assigned by the authority for local
/// peers; remote peers self-assign a random id, and the authority routes
/// replies by connection rather than trusting the embedded field.
pub type PeerId = u64;

/// Peer → authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for the session seed. Sent once on join; the authority is the
    /// only source of truth for it.
    RequestSeed { requester: PeerId },

    /// Ask for every recorded variation of a chunk. Sent whenever the chunk
    /// is (re)loaded locally.
    RequestCatchUp { requester: PeerId, chunk: ChunkCoord },

    /// Submit one block edit for authoritative sequencing.
    SubmitEdit {
        requester: PeerId,
        chunk: ChunkCoord,
        local: IVec3,
        block: BlockType,
    },
}

/// Authority → peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ReplySeed { seed: u32 },

    /// Full variation record of one chunk; empty when nothing was ever
    /// edited there.
    ReplyCatchUp {
        chunk: ChunkCoord,
        entries: Vec<BlockVariation>,
    },

    /// An accepted edit, fanned out to every peer including the submitter
    /// so its optimistic local value picks up the canonical sequence
    /// number.
    BroadcastEdit {
        chunk: ChunkCoord,
        local: IVec3,
        block: BlockType,
        seq: u32,
    },
}

/// A broadcast edit, surfaced to the embedding session for application to
/// its world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteEdit {
    pub chunk: ChunkCoord,
    pub local: IVec3,
    pub block: BlockType,
    pub seq: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_round_trip() {
        let messages = [
            ClientMessage::RequestSeed { requester: 7 },
            ClientMessage::RequestCatchUp {
                requester: 7,
                chunk: ChunkCoord::new(-3, 12),
            },
            ClientMessage::SubmitEdit {
                requester: 7,
                chunk: ChunkCoord::new(0, 0),
                local: IVec3::new(1, 2, 3),
                block: BlockType::Rose,
            },
        ];
        for msg in messages {
            let json = serde_json::to_string(&msg).unwrap();
            let back: ClientMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn test_server_messages_round_trip() {
        let messages = [
            ServerMessage::ReplySeed { seed: 0xDEAD_BEEF },
            ServerMessage::ReplyCatchUp {
                chunk: ChunkCoord::new(5, 5),
                entries: vec![BlockVariation {
                    local: IVec3::new(0, 63, 15),
                    block: BlockType::Air,
                    seq: 99,
                }],
            },
            ServerMessage::BroadcastEdit {
                chunk: ChunkCoord::new(-1, -1),
                local: IVec3::new(15, 0, 15),
                block: BlockType::Stone,
                seq: 0,
            },
        ];
        for msg in messages {
            let json = serde_json::to_string(&msg).unwrap();
            let back: ServerMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn test_wire_format_is_tagged() {
        let json = serde_json::to_string(&ServerMessage::ReplySeed { seed: 1 }).unwrap();
        assert!(json.contains("\"type\":\"reply_seed\""));
    }
}
