//! Chunk and block coordinate math
//!
//! Chunks tile the horizontal plane; the world is unbounded in x/z and has a
//! fixed height. All conversions floor toward negative infinity so negative
//! world positions land in the right chunk.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Grid coordinate of a chunk in the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a continuous world position.
    pub fn from_world_pos(pos: Vec3, shape: ChunkShape) -> Self {
        Self {
            x: (pos.x / shape.x as f32).floor() as i32,
            z: (pos.z / shape.z as f32).floor() as i32,
        }
    }

    /// Chunk containing an integer block position.
    pub fn from_block_pos(block: IVec3, shape: ChunkShape) -> Self {
        Self {
            x: div_floor(block.x, shape.x),
            z: div_floor(block.z, shape.z),
        }
    }

    /// World-space origin (min corner) of this chunk.
    pub fn world_origin(&self, shape: ChunkShape) -> IVec3 {
        IVec3::new(self.x * shape.x, 0, self.z * shape.z)
    }

    /// Manhattan distance to another chunk coordinate.
    pub fn manhattan_distance(&self, other: &ChunkCoord) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.z - other.z).unsigned_abs()
    }

    /// This coordinate shifted by a horizontal offset.
    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// The four horizontal neighbors (±x, ±z).
    pub fn neighbors(&self) -> [ChunkCoord; 4] {
        [
            self.offset(1, 0),
            self.offset(-1, 0),
            self.offset(0, 1),
            self.offset(0, -1),
        ]
    }
}

/// Fixed 3D extent of every chunk in the world. Global per world, never
/// varies per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkShape {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkShape {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Number of blocks in one chunk.
    pub fn volume(&self) -> usize {
        (self.x * self.y * self.z) as usize
    }

    /// Whether a chunk-local position lies inside the chunk.
    pub fn contains(&self, local: IVec3) -> bool {
        local.x >= 0
            && local.x < self.x
            && local.y >= 0
            && local.y < self.y
            && local.z >= 0
            && local.z < self.z
    }

    /// Dense index of an in-bounds local position.
    pub fn block_index(&self, local: IVec3) -> usize {
        ((local.x * self.y + local.y) * self.z + local.z) as usize
    }

    /// Chunk-local position of an integer world block position.
    pub fn block_local_pos(&self, world: IVec3) -> IVec3 {
        world - ChunkCoord::from_block_pos(world, *self).world_origin(*self)
    }
}

impl Default for ChunkShape {
    fn default() -> Self {
        Self::new(16, 64, 16)
    }
}

fn div_floor(a: i32, b: i32) -> i32 {
    let q = a / b;
    if a % b != 0 && (a < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_from_world_pos() {
        let shape = ChunkShape::default();

        assert_eq!(
            ChunkCoord::from_world_pos(Vec3::new(0.0, 0.0, 0.0), shape),
            ChunkCoord::new(0, 0)
        );
        assert_eq!(
            ChunkCoord::from_world_pos(Vec3::new(17.0, 30.0, 33.0), shape),
            ChunkCoord::new(1, 2)
        );
        assert_eq!(
            ChunkCoord::from_world_pos(Vec3::new(-1.0, 0.0, -17.0), shape),
            ChunkCoord::new(-1, -2)
        );
    }

    #[test]
    fn test_chunk_coord_from_block_pos() {
        let shape = ChunkShape::default();

        assert_eq!(
            ChunkCoord::from_block_pos(IVec3::new(15, 0, 16), shape),
            ChunkCoord::new(0, 1)
        );
        assert_eq!(
            ChunkCoord::from_block_pos(IVec3::new(-16, 0, -1), shape),
            ChunkCoord::new(-1, -1)
        );
    }

    #[test]
    fn test_block_local_pos() {
        let shape = ChunkShape::default();

        assert_eq!(
            shape.block_local_pos(IVec3::new(17, 5, 16)),
            IVec3::new(1, 5, 0)
        );
        assert_eq!(
            shape.block_local_pos(IVec3::new(-1, 0, -16)),
            IVec3::new(15, 0, 0)
        );
    }

    #[test]
    fn test_manhattan_distance() {
        let a = ChunkCoord::new(0, 0);
        let b = ChunkCoord::new(3, -2);
        assert_eq!(a.manhattan_distance(&b), 5);
        assert_eq!(b.manhattan_distance(&a), 5);
    }

    #[test]
    fn test_block_index_round_trip() {
        let shape = ChunkShape::new(4, 8, 4);
        let mut seen = std::collections::HashSet::new();
        for x in 0..4 {
            for y in 0..8 {
                for z in 0..4 {
                    let idx = shape.block_index(IVec3::new(x, y, z));
                    assert!(idx < shape.volume());
                    assert!(seen.insert(idx), "index collision at ({x},{y},{z})");
                }
            }
        }
    }
}
