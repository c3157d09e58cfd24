//! Procedural terrain generation using Perlin noise
//!
//! Generation is a pure function of (chunk coordinate, seed). Noise is
//! sampled at world-absolute block coordinates, never chunk-local ones, so
//! adjacent chunks continue a single global field and tile seamlessly.

use cobble_core::{BlockType, ChunkCoord, ChunkShape};
use noise::{NoiseFn, Perlin};

/// Horizontal sample scale of the ground height field.
const HEIGHT_NOISE_SCALE: f64 = 0.01;
/// Plant placement varies faster than the ground does.
const PLANT_NOISE_SCALE: f64 = 0.08;

/// Deterministic block-grid generator for one world seed.
///
/// Holds only read-only noise state and is safe to call from any number of
/// workers concurrently.
pub struct TerrainGenerator {
    shape: ChunkShape,
    height_noise: Perlin,
    plant_noise: Perlin,
}

impl TerrainGenerator {
    /// Build a generator for a seed. Any seed value is valid and yields a
    /// deterministic world.
    pub fn new(seed: u32, shape: ChunkShape) -> Self {
        Self {
            shape,
            height_noise: Perlin::new(seed),
            plant_noise: Perlin::new(seed.wrapping_add(seed)),
        }
    }

    /// Fill `blocks` (dense grid of `shape.volume()` cells) with the terrain
    /// of the chunk at `coord`.
    pub fn generate(&self, coord: ChunkCoord, blocks: &mut [BlockType]) {
        debug_assert_eq!(blocks.len(), self.shape.volume());

        let origin = coord.world_origin(self.shape);
        for x in 0..self.shape.x {
            for z in 0..self.shape.z {
                let world_x = origin.x + x;
                let world_z = origin.z + z;
                self.fill_column(x, z, world_x, world_z, blocks);
            }
        }
    }

    fn fill_column(&self, x: i32, z: i32, world_x: i32, world_z: i32, blocks: &mut [BlockType]) {
        let ground = self.ground_height(world_x, world_z);
        let stone = ground * 2 / 3;

        for y in 0..self.shape.y {
            let block = if y < stone {
                BlockType::Stone
            } else if y < ground {
                BlockType::Dirt
            } else {
                BlockType::Air
            };
            blocks[self.index(x, y, z)] = block;
        }
        blocks[self.index(x, ground - 1, z)] = BlockType::Grass;

        if ground < self.shape.y {
            if let Some(plant) = self.plant_at(world_x, world_z) {
                blocks[self.index(x, ground, z)] = plant;
            }
        }
    }

    /// Ground surface height of a world column. Capped 3 below the world
    /// height where the shape allows, and never below 1 so every column
    /// keeps a solid floor even for degenerate shapes.
    fn ground_height(&self, world_x: i32, world_z: i32) -> i32 {
        let sample = self.height_noise.get([
            world_x as f64 * HEIGHT_NOISE_SCALE,
            world_z as f64 * HEIGHT_NOISE_SCALE,
        ]);
        let normalized = (sample + 1.0) / 2.0;
        let height = (normalized * self.shape.y as f64) as i32;
        height.min(self.shape.y - 3).max(1)
    }

    fn plant_at(&self, world_x: i32, world_z: i32) -> Option<BlockType> {
        let sample = self.plant_noise.get([
            world_x as f64 * PLANT_NOISE_SCALE,
            world_z as f64 * PLANT_NOISE_SCALE,
        ]);
        let value = (sample + 1.0) / 2.0;
        if value > 0.7 {
            Some(BlockType::ShortGrass)
        } else if value < 0.2 {
            Some(BlockType::Dandelion)
        } else if value < 0.25 {
            Some(BlockType::Rose)
        } else {
            None
        }
    }

    fn index(&self, x: i32, y: i32, z: i32) -> usize {
        self.shape.block_index(glam::IVec3::new(x, y, z))
    }
}
