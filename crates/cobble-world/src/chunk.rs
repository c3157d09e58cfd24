//! A single voxel chunk
//!
//! Owns one fixed-size block grid, the dirty / collider-current flags, and
//! the per-position edit sequence table used for conflict resolution. Chunk
//! objects are recycled when the render window moves; `reset` reassigns one
//! to a new coordinate without reallocating the grid.

use std::collections::HashMap;

use cobble_core::seq;
use cobble_core::{BlockCatalog, BlockType, BlockVariation, ChunkCoord, ChunkShape, ColliderKind};
use glam::IVec3;

use crate::render::{ColliderPart, FaceMask, RenderBackend, VisualPart};
use crate::terrain::TerrainGenerator;

/// Resolves a world block position to its type, across chunk boundaries.
pub type BlockLookup<'a> = dyn Fn(IVec3) -> BlockType + 'a;

pub struct Chunk {
    coord: ChunkCoord,
    shape: ChunkShape,
    blocks: Vec<BlockType>,
    dirty: bool,
    collider_current: bool,
    /// Last-seen sequence number per edited position. Absence means the
    /// position never deviated from generation.
    seq_table: HashMap<IVec3, u32>,
    max_seq_delta: u32,
    mesh: Vec<VisualPart>,
    colliders: Vec<ColliderPart>,
}

impl Chunk {
    pub fn new(coord: ChunkCoord, shape: ChunkShape, max_seq_delta: u32) -> Self {
        Self {
            coord,
            shape,
            blocks: vec![BlockType::Air; shape.volume()],
            dirty: false,
            collider_current: false,
            seq_table: HashMap::new(),
            max_seq_delta,
            mesh: Vec::new(),
            colliders: Vec::new(),
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Block data changed since the last mesh rebuild.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_collider_current(&self) -> bool {
        self.collider_current
    }

    /// Force a collider rebuild on the next reconciliation pass.
    pub fn mark_collider_stale(&mut self) {
        self.collider_current = false;
    }

    /// Reassign a recycled chunk object to a new coordinate. Clears flags,
    /// stale bookkeeping, and built geometry; the grid itself is overwritten
    /// by the next generation.
    pub fn reset(&mut self, coord: ChunkCoord) {
        self.coord = coord;
        self.dirty = false;
        self.collider_current = false;
        self.seq_table.clear();
        self.mesh.clear();
        self.colliders.clear();
    }

    /// Regenerate the grid from procedural terrain and mark the chunk dirty.
    pub fn generate_into(&mut self, generator: &TerrainGenerator) {
        generator.generate(self.coord, &mut self.blocks);
        self.dirty = true;
    }

    /// Overlay the authority's recorded variations on freshly generated
    /// terrain. This is a full resync: the sequence table is replaced
    /// wholesale, not patched.
    pub fn apply_catch_up(&mut self, entries: &[BlockVariation]) {
        self.seq_table.clear();
        for entry in entries {
            if !self.shape.contains(entry.local) {
                continue;
            }
            self.blocks[self.shape.block_index(entry.local)] = entry.block;
            self.seq_table.insert(entry.local, entry.seq);
            self.dirty = true;
        }
    }

    /// Block type at a chunk-local position. Out of bounds above the world
    /// height reads as air; any other out-of-bounds position reads as the
    /// solid boundary filler so edge chunks never expose false holes.
    pub fn local_block_type(&self, local: IVec3) -> BlockType {
        if !self.shape.contains(local) {
            if local.y >= self.shape.y {
                return BlockType::Air;
            }
            return BlockType::Stone;
        }
        self.blocks[self.shape.block_index(local)]
    }

    /// Apply one block edit. Out-of-bounds positions and (when
    /// `check_seq` is set) deliveries that fail the freshness window are
    /// silent no-ops. Dirty is raised only when the stored type actually
    /// changes. Returns the resulting dirty flag so the caller can decide
    /// whether a rebuild is due.
    pub fn apply_variation(
        &mut self,
        local: IVec3,
        block: BlockType,
        check_seq: bool,
        incoming_seq: u32,
    ) -> bool {
        if !self.shape.contains(local) {
            return self.dirty;
        }

        if check_seq {
            if let Some(&old) = self.seq_table.get(&local) {
                if seq::is_stale(old, incoming_seq, self.max_seq_delta) {
                    return self.dirty;
                }
            }
        }

        let index = self.shape.block_index(local);
        let old_block = self.blocks[index];
        self.blocks[index] = block;

        if check_seq {
            self.seq_table.insert(local, incoming_seq);
        }

        self.dirty = self.dirty || old_block != block;
        self.dirty
    }

    /// Recorded sequence number of a position, if it has ever been edited.
    pub fn recorded_seq(&self, local: IVec3) -> Option<u32> {
        self.seq_table.get(&local).copied()
    }

    /// Build the visual representation. Iterates every cell, culls faces
    /// against neighbor transparency (using `lookup` across chunk borders),
    /// and hands the exposed blocks to the backend. Pure with respect to
    /// chunk state; the caller stores the result via [`Chunk::store_mesh`].
    pub fn compute_mesh(
        &self,
        catalog: &BlockCatalog,
        backend: &dyn RenderBackend,
        lookup: &BlockLookup<'_>,
    ) -> Vec<VisualPart> {
        let mut parts = Vec::new();
        self.visit_visible(catalog, lookup, |block, local, faces| {
            let info = catalog.get(block);
            if let Some(part) = backend.build_visual(block, info, local, faces) {
                parts.push(part);
            }
        });
        parts
    }

    /// Build the collision representation. Separate from the mesh because it
    /// is more expensive and only chunks near the viewer need it.
    pub fn compute_collider(
        &self,
        catalog: &BlockCatalog,
        backend: &dyn RenderBackend,
        lookup: &BlockLookup<'_>,
    ) -> Vec<ColliderPart> {
        let mut parts = Vec::new();
        self.visit_visible(catalog, lookup, |block, local, faces| {
            let info = catalog.get(block);
            // Non-collidable blocks without a custom pick shape produce no
            // collision geometry at all.
            if info.collider == ColliderKind::NotCollidable
                && info.custom_collider_outlook.is_none()
            {
                return;
            }
            if let Some(part) = backend.build_collider(block, info, local, faces) {
                parts.push(part);
            }
        });
        parts
    }

    /// Install a freshly built mesh and clear the dirty flag.
    pub fn store_mesh(&mut self, parts: Vec<VisualPart>) {
        self.mesh = parts;
        self.dirty = false;
    }

    /// Install freshly built collision geometry and mark it current.
    pub fn store_collider(&mut self, parts: Vec<ColliderPart>) {
        self.colliders = parts;
        self.collider_current = true;
    }

    pub fn mesh_parts(&self) -> &[VisualPart] {
        &self.mesh
    }

    pub fn collider_parts(&self) -> &[ColliderPart] {
        &self.colliders
    }

    fn visit_visible(
        &self,
        catalog: &BlockCatalog,
        lookup: &BlockLookup<'_>,
        mut emit: impl FnMut(BlockType, IVec3, FaceMask),
    ) {
        let origin = self.coord.world_origin(self.shape);
        for x in 0..self.shape.x {
            for y in 0..self.shape.y {
                for z in 0..self.shape.z {
                    let local = IVec3::new(x, y, z);
                    let block = self.blocks[self.shape.block_index(local)];
                    if block == BlockType::Air {
                        continue;
                    }

                    let faces = self.face_mask(catalog, lookup, origin, local);
                    let info = catalog.get(block);
                    // A fully buried opaque block draws nothing; transparent
                    // blocks always render all their faces.
                    if !info.transparent && !faces.any() {
                        continue;
                    }
                    let faces = if info.transparent { FaceMask::ALL } else { faces };
                    emit(block, local, faces);
                }
            }
        }
    }

    fn face_mask(
        &self,
        catalog: &BlockCatalog,
        lookup: &BlockLookup<'_>,
        origin: IVec3,
        local: IVec3,
    ) -> FaceMask {
        let transparent_at = |neighbor: IVec3| -> bool {
            // Stay inside our own grid wherever the x/z column matches;
            // local_block_type handles vertical overshoot. Only a true
            // horizontal crossing consults the rest of the world.
            let in_column = neighbor.x >= 0
                && neighbor.x < self.shape.x
                && neighbor.z >= 0
                && neighbor.z < self.shape.z;
            let block = if in_column {
                self.local_block_type(neighbor)
            } else {
                lookup(origin + neighbor)
            };
            catalog.is_transparent(block)
        };

        FaceMask {
            up: transparent_at(local + IVec3::Y),
            down: transparent_at(local - IVec3::Y),
            left: transparent_at(local - IVec3::X),
            right: transparent_at(local + IVec3::X),
            front: transparent_at(local - IVec3::Z),
            back: transparent_at(local + IVec3::Z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobble_core::WorldConfig;

    fn test_chunk() -> Chunk {
        let config = WorldConfig::default();
        Chunk::new(
            ChunkCoord::new(0, 0),
            config.chunk_shape,
            config.max_seq_delta,
        )
    }

    #[test]
    fn test_local_block_type_bounds() {
        let chunk = test_chunk();

        // Above the world height reads as air, even outside the column.
        assert_eq!(
            chunk.local_block_type(IVec3::new(-1, 64, 0)),
            BlockType::Air
        );
        assert_eq!(chunk.local_block_type(IVec3::new(0, 70, 0)), BlockType::Air);

        // Any other out-of-bounds position reads as the boundary filler.
        assert_eq!(
            chunk.local_block_type(IVec3::new(-1, 5, 0)),
            BlockType::Stone
        );
        assert_eq!(
            chunk.local_block_type(IVec3::new(0, -1, 0)),
            BlockType::Stone
        );
        assert_eq!(
            chunk.local_block_type(IVec3::new(3, 2, 16)),
            BlockType::Stone
        );
    }

    #[test]
    fn test_apply_variation_sets_dirty_only_on_change() {
        let mut chunk = test_chunk();
        let pos = IVec3::new(1, 2, 3);

        // Unchecked application of the same type the cell already holds.
        assert!(!chunk.apply_variation(pos, BlockType::Air, false, 0));
        assert!(!chunk.is_dirty());

        assert!(chunk.apply_variation(pos, BlockType::Dirt, false, 0));
        assert!(chunk.is_dirty());
    }

    #[test]
    fn test_apply_variation_out_of_bounds_is_noop() {
        let mut chunk = test_chunk();
        assert!(!chunk.apply_variation(IVec3::new(-1, 0, 0), BlockType::Dirt, false, 0));
        assert!(!chunk.is_dirty());
    }

    #[test]
    fn test_sequence_checked_rejects_stale() {
        let mut chunk = test_chunk();
        let pos = IVec3::new(4, 4, 4);

        assert!(chunk.apply_variation(pos, BlockType::Dirt, true, 10));
        assert_eq!(chunk.recorded_seq(pos), Some(10));
        chunk.store_mesh(Vec::new()); // clear dirty

        // Duplicate delivery: rejected, seq unchanged.
        assert!(!chunk.apply_variation(pos, BlockType::Stone, true, 10));
        assert_eq!(chunk.local_block_type(pos), BlockType::Dirt);
        assert_eq!(chunk.recorded_seq(pos), Some(10));

        // Reordered older delivery: rejected.
        assert!(!chunk.apply_variation(pos, BlockType::Stone, true, 8));
        assert_eq!(chunk.local_block_type(pos), BlockType::Dirt);

        // Fresh delivery: applied.
        assert!(chunk.apply_variation(pos, BlockType::Stone, true, 11));
        assert_eq!(chunk.local_block_type(pos), BlockType::Stone);
        assert_eq!(chunk.recorded_seq(pos), Some(11));
    }

    #[test]
    fn test_sequence_wraparound_accepted() {
        let config = WorldConfig {
            max_seq: 1024,
            max_seq_delta: 50,
            ..Default::default()
        };
        let mut chunk = Chunk::new(
            ChunkCoord::new(0, 0),
            config.chunk_shape,
            config.max_seq_delta,
        );
        let pos = IVec3::new(0, 0, 0);

        assert!(chunk.apply_variation(pos, BlockType::Dirt, true, 1020));
        // The counter wrapped at 1024; 3 arrives next and must be applied.
        assert!(chunk.apply_variation(pos, BlockType::Grass, true, 3));
        assert_eq!(chunk.local_block_type(pos), BlockType::Grass);
    }

    #[test]
    fn test_unchecked_application_skips_seq_table() {
        let mut chunk = test_chunk();
        let pos = IVec3::new(2, 2, 2);

        // Optimistic local edits bypass the window and record nothing.
        chunk.apply_variation(pos, BlockType::Dirt, false, 0);
        assert_eq!(chunk.recorded_seq(pos), None);

        // The broadcast echo then installs the canonical number.
        chunk.apply_variation(pos, BlockType::Dirt, true, 0);
        assert_eq!(chunk.recorded_seq(pos), Some(0));
    }

    #[test]
    fn test_catch_up_replaces_bookkeeping() {
        let mut chunk = test_chunk();
        chunk.apply_variation(IVec3::new(0, 0, 0), BlockType::Dirt, true, 7);

        let entries = vec![
            BlockVariation {
                local: IVec3::new(1, 1, 1),
                block: BlockType::Rose,
                seq: 3,
            },
            BlockVariation {
                local: IVec3::new(5, 0, 5),
                block: BlockType::Air,
                seq: 0,
            },
        ];
        chunk.apply_catch_up(&entries);

        // Old bookkeeping is gone, payload entries are installed.
        assert_eq!(chunk.recorded_seq(IVec3::new(0, 0, 0)), None);
        assert_eq!(chunk.recorded_seq(IVec3::new(1, 1, 1)), Some(3));
        assert_eq!(
            chunk.local_block_type(IVec3::new(1, 1, 1)),
            BlockType::Rose
        );
        assert!(chunk.is_dirty());
    }

    #[test]
    fn test_reset_recycles_object() {
        let mut chunk = test_chunk();
        chunk.apply_variation(IVec3::new(0, 0, 0), BlockType::Dirt, true, 1);
        chunk.store_mesh(vec![VisualPart(1)]);
        chunk.store_collider(vec![ColliderPart(1)]);

        chunk.reset(ChunkCoord::new(5, -2));
        assert_eq!(chunk.coord(), ChunkCoord::new(5, -2));
        assert!(!chunk.is_dirty());
        assert!(!chunk.is_collider_current());
        assert!(chunk.mesh_parts().is_empty());
        assert_eq!(chunk.recorded_seq(IVec3::new(0, 0, 0)), None);
    }

    #[test]
    fn test_mesh_culls_buried_blocks() {
        use crate::render::NullBackend;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingBackend(AtomicUsize);
        impl RenderBackend for CountingBackend {
            fn build_visual(
                &self,
                _block: BlockType,
                _info: &cobble_core::BlockInfo,
                _local: IVec3,
                faces: FaceMask,
            ) -> Option<VisualPart> {
                assert!(faces.any());
                let n = self.0.fetch_add(1, Ordering::Relaxed);
                Some(VisualPart(n as u64))
            }
            fn build_collider(
                &self,
                _block: BlockType,
                _info: &cobble_core::BlockInfo,
                _local: IVec3,
                _faces: FaceMask,
            ) -> Option<ColliderPart> {
                None
            }
        }

        let catalog = BlockCatalog::builtin();
        let config = WorldConfig::default();
        let mut chunk = test_chunk();
        let generator = TerrainGenerator::new(5, config.chunk_shape);
        chunk.generate_into(&generator);

        // Everything outside the chunk is solid stone, so only upward-facing
        // surface blocks (and transparent plants) survive culling.
        let lookup = |p: IVec3| {
            if p.y >= config.chunk_shape.y {
                BlockType::Air
            } else {
                BlockType::Stone
            }
        };

        let backend = CountingBackend(AtomicUsize::new(0));
        let parts = chunk.compute_mesh(&catalog, &backend, &lookup);
        let emitted = backend.0.load(Ordering::Relaxed);
        assert_eq!(parts.len(), emitted);
        assert!(emitted > 0);
        // Far fewer blocks than the grid holds reach the backend.
        assert!(emitted < config.chunk_shape.volume() / 4);

        // Null backend produces an empty mesh but still clears dirty on store.
        let none = chunk.compute_mesh(&catalog, &NullBackend, &lookup);
        assert!(none.is_empty());
        chunk.store_mesh(none);
        assert!(!chunk.is_dirty());
    }
}
