//! Chunk streaming manager
//!
//! Maintains exactly the set of chunks named by `center + render_order[i]`,
//! recycling chunk objects as the viewer moves, and runs the reconciliation
//! passes that regenerate data and rebuild meshes/colliders. At most one
//! pass is in flight at a time; every entry point queues on the same lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cobble_core::{BlockCatalog, BlockType, ChunkCoord, ChunkShape, WorldConfig};
use futures_util::future::join_all;
use glam::IVec3;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::render::RenderBackend;
use crate::sync::{ChunkSync, SyncError};
use crate::terrain::TerrainGenerator;

/// Errors a reconciliation pass can surface. Bounds violations, stale
/// sequence numbers, and edits outside the window are deliberately *not*
/// errors; they are silent no-ops that self-heal.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("chunk sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("worker task failed")]
    Worker,
}

/// A raycast result against the voxel grid, produced by the (external)
/// interaction layer and consumed by the break/place front-ends.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub chunk: ChunkCoord,
    pub block_local: IVec3,
    pub block_world: IVec3,
    /// Unit normal of the face that was hit.
    pub face_normal: IVec3,
}

type ChunkCell = Arc<RwLock<Chunk>>;

struct WorldState {
    chunks: HashMap<ChunkCoord, ChunkCell>,
    render_order: Vec<(i32, i32)>,
    center: ChunkCoord,
    /// Number of chunk data (re)generations scheduled so far.
    data_syncs: u64,
}

/// The streaming world: working set of chunks, render order, and the
/// reconciliation passes that keep them consistent.
pub struct World {
    config: WorldConfig,
    catalog: Arc<BlockCatalog>,
    generator: Arc<TerrainGenerator>,
    backend: Arc<dyn RenderBackend>,
    sync: Arc<dyn ChunkSync>,
    state: Mutex<WorldState>,
}

impl World {
    pub fn new(
        config: WorldConfig,
        catalog: Arc<BlockCatalog>,
        generator: Arc<TerrainGenerator>,
        backend: Arc<dyn RenderBackend>,
        sync: Arc<dyn ChunkSync>,
    ) -> Self {
        let render_order = render_order(config.view_distance);
        Self {
            config,
            catalog,
            generator,
            backend,
            sync,
            state: Mutex::new(WorldState {
                chunks: HashMap::new(),
                render_order,
                center: ChunkCoord::new(0, 0),
                data_syncs: 0,
            }),
        }
    }

    /// Discard the current working set and build the full render window
    /// around `center`: concurrent generation + catch-up for every slot,
    /// then meshes for all and colliders within the fast-update radius.
    pub async fn init(&self, center: ChunkCoord) -> Result<(), WorldError> {
        let mut state = self.state.lock().await;
        state.center = center;
        state.chunks.clear();

        let mut fresh = Vec::with_capacity(state.render_order.len());
        let render_order = state.render_order.clone();
        for &(dx, dz) in &render_order {
            let coord = center.offset(dx, dz);
            let cell: ChunkCell = Arc::new(RwLock::new(Chunk::new(
                coord,
                self.config.chunk_shape,
                self.config.max_seq_delta,
            )));
            state.chunks.insert(coord, cell.clone());
            fresh.push((coord, cell));
        }

        self.sync_all_data(&mut state, fresh).await?;
        self.rebuild(&mut state).await;

        info!(chunks = state.chunks.len(), "world initialized");
        Ok(())
    }

    /// One reconciliation pass. Restreams the window when the center moved,
    /// then rebuilds whatever the dirty flags demand. Returns only after
    /// every scheduled rebuild completed.
    pub async fn update(&self, new_center: ChunkCoord) -> Result<(), WorldError> {
        let mut state = self.state.lock().await;
        if new_center != state.center {
            self.restream(&mut state, new_center).await?;
        }
        self.rebuild(&mut state).await;
        Ok(())
    }

    /// Apply a sequence-checked broadcast from the authority. Edits that
    /// land outside the current window are dropped; the authoritative store
    /// still has them and the chunk catches up when it re-enters.
    pub async fn apply_remote_edit(
        &self,
        chunk: ChunkCoord,
        local: IVec3,
        block: BlockType,
        seq: u32,
    ) {
        let mut state = self.state.lock().await;
        let Some(cell) = state.chunks.get(&chunk) else {
            debug!(?chunk, "edit for non-resident chunk dropped");
            return;
        };
        let dirtied = cell.write().apply_variation(local, block, true, seq);
        if dirtied && chunk.manhattan_distance(&state.center) <= self.config.fast_update_distance {
            // Localized fast path: near edits become visible without waiting
            // for the periodic pass.
            self.rebuild(&mut state).await;
        }
    }

    /// Apply an edit optimistically and submit it to the authority. The
    /// local application skips the sequence check; the broadcast echo later
    /// reconciles the canonical sequence number.
    pub async fn submit_edit(
        &self,
        chunk: ChunkCoord,
        local: IVec3,
        block: BlockType,
    ) -> Result<(), WorldError> {
        {
            let mut state = self.state.lock().await;
            let Some(cell) = state.chunks.get(&chunk) else {
                return Ok(());
            };
            let dirtied = cell.write().apply_variation(local, block, false, 0);
            if dirtied
                && chunk.manhattan_distance(&state.center) <= self.config.fast_update_distance
            {
                self.rebuild(&mut state).await;
            }
        }
        self.sync.submit_edit(chunk, local, block).await?;
        Ok(())
    }

    /// Break the block a raycast hit, if the catalog allows it.
    pub async fn break_block(&self, hit: &RayHit) -> Result<(), WorldError> {
        {
            let state = self.state.lock().await;
            let Some(cell) = state.chunks.get(&hit.chunk) else {
                return Ok(());
            };
            if !self.config.chunk_shape.contains(hit.block_local) {
                return Ok(());
            }
            let current = cell.read().local_block_type(hit.block_local);
            if !self.catalog.is_breakable(current) {
                return Ok(());
            }
        }
        self.submit_edit(hit.chunk, hit.block_local, BlockType::Air)
            .await
    }

    /// Place `block` against the face a raycast hit. `occupied` reports
    /// whether a world cell is blocked by an avatar; placement into an
    /// occupied cell is refused.
    pub async fn place_block(
        &self,
        hit: &RayHit,
        block: BlockType,
        occupied: &(dyn Fn(IVec3) -> bool + Sync),
    ) -> Result<(), WorldError> {
        let shape = self.config.chunk_shape;
        let target_world = hit.block_world + hit.face_normal;
        let target_chunk = ChunkCoord::from_block_pos(target_world, shape);
        let target_local = shape.block_local_pos(target_world);

        {
            let state = self.state.lock().await;
            if !state.chunks.contains_key(&hit.chunk)
                || !state.chunks.contains_key(&target_chunk)
            {
                return Ok(());
            }
            if !shape.contains(hit.block_local) || !shape.contains(target_local) {
                return Ok(());
            }
            let hit_type = state.chunks[&hit.chunk]
                .read()
                .local_block_type(hit.block_local);
            if !self.catalog.is_placeable(hit_type, block, hit.face_normal) {
                return Ok(());
            }
            if occupied(target_world) {
                return Ok(());
            }
        }
        self.submit_edit(target_chunk, target_local, block).await
    }

    /// Block type at an integer world position. Above the world height this
    /// is air; positions in non-resident chunks read as the solid boundary
    /// filler.
    pub async fn block_type_at(&self, world: IVec3) -> BlockType {
        let state = self.state.lock().await;
        ChunkIndex::new(self.config.chunk_shape, &state.chunks).block_type_at(world)
    }

    /// Coordinates currently resident in the window.
    pub async fn resident_chunks(&self) -> Vec<ChunkCoord> {
        let state = self.state.lock().await;
        state.chunks.keys().copied().collect()
    }

    /// Total chunk data generations scheduled since creation. Lets callers
    /// (and tests) observe how much restreaming a move caused.
    pub async fn data_sync_count(&self) -> u64 {
        self.state.lock().await.data_syncs
    }

    /// Whether a resident chunk still needs a mesh rebuild.
    pub async fn is_chunk_dirty(&self, chunk: ChunkCoord) -> Option<bool> {
        let state = self.state.lock().await;
        state.chunks.get(&chunk).map(|cell| cell.read().is_dirty())
    }

    /// Number of visual parts in a resident chunk's built mesh.
    pub async fn mesh_part_count(&self, chunk: ChunkCoord) -> Option<usize> {
        let state = self.state.lock().await;
        state
            .chunks
            .get(&chunk)
            .map(|cell| cell.read().mesh_parts().len())
    }

    /// Diff the window against the new center: retained coordinates keep
    /// their chunk object, evicted objects are donated to entering
    /// coordinates in insertion order, and every donation regenerates.
    async fn restream(
        &self,
        state: &mut WorldState,
        new_center: ChunkCoord,
    ) -> Result<(), WorldError> {
        let mut retained = HashMap::with_capacity(state.render_order.len());
        let mut entering = Vec::new();

        for &(dx, dz) in &state.render_order {
            let coord = new_center.offset(dx, dz);
            match state.chunks.remove(&coord) {
                Some(cell) => {
                    retained.insert(coord, cell);
                }
                None => entering.push(coord),
            }
        }

        // Whatever is left in the old map fell out of the window; donate
        // those objects to the entering coordinates. No nearest-reuse
        // heuristic: any free object will do.
        let mut donors: Vec<ChunkCell> = state.chunks.drain().map(|(_, cell)| cell).collect();
        debug_assert_eq!(donors.len(), entering.len());

        let mut assigned = Vec::with_capacity(entering.len());
        for &coord in &entering {
            let cell = donors.pop().ok_or(WorldError::Worker)?;
            retained.insert(coord, cell.clone());
            assigned.push((coord, cell));
        }

        state.chunks = retained;
        state.center = new_center;
        debug!(
            ?new_center,
            entering = assigned.len(),
            "render window moved"
        );

        self.sync_all_data(state, assigned).await
    }

    /// Generate + catch up a batch of chunks concurrently, waiting for all.
    async fn sync_all_data(
        &self,
        state: &mut WorldState,
        cells: Vec<(ChunkCoord, ChunkCell)>,
    ) -> Result<(), WorldError> {
        state.data_syncs += cells.len() as u64;
        let results = join_all(
            cells
                .into_iter()
                .map(|(coord, cell)| self.sync_chunk_data(coord, cell)),
        )
        .await;
        results.into_iter().collect()
    }

    /// The data path of one chunk: reset to its (new) coordinate, regenerate
    /// on a worker, then block on the authoritative catch-up exchange. A
    /// timed-out catch-up keeps the generated terrain; the next reload
    /// self-heals.
    async fn sync_chunk_data(&self, coord: ChunkCoord, cell: ChunkCell) -> Result<(), WorldError> {
        let generator = self.generator.clone();
        let worker_cell = cell.clone();
        tokio::task::spawn_blocking(move || {
            let mut chunk = worker_cell.write();
            chunk.reset(coord);
            chunk.generate_into(&generator);
        })
        .await
        .map_err(|_| WorldError::Worker)?;

        let reply = self.sync.request_catch_up(coord);
        match tokio::time::timeout(self.config.catch_up_timeout(), reply).await {
            Ok(Ok(entries)) => {
                if !entries.is_empty() {
                    cell.write().apply_catch_up(&entries);
                }
                Ok(())
            }
            Ok(Err(err)) => Err(WorldError::Sync(err)),
            Err(_) => {
                warn!(?coord, "catch-up timed out, keeping generated terrain");
                Ok(())
            }
        }
    }

    /// Rebuild meshes for every chunk that is dirty or has a dirty
    /// horizontal neighbor (a neighbor's edit can change face culling at the
    /// shared boundary), and colliders for stale chunks within the
    /// fast-update radius. All rebuilds of one pass run concurrently.
    async fn rebuild(&self, state: &mut WorldState) {
        let dirty: HashSet<ChunkCoord> = state
            .chunks
            .iter()
            .filter(|(_, cell)| cell.read().is_dirty())
            .map(|(&coord, _)| coord)
            .collect();

        let index = ChunkIndex::new(self.config.chunk_shape, &state.chunks);
        let mut jobs = Vec::new();

        for &(dx, dz) in &state.render_order {
            let coord = state.center.offset(dx, dz);
            let Some(cell) = state.chunks.get(&coord) else {
                continue;
            };

            let needs_mesh = dirty.contains(&coord)
                || coord.neighbors().iter().any(|n| dirty.contains(n));
            if needs_mesh {
                cell.write().mark_collider_stale();
            }

            let near = (dx.unsigned_abs() + dz.unsigned_abs()) <= self.config.fast_update_distance;
            let needs_collider = near && !cell.read().is_collider_current();

            if needs_mesh || needs_collider {
                jobs.push((cell.clone(), needs_mesh, needs_collider));
            }
        }

        if jobs.is_empty() {
            return;
        }
        debug!(rebuilds = jobs.len(), "rebuild pass");

        join_all(jobs.into_iter().map(|(cell, mesh, collider)| {
            self.rebuild_chunk(cell, index.clone(), mesh, collider)
        }))
        .await;
    }

    async fn rebuild_chunk(&self, cell: ChunkCell, index: ChunkIndex, mesh: bool, collider: bool) {
        let catalog = self.catalog.clone();
        let backend = self.backend.clone();
        let result = tokio::task::spawn_blocking(move || {
            let lookup = |world: IVec3| index.block_type_at(world);
            if mesh {
                let parts = cell.read().compute_mesh(&catalog, &*backend, &lookup);
                cell.write().store_mesh(parts);
            }
            if collider {
                let parts = cell.read().compute_collider(&catalog, &*backend, &lookup);
                cell.write().store_collider(parts);
            }
        })
        .await;
        if result.is_err() {
            warn!("chunk rebuild worker panicked");
        }
    }
}

/// Snapshot of the chunk map used by rebuild workers to resolve block types
/// across chunk boundaries.
#[derive(Clone)]
struct ChunkIndex {
    shape: ChunkShape,
    chunks: HashMap<ChunkCoord, ChunkCell>,
}

impl ChunkIndex {
    fn new(shape: ChunkShape, chunks: &HashMap<ChunkCoord, ChunkCell>) -> Self {
        Self {
            shape,
            chunks: chunks.clone(),
        }
    }

    fn block_type_at(&self, world: IVec3) -> BlockType {
        if world.y >= self.shape.y {
            return BlockType::Air;
        }
        let coord = ChunkCoord::from_block_pos(world, self.shape);
        match self.chunks.get(&coord) {
            Some(cell) => cell.read().local_block_type(self.shape.block_local_pos(world)),
            // Never report a hole where the world simply is not loaded.
            None => BlockType::Stone,
        }
    }
}

/// Offsets of the render window, concentric rings innermost-first so nearby
/// chunks are always handled before farther ones when the budget is tight.
fn render_order(view_distance: u32) -> Vec<(i32, i32)> {
    let d = view_distance as i32;
    let mut order = Vec::with_capacity(((2 * d + 1) * (2 * d + 1)) as usize);
    for ring in 0..=d {
        for dx in -ring..=ring {
            for dz in -ring..=ring {
                if dx.abs().max(dz.abs()) == ring {
                    order.push((dx, dz));
                }
            }
        }
    }
    order
}
