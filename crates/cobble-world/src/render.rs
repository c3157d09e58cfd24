//! Seam to the rendering collaborator
//!
//! The streaming core decides *which* blocks need geometry and which faces
//! are exposed; turning that into vertices, physics shapes, or GPU buffers
//! belongs to the embedding application. The backend only receives a block,
//! its catalog entry, and the six-neighbor transparency facts.

use cobble_core::{BlockInfo, BlockType};
use glam::IVec3;

/// Which of a block's six faces border a transparent neighbor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaceMask {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub front: bool,
    pub back: bool,
}

impl FaceMask {
    pub const ALL: FaceMask = FaceMask {
        up: true,
        down: true,
        left: true,
        right: true,
        front: true,
        back: true,
    };

    /// True when at least one face is exposed.
    pub fn any(&self) -> bool {
        self.up || self.down || self.left || self.right || self.front || self.back
    }
}

/// Opaque handle to drawable geometry produced by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualPart(pub u64);

/// Opaque handle to collision geometry produced by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColliderPart(pub u64);

/// External geometry builder. Implementations must be callable from worker
/// threads; rebuild passes run many chunks concurrently.
pub trait RenderBackend: Send + Sync {
    /// Drawable geometry for one block, or `None` when it contributes
    /// nothing to the chunk's visual representation.
    fn build_visual(
        &self,
        block: BlockType,
        info: &BlockInfo,
        local: IVec3,
        faces: FaceMask,
    ) -> Option<VisualPart>;

    /// Collision geometry for one block. Receives the same facts as
    /// `build_visual`; the catalog entry carries the collider class and any
    /// custom collider outlook/scale.
    fn build_collider(
        &self,
        block: BlockType,
        info: &BlockInfo,
        local: IVec3,
        faces: FaceMask,
    ) -> Option<ColliderPart>;
}

/// Backend that produces no geometry. Used by headless sessions and tests.
pub struct NullBackend;

impl RenderBackend for NullBackend {
    fn build_visual(
        &self,
        _block: BlockType,
        _info: &BlockInfo,
        _local: IVec3,
        _faces: FaceMask,
    ) -> Option<VisualPart> {
        None
    }

    fn build_collider(
        &self,
        _block: BlockType,
        _info: &BlockInfo,
        _local: IVec3,
        _faces: FaceMask,
    ) -> Option<ColliderPart> {
        None
    }
}
