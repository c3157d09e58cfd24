//! Static block catalog
//!
//! Every block type carries immutable metadata describing how it is drawn and
//! collided with. The catalog is built once at startup; lookups never panic -
//! unknown types fall back to a safe default entry.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// The finite set of block types a grid cell can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Air,
    Dirt,
    Stone,
    Grass,
    ShortGrass,
    Dandelion,
    Rose,
}

impl BlockType {
    pub const ALL: [BlockType; 7] = [
        BlockType::Air,
        BlockType::Dirt,
        BlockType::Stone,
        BlockType::Grass,
        BlockType::ShortGrass,
        BlockType::Dandelion,
        BlockType::Rose,
    ];

    /// Decode a raw id from the wire; out-of-range ids become `Air`.
    pub fn from_id(id: u8) -> Self {
        Self::ALL.get(id as usize).copied().unwrap_or(BlockType::Air)
    }
}

/// How a block is shaped when drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outlook {
    Cubic,
    Billboard,
    Stair,
}

/// Which material batch a block's faces belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialKind {
    Opaque,
    AlphaClip,
    AlphaBlend,
}

/// Whether a block participates in collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColliderKind {
    Collidable,
    NotCollidable,
}

/// Static per-type metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    pub outlook: Outlook,
    pub material: MaterialKind,
    pub collider: ColliderKind,
    /// Transparent blocks never occlude a neighbor's face.
    pub transparent: bool,
    /// Overrides `outlook` when building collision geometry.
    pub custom_collider_outlook: Option<Outlook>,
    pub collider_scale: Vec3,
    pub breakable: bool,
}

impl BlockInfo {
    fn solid(outlook: Outlook) -> Self {
        Self {
            outlook,
            material: MaterialKind::Opaque,
            collider: ColliderKind::Collidable,
            transparent: false,
            custom_collider_outlook: None,
            collider_scale: Vec3::ONE,
            breakable: true,
        }
    }

    fn plant() -> Self {
        Self {
            outlook: Outlook::Billboard,
            material: MaterialKind::AlphaClip,
            collider: ColliderKind::NotCollidable,
            transparent: true,
            custom_collider_outlook: Some(Outlook::Cubic),
            collider_scale: Vec3::new(0.6, 0.6, 0.6),
            breakable: true,
        }
    }

    fn air() -> Self {
        Self {
            outlook: Outlook::Cubic,
            material: MaterialKind::Opaque,
            collider: ColliderKind::NotCollidable,
            transparent: true,
            custom_collider_outlook: None,
            collider_scale: Vec3::ONE,
            breakable: false,
        }
    }
}

/// Immutable lookup table of block metadata, built once at startup.
pub struct BlockCatalog {
    entries: Vec<(BlockType, BlockInfo)>,
    fallback: BlockInfo,
}

impl BlockCatalog {
    /// Catalog for the built-in block set.
    pub fn builtin() -> Self {
        let entries = vec![
            (BlockType::Air, BlockInfo::air()),
            (BlockType::Dirt, BlockInfo::solid(Outlook::Cubic)),
            (BlockType::Stone, BlockInfo::solid(Outlook::Cubic)),
            (BlockType::Grass, BlockInfo::solid(Outlook::Cubic)),
            (BlockType::ShortGrass, BlockInfo::plant()),
            (BlockType::Dandelion, BlockInfo::plant()),
            (BlockType::Rose, BlockInfo::plant()),
        ];
        Self {
            fallback: BlockInfo::solid(Outlook::Cubic),
            entries,
        }
    }

    /// Metadata for a block type. Types without an authored entry get a
    /// solid opaque default rather than an error.
    pub fn get(&self, block: BlockType) -> &BlockInfo {
        self.entries
            .iter()
            .find(|(t, _)| *t == block)
            .map(|(_, info)| info)
            .unwrap_or(&self.fallback)
    }

    pub fn is_transparent(&self, block: BlockType) -> bool {
        self.get(block).transparent
    }

    pub fn is_breakable(&self, block: BlockType) -> bool {
        self.get(block).breakable
    }

    /// Whether `new` may be placed against the face of `hit` given the hit
    /// normal. Mirrors the permissive placement policy of the edit layer;
    /// kept as a seam so block-specific rules can hook in.
    pub fn is_placeable(&self, _hit: BlockType, _new: BlockType, _normal: glam::IVec3) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_all_types() {
        let catalog = BlockCatalog::builtin();
        for block in BlockType::ALL {
            // Must resolve without panicking, air alone is non-breakable.
            let info = catalog.get(block);
            assert_eq!(info.breakable, block != BlockType::Air);
        }
    }

    #[test]
    fn test_transparency() {
        let catalog = BlockCatalog::builtin();
        assert!(catalog.is_transparent(BlockType::Air));
        assert!(catalog.is_transparent(BlockType::ShortGrass));
        assert!(!catalog.is_transparent(BlockType::Stone));
        assert!(!catalog.is_transparent(BlockType::Grass));
    }

    #[test]
    fn test_plants_use_custom_collider() {
        let catalog = BlockCatalog::builtin();
        let rose = catalog.get(BlockType::Rose);
        assert_eq!(rose.collider, ColliderKind::NotCollidable);
        assert_eq!(rose.custom_collider_outlook, Some(Outlook::Cubic));
    }

    #[test]
    fn test_from_id_fallback() {
        assert_eq!(BlockType::from_id(2), BlockType::Stone);
        assert_eq!(BlockType::from_id(200), BlockType::Air);
    }
}
