//! Known resource type ids.
//!
//! The container itself treats payloads as opaque; this table only labels
//! them for listings and picks a file extension when extracting.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceKind {
    /// SimGlide 3D model.
    S3d,
    /// FSH texture.
    Fsh,
    Xml,
    Jpeg,
    Bmp,
    /// Anything not in the table.
    Data,
}

impl ResourceKind {
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::S3d  => "S3D",
            ResourceKind::Fsh  => "FSH",
            ResourceKind::Xml  => "XML",
            ResourceKind::Jpeg => "JPEG",
            ResourceKind::Bmp  => "BMP",
            ResourceKind::Data => "data",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ResourceKind::S3d  => "s3d",
            ResourceKind::Fsh  => "fsh",
            ResourceKind::Xml  => "xml",
            ResourceKind::Jpeg => "jpg",
            ResourceKind::Bmp  => "bmp",
            ResourceKind::Data => "bin",
        }
    }
}

/// A registry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeInfo {
    pub kind:        ResourceKind,
    pub description: &'static str,
}

const fn info(kind: ResourceKind, description: &'static str) -> TypeInfo {
    TypeInfo { kind, description }
}

const KNOWN_TYPES: &[(u32, TypeInfo)] = &[
    (0xBADB_57F1, info(ResourceKind::S3d, "SimGlide 3D Model")),
    (0x5AD0_E187, info(ResourceKind::S3d, "SimGlide 3D Model")),
    (0x1ABE_787D, info(ResourceKind::Fsh, "Transit Textures/Buildings/Bridges/Misc")),
    (0x0986_135E, info(ResourceKind::Fsh, "Base and Overlay Lot Textures")),
    (0x2BC2_759A, info(ResourceKind::Fsh, "Transit Network Shadows (Masks)")),
    (0x891B_0E1A, info(ResourceKind::Fsh, "Terrain and Foundation")),
    (0x49A5_93E7, info(ResourceKind::Fsh, "Animation Sprites (Non Props)")),
    (0x2A24_58F9, info(ResourceKind::Fsh, "Animation Sprites (Props)")),
    (0x7AB5_0E44, info(ResourceKind::Fsh, "Texture File")),
    (0x8877_7601, info(ResourceKind::Xml, "XML File")),
    (0x7480_7101, info(ResourceKind::Jpeg, "Compressed Image File")),
    (0x7480_7102, info(ResourceKind::Jpeg, "Compressed Image File")),
    (0x6677_8001, info(ResourceKind::Bmp, "Bitmap Image File")),
    (0x6677_8002, info(ResourceKind::Bmp, "Bitmap Image File")),
];

const UNKNOWN: TypeInfo = info(ResourceKind::Data, "Unknown data");

/// Look up a type id; unknown ids are reported as [`ResourceKind::Data`].
pub fn lookup(type_id: u32) -> TypeInfo {
    KNOWN_TYPES
        .iter()
        .find(|(id, _)| *id == type_id)
        .map_or(UNKNOWN, |(_, info)| *info)
}
