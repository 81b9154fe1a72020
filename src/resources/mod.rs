//! CPU-side resource definitions
//!
//! - Geometry: vertex attributes, indices and bounding volumes
//! - Material: shading parameters and texture slots
//! - Texture: decoded RGBA images
//! - Mesh: geometry + material pairing referenced by scene nodes
//! - primitives: procedural helper geometry

pub mod geometry;
pub mod material;
pub mod mesh;
pub mod primitives;
pub mod texture;

use slotmap::new_key_type;

pub use geometry::{Attribute, BoundingBox, BoundingSphere, Geometry, PrimitiveTopology, VertexFormat};
pub use material::{AlphaMode, Material, MaterialKind, Side};
pub use mesh::Mesh;
pub use texture::Texture;

new_key_type! {
    pub struct GeometryHandle;
    pub struct MaterialHandle;
    pub struct TextureHandle;
}
