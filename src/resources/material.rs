use glam::{Vec3, Vec4};
use uuid::Uuid;

use super::TextureHandle;

/// Which faces are rasterised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// Shading model and its model-specific parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialKind {
    /// Unlit, used by helpers.
    Basic,
    /// Blinn-Phong, produced by OBJ/MTL, FBX, PLY and STL.
    Phong { specular: Vec3, shininess: f32 },
    /// Metallic-roughness PBR, produced by glTF.
    Standard { roughness: f32, metalness: f32 },
}

#[derive(Debug, Clone)]
pub struct Material {
    pub uuid: Uuid,
    pub name: String,
    pub kind: MaterialKind,

    /// Base color (RGBA).
    pub color: Vec4,
    pub emissive: Vec3,
    pub opacity: f32,
    pub transparent: bool,
    pub alpha_mode: AlphaMode,
    pub side: Side,
    /// Multiply the base color with the per-vertex `color` attribute.
    pub vertex_colors: bool,

    pub map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    pub emissive_map: Option<TextureHandle>,
    pub roughness_metalness_map: Option<TextureHandle>,
}

/// `0xRRGGBB` to normalized RGB.
#[must_use]
pub fn rgb_from_hex(hex: u32) -> Vec3 {
    Vec3::new(
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    )
}

impl Material {
    fn with_kind(kind: MaterialKind, color: Vec4) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: String::new(),
            kind,
            color,
            emissive: Vec3::ZERO,
            opacity: color.w,
            transparent: color.w < 1.0,
            alpha_mode: if color.w < 1.0 { AlphaMode::Blend } else { AlphaMode::Opaque },
            side: Side::Front,
            vertex_colors: false,
            map: None,
            normal_map: None,
            emissive_map: None,
            roughness_metalness_map: None,
        }
    }

    #[must_use]
    pub fn new_basic(color: Vec4) -> Self {
        Self::with_kind(MaterialKind::Basic, color)
    }

    #[must_use]
    pub fn new_phong(color: Vec4, specular: Vec3, shininess: f32) -> Self {
        Self::with_kind(MaterialKind::Phong { specular, shininess }, color)
    }

    #[must_use]
    pub fn new_standard(color: Vec4, roughness: f32, metalness: f32) -> Self {
        Self::with_kind(MaterialKind::Standard { roughness, metalness }, color)
    }

    /// Uniform grey Phong material used when a format carries no material
    /// of its own.
    #[must_use]
    pub fn fallback(specular_hex: u32) -> Self {
        let mut material = Self::new_phong(
            rgb_from_hex(0x0088_8888).extend(1.0),
            rgb_from_hex(specular_hex),
            100.0,
        );
        material.name = "default".to_string();
        material
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_vertex_colors(mut self, enabled: bool) -> Self {
        self.vertex_colors = enabled;
        self
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
        self.color.w = self.opacity;
        self.transparent = self.opacity < 1.0;
        if self.transparent {
            self.alpha_mode = AlphaMode::Blend;
        }
    }

    /// Every texture slot that is in use.
    pub fn textures(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        [self.map, self.normal_map, self.emissive_map, self.roughness_metalness_map]
            .into_iter()
            .flatten()
    }

    /// Rewrites texture slots; slots `f` maps to `None` are cleared.
    pub fn remap_textures(&mut self, mut f: impl FnMut(TextureHandle) -> Option<TextureHandle>) {
        for slot in [
            &mut self.map,
            &mut self.normal_map,
            &mut self.emissive_map,
            &mut self.roughness_metalness_map,
        ] {
            *slot = slot.and_then(&mut f);
        }
    }
}
