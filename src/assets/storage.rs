use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{Key, SlotMap};

use crate::resources::{Geometry, GeometryHandle, Material, MaterialHandle, Texture, TextureHandle};

/// Generational pool of one resource type.
///
/// Removing an entry invalidates its handle: later lookups return `None`
/// instead of aliasing a newer resource.
#[derive(Debug, Clone)]
pub struct AssetStorage<H: Key, T> {
    map: SlotMap<H, T>,
}

impl<H: Key, T> Default for AssetStorage<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Key, T> AssetStorage<H, T> {
    #[must_use]
    pub fn new() -> Self {
        Self { map: SlotMap::with_key() }
    }

    pub fn add(&mut self, asset: impl Into<T>) -> H {
        self.map.insert(asset.into())
    }

    pub fn get(&self, handle: H) -> Option<&T> {
        self.map.get(handle)
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.map.get_mut(handle)
    }

    pub fn remove(&mut self, handle: H) -> Option<T> {
        self.map.remove(handle)
    }

    pub fn contains(&self, handle: H) -> bool {
        self.map.contains_key(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.map.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (H, &mut T)> {
        self.map.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Keeps entries for which `keep` returns true; returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(H, &T) -> bool) -> usize {
        let before = self.map.len();
        self.map.retain(|handle, asset| keep(handle, asset));
        before - self.map.len()
    }

    fn drain(&mut self) -> impl Iterator<Item = (H, T)> + '_ {
        self.map.drain()
    }
}

/// Handle translation produced when one store is merged into another.
#[derive(Debug, Default)]
pub struct AssetRemap {
    pub geometries: FxHashMap<GeometryHandle, GeometryHandle>,
    pub materials: FxHashMap<MaterialHandle, MaterialHandle>,
    pub textures: FxHashMap<TextureHandle, TextureHandle>,
}

/// Geometry, material and texture pools owned by a prefab or a scene.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    pub geometries: AssetStorage<GeometryHandle, Geometry>,
    pub materials: AssetStorage<MaterialHandle, Material>,
    pub textures: AssetStorage<TextureHandle, Texture>,
}

impl AssetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves every resource of `other` into `self`.
    ///
    /// Material texture slots are rewritten to the new texture handles.
    pub fn absorb(&mut self, mut other: AssetStore) -> AssetRemap {
        let mut remap = AssetRemap::default();

        for (old, texture) in other.textures.drain() {
            remap.textures.insert(old, self.textures.add(texture));
        }
        for (old, mut material) in other.materials.drain() {
            material.remap_textures(|h| remap.textures.get(&h).copied());
            remap.materials.insert(old, self.materials.add(material));
        }
        for (old, geometry) in other.geometries.drain() {
            remap.geometries.insert(old, self.geometries.add(geometry));
        }

        remap
    }

    /// Drops geometries and materials outside the given sets, then textures
    /// no remaining material samples. Returns the number of entries dropped.
    pub fn retain_used(
        &mut self,
        geometries: &FxHashSet<GeometryHandle>,
        materials: &FxHashSet<MaterialHandle>,
    ) -> usize {
        let mut dropped = self.geometries.retain(|h, _| geometries.contains(&h));
        dropped += self.materials.retain(|h, _| materials.contains(&h));
        let textures: FxHashSet<TextureHandle> =
            self.materials.iter().flat_map(|(_, m)| m.textures()).collect();
        dropped += self.textures.retain(|h, _| textures.contains(&h));
        dropped
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.geometries.len() + self.materials.len() + self.textures.len()
    }
}
