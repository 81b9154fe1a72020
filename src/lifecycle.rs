//! Resource lifecycle: tearing down a displayed asset.

use rustc_hash::FxHashSet;

use crate::resources::{GeometryHandle, MaterialHandle, TextureHandle};
use crate::scene::{NodeHandle, Scene};

/// What a [`dispose`] call released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposeReport {
    pub nodes: usize,
    pub meshes: usize,
    pub geometries: usize,
    pub materials: usize,
    pub textures: usize,
}

impl DisposeReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Removes `root` and its subtree from `scene` and releases every geometry,
/// material and texture the subtree's meshes reference.
///
/// The walk is iterative and completes before returning. Calling it with a
/// handle that is no longer in the scene is a no-op.
pub fn dispose(scene: &mut Scene, root: NodeHandle) -> DisposeReport {
    let mut report = DisposeReport::default();
    if scene.get_node(root).is_none() {
        return report;
    }

    let subtree = scene.subtree(root);
    scene.detach(root);

    let mut geometries: FxHashSet<GeometryHandle> = FxHashSet::default();
    let mut materials: FxHashSet<MaterialHandle> = FxHashSet::default();

    for &handle in &subtree {
        let Some(node) = scene.nodes.remove(handle) else {
            continue;
        };
        report.nodes += 1;

        if let Some(mesh) = node.mesh.and_then(|key| scene.meshes.remove(key)) {
            report.meshes += 1;
            geometries.insert(mesh.geometry);
            materials.insert(mesh.material);
        }
    }

    let mut textures: FxHashSet<TextureHandle> = FxHashSet::default();
    for handle in materials {
        if let Some(material) = scene.assets.materials.remove(handle) {
            report.materials += 1;
            textures.extend(material.textures());
        }
    }
    for handle in geometries {
        if scene.assets.geometries.remove(handle).is_some() {
            report.geometries += 1;
        }
    }
    for handle in textures {
        if scene.assets.textures.remove(handle).is_some() {
            report.textures += 1;
        }
    }

    log::debug!("Disposed subtree: {report:?}");
    report
}
