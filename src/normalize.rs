//! Post-load normalisation: every model is centred on the origin before
//! it is displayed.

use glam::Vec3;

use crate::assets::prefab::Prefab;
use crate::resources::BoundingBox;

/// Measurements taken while centring a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// World-space bounds after centring.
    pub bounding_box: BoundingBox,
    /// Centre of the bounds before centring.
    pub center: Vec3,
    /// Extent after centring.
    pub size: Vec3,
    /// Extent before centring.
    pub original_size: Vec3,
    /// Translation applied to the root.
    pub offset: Vec3,
}

/// Translates the prefab root so its world-space bounds are centred on
/// the origin. `None` when the prefab has no measurable geometry.
pub fn normalize(prefab: &mut Prefab) -> Option<Normalization> {
    let original = prefab.compute_bounding_box()?;
    let center = original.center();
    let offset = -center;

    prefab.root_mut().transform.position += offset;
    let centered = prefab.compute_bounding_box()?;

    Some(Normalization {
        bounding_box: centered,
        center,
        size: centered.size(),
        original_size: original.size(),
        offset,
    })
}
