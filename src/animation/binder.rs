use crate::animation::binding::PropertyBinding;
use crate::animation::clip::AnimationClip;
use crate::scene::{NodeHandle, Scene};

pub struct Binder;

impl Binder {
    /// Resolves every track of `clip` to a node below `root` by name.
    /// Tracks naming no node in the subtree are dropped.
    #[must_use]
    pub fn bind(scene: &Scene, root: NodeHandle, clip: &AnimationClip) -> Vec<PropertyBinding> {
        let bindings: Vec<_> = clip
            .tracks
            .iter()
            .enumerate()
            .filter_map(|(track_index, track)| {
                let node_handle = scene.find_node_by_name(root, &track.meta.node_name)?;
                Some(PropertyBinding {
                    track_index,
                    node_handle,
                    target: track.meta.target,
                })
            })
            .collect();

        if bindings.len() < clip.tracks.len() {
            log::warn!(
                "Clip `{}`: {} of {} tracks target unknown nodes",
                clip.name,
                clip.tracks.len() - bindings.len(),
                clip.tracks.len()
            );
        }
        bindings
    }
}
