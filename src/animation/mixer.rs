use std::sync::Arc;

use crate::animation::action::{AnimationAction, LoopMode, TrackValue};
use crate::animation::binder::Binder;
use crate::animation::binding::TargetPath;
use crate::animation::clip::AnimationClip;
use crate::scene::{NodeHandle, Scene};

/// Owns the actions of one instantiated asset and writes their sampled
/// values into the scene each frame.
#[derive(Debug, Default)]
pub struct AnimationMixer {
    actions: Vec<AnimationAction>,
}

impl AnimationMixer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one stopped action per clip, bound to nodes below `root`.
    #[must_use]
    pub fn from_clips(scene: &Scene, root: NodeHandle, clips: &[AnimationClip]) -> Self {
        let actions = clips
            .iter()
            .map(|clip| {
                let bindings = Binder::bind(scene, root, clip);
                AnimationAction::new(Arc::new(clip.clone())).with_bindings(bindings)
            })
            .collect();
        Self { actions }
    }

    #[must_use]
    pub fn actions(&self) -> &[AnimationAction] {
        &self.actions
    }

    pub fn action_mut(&mut self, index: usize) -> Option<&mut AnimationAction> {
        self.actions.get_mut(index)
    }

    /// Starts action `index` with the given loop settings.
    pub fn play(&mut self, index: usize, mode: LoopMode, repetitions: Option<u32>) -> bool {
        let Some(action) = self.actions.get_mut(index) else {
            return false;
        };
        action.loop_mode = mode;
        action.repetitions = repetitions;
        action.play();
        true
    }

    /// Index and clip name of every running action.
    pub fn running(&self) -> impl Iterator<Item = (usize, &str)> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_running())
            .map(|(i, a)| (i, a.clip().name.as_str()))
    }

    pub fn update(&mut self, dt: f32, scene: &mut Scene) {
        for action in &mut self.actions {
            action.update(dt);
            if !action.enabled || action.weight <= 0.0 {
                continue;
            }

            for i in 0..action.bindings.len() {
                let binding = action.bindings[i];
                let Some(value) = action.sample_track(binding.track_index) else {
                    continue;
                };
                let Some(node) = scene.get_node_mut(binding.node_handle) else {
                    continue;
                };
                match (value, binding.target) {
                    (TrackValue::Vector3(v), TargetPath::Translation) => node.transform.position = v,
                    (TrackValue::Vector3(v), TargetPath::Scale) => node.transform.scale = v,
                    (TrackValue::Quaternion(q), TargetPath::Rotation) => node.transform.rotation = q,
                    _ => continue,
                }
                node.transform.mark_dirty();
            }
        }
    }
}
