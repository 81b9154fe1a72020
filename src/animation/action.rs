use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::animation::binding::PropertyBinding;
use crate::animation::clip::{AnimationClip, TrackData};
use crate::animation::tracks::KeyframeCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Once,
    Loop,
    PingPong,
}

/// Playback state of one clip.
#[derive(Debug, Clone)]
pub struct AnimationAction {
    clip: Arc<AnimationClip>,

    pub time: f32,
    pub time_scale: f32,
    pub weight: f32,
    pub loop_mode: LoopMode,
    /// Number of plays before stopping; `None` repeats forever.
    pub repetitions: Option<u32>,
    pub paused: bool,
    pub enabled: bool,

    pub bindings: Vec<PropertyBinding>,

    loops_completed: u32,
    pub(crate) track_cursors: Vec<KeyframeCursor>,
}

pub enum TrackValue {
    Vector3(Vec3),
    Quaternion(Quat),
}

impl AnimationAction {
    /// A stopped action; call [`AnimationAction::play`] to start it.
    #[must_use]
    pub fn new(clip: Arc<AnimationClip>) -> Self {
        let track_count = clip.tracks.len();
        Self {
            clip,
            time: 0.0,
            time_scale: 1.0,
            weight: 1.0,
            loop_mode: LoopMode::Loop,
            repetitions: None,
            paused: false,
            enabled: false,
            bindings: Vec::new(),
            loops_completed: 0,
            track_cursors: vec![KeyframeCursor::default(); track_count],
        }
    }

    #[must_use]
    pub fn with_bindings(mut self, bindings: Vec<PropertyBinding>) -> Self {
        self.bindings = bindings;
        self
    }

    #[must_use]
    pub fn with_loop(mut self, mode: LoopMode, repetitions: Option<u32>) -> Self {
        self.loop_mode = mode;
        self.repetitions = repetitions;
        self
    }

    #[must_use]
    pub fn clip(&self) -> &Arc<AnimationClip> {
        &self.clip
    }

    pub fn play(&mut self) {
        self.enabled = true;
        self.paused = false;
    }

    /// Disables the action and rewinds it.
    pub fn stop(&mut self) {
        self.enabled = false;
        self.time = 0.0;
        self.loops_completed = 0;
        self.track_cursors.fill(KeyframeCursor::default());
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.enabled && !self.paused && self.weight > 0.0
    }

    #[must_use]
    pub fn loops_completed(&self) -> u32 {
        self.loops_completed
    }

    fn repetitions_exhausted(&self) -> bool {
        self.repetitions.is_some_and(|n| self.loops_completed >= n)
    }

    /// Advances local time by `dt` seconds according to the loop mode.
    pub fn update(&mut self, dt: f32) {
        if !self.enabled || self.paused {
            return;
        }
        let duration = self.clip.duration;
        if duration <= 0.0 {
            return;
        }

        self.time += dt * self.time_scale;

        match self.loop_mode {
            LoopMode::Once => {
                if self.time >= duration || self.time < 0.0 {
                    self.time = self.time.clamp(0.0, duration);
                    self.loops_completed = 1;
                    self.paused = true;
                }
            }
            LoopMode::Loop => {
                if self.time >= duration || self.time < 0.0 {
                    let wraps = (self.time / duration).floor().abs() as u32;
                    self.loops_completed = self.loops_completed.saturating_add(wraps);
                    if self.repetitions_exhausted() {
                        self.time = if self.time_scale >= 0.0 { duration } else { 0.0 };
                        self.paused = true;
                    } else {
                        self.time = self.time.rem_euclid(duration);
                    }
                }
            }
            LoopMode::PingPong => {
                let period = duration * 2.0;
                let cycles = (self.time / period).floor().abs() as u32;
                if cycles > 0 {
                    self.loops_completed = self.loops_completed.saturating_add(cycles);
                }
                let mut t = self.time.rem_euclid(period);
                if t > duration {
                    t = period - t;
                }
                self.time = t;
                if self.repetitions_exhausted() {
                    self.time = 0.0;
                    self.paused = true;
                }
            }
        }
    }

    /// Samples track `track_index` at the current local time.
    pub fn sample_track(&mut self, track_index: usize) -> Option<TrackValue> {
        let track = self.clip.tracks.get(track_index)?;
        let cursor = self.track_cursors.get_mut(track_index)?;
        match &track.data {
            TrackData::Vector3(t) => t.sample_with_cursor(self.time, cursor).map(TrackValue::Vector3),
            TrackData::Quaternion(t) => t.sample_with_cursor(self.time, cursor).map(TrackValue::Quaternion),
        }
    }
}
