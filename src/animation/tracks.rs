use crate::animation::values::Interpolatable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    Linear,
    Step,
    CubicSpline,
}

/// Keyframes scanned linearly from the cursor before falling back to a
/// binary search.
const MAX_SCAN_OFFSET: usize = 3;

/// Per-action memo of the last keyframe interval a track was sampled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyframeCursor {
    pub last_index: usize,
}

/// Keyframes of one animated property.
///
/// For `CubicSpline`, `values` holds `[in_tangent, value, out_tangent]`
/// per keyframe.
#[derive(Debug, Clone)]
pub struct KeyframeTrack<T: Interpolatable> {
    pub times: Vec<f32>,
    pub values: Vec<T>,
    pub interpolation: InterpolationMode,
}

impl<T: Interpolatable> KeyframeTrack<T> {
    #[must_use]
    pub fn new(times: Vec<f32>, values: Vec<T>, interpolation: InterpolationMode) -> Self {
        Self {
            times,
            values,
            interpolation,
        }
    }

    #[must_use]
    pub fn duration(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty() || self.values.is_empty()
    }

    /// Samples without a cursor. `None` for an empty track.
    #[must_use]
    pub fn sample(&self, time: f32) -> Option<T> {
        let mut cursor = KeyframeCursor::default();
        self.sample_with_cursor(time, &mut cursor)
    }

    /// Samples at `time`, reusing and updating `cursor`.
    ///
    /// Forward playback usually finds the interval within a few steps of
    /// the previous one; large jumps (loop wrap, scrubbing) binary search.
    pub fn sample_with_cursor(&self, time: f32, cursor: &mut KeyframeCursor) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let len = self.times.len();
        if len == 1 {
            return self.value_at(0);
        }

        let index = self
            .scan_from(cursor.last_index.min(len - 1), time)
            .unwrap_or_else(|| self.times.partition_point(|&t| t <= time).saturating_sub(1));
        cursor.last_index = index;
        self.sample_at_frame(index, time)
    }

    fn scan_from(&self, start: usize, time: f32) -> Option<usize> {
        let len = self.times.len();
        if time >= self.times[start] {
            for idx in start..=(start + MAX_SCAN_OFFSET).min(len - 1) {
                if idx == len - 1 || time < self.times[idx + 1] {
                    return Some(idx);
                }
            }
        } else {
            for idx in (start.saturating_sub(MAX_SCAN_OFFSET)..start).rev() {
                if time >= self.times[idx] {
                    return Some(idx);
                }
            }
        }
        None
    }

    fn value_at(&self, index: usize) -> Option<T> {
        match self.interpolation {
            InterpolationMode::CubicSpline => self.values.get(index * 3 + 1).copied(),
            _ => self.values.get(index).copied(),
        }
    }

    fn sample_at_frame(&self, index: usize, time: f32) -> Option<T> {
        let len = self.times.len();
        if index >= len - 1 || time <= self.times[0] {
            let clamped = if time <= self.times[0] { 0 } else { len - 1 };
            return self.value_at(clamped);
        }

        let next = index + 1;
        let (t0, t1) = (self.times[index], self.times[next]);
        let dt = t1 - t0;
        let t = if dt > 1e-6 { ((time - t0) / dt).clamp(0.0, 1.0) } else { 0.0 };

        match self.interpolation {
            InterpolationMode::Step => self.value_at(index),
            InterpolationMode::Linear => Some(T::interpolate_linear(
                self.value_at(index)?,
                self.value_at(next)?,
                t,
            )),
            InterpolationMode::CubicSpline => {
                let v0 = *self.values.get(index * 3 + 1)?;
                let out_tangent0 = *self.values.get(index * 3 + 2)?;
                let in_tangent1 = *self.values.get(next * 3)?;
                let v1 = *self.values.get(next * 3 + 1)?;
                Some(T::interpolate_cubic(v0, out_tangent0, in_tangent1, v1, t, dt))
            }
        }
    }
}
