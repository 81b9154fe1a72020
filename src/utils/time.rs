use std::time::{Duration, Instant};

/// Frame clock for the render loop.
pub struct Timer {
    start_time: Instant,
    last_update: Instant,
    /// Time since the previous tick.
    pub delta: Duration,
    /// Time since creation or the last reset.
    pub elapsed: Duration,
    pub frame_count: u64,
    /// Upper bound applied to `delta` so a stalled host does not fast-forward animation.
    pub max_delta: Duration,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
            max_delta: Duration::from_millis(250),
        }
    }

    /// Records a frame and returns the clamped delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.delta = (now - self.last_update).min(self.max_delta);
        self.elapsed = now - self.start_time;
        self.last_update = now;
        self.frame_count += 1;
        self.dt_seconds()
    }

    /// Restarts the clock without touching the frame count.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start_time = now;
        self.last_update = now;
        self.delta = Duration::ZERO;
        self.elapsed = Duration::ZERO;
    }

    #[must_use]
    pub fn dt_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}
