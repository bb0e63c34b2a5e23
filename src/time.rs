use std::time::{Duration, Instant};

/// Monotonic frame clock owned by the scheduler and advanced once per tick.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    delta: Duration,
    frame_index: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO, frame_index: 0 }
    }

    /// Moves the baseline to now so the next tick does not report the time
    /// spent between construction and the first frame.
    pub fn reset(&mut self) {
        self.last = Instant::now();
        self.delta = Duration::ZERO;
    }

    /// Advances the clock and returns the delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.delta = now.saturating_duration_since(self.last);
        self.last = now;
        self.frame_index = self.frame_index.wrapping_add(1);
        self.delta.as_secs_f32()
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
