use std::time::Instant;

use crate::shared::constants::FPS_SAMPLE_WINDOW;

/// Windowed frame-rate estimate, recomputed every `window` frames.
#[derive(Clone, Debug)]
pub struct FpsMeter {
    window: u64,
    frames: u64,
    last_sample: Option<Instant>,
    fps: f64,
}

impl FpsMeter {
    pub fn new(window: u64) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            last_sample: None,
            fps: 0.0,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.frames = 0;
        self.last_sample = Some(now);
        self.fps = 0.0;
    }

    pub fn tick(&mut self, now: Instant) {
        let Some(last) = self.last_sample else {
            self.reset(now);
            return;
        };
        self.frames += 1;
        if self.frames % self.window != 0 {
            return;
        }
        let elapsed = now.saturating_duration_since(last).as_secs_f64();
        if elapsed > 0.0 {
            self.fps = self.window as f64 / elapsed;
        }
        self.last_sample = Some(now);
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new(FPS_SAMPLE_WINDOW)
    }
}
