// src/protocol/legacy.rs - Step and duration based moves for older callers
//!
//! Earlier firmware took relative moves as motor steps plus a duration. These
//! helpers convert such requests into absolute feed-rate moves.

use super::GrblPlotter;
use crate::config::MotionConfig;
use crate::errors::PlotterError;

pub const STEPS_PER_MM: f64 = 80.0;

/// Below this displacement the duration carries no usable speed.
const MIN_TIMED_DISTANCE_MM: f64 = 0.01;

pub fn mm_to_steps(mm: f64) -> i64 {
    (mm * STEPS_PER_MM) as i64
}

pub fn steps_to_mm(steps: i64) -> f64 {
    steps as f64 / STEPS_PER_MM
}

/// Feed rate in mm/min covering `distance_mm` in `duration_ms`, clamped to
/// the machine's range. Degenerate moves use the default draw feed.
pub fn duration_to_feed(distance_mm: f64, duration_ms: u64, motion: &MotionConfig) -> f64 {
    if distance_mm > MIN_TIMED_DISTANCE_MM && duration_ms > 0 {
        motion.clamp_feed(distance_mm * 60_000.0 / duration_ms as f64)
    } else {
        motion.draw_feed
    }
}

impl GrblPlotter {
    /// Relative move from the cached position, timed by `duration_ms`.
    pub async fn move_relative(&self, dx_mm: f64, dy_mm: f64, duration_ms: u64) -> Result<(), PlotterError> {
        let (x, y) = self.current_position();
        let feed = duration_to_feed(dx_mm.hypot(dy_mm), duration_ms, &self.motion);
        self.move_absolute(x + dx_mm, y + dy_mm, Some(feed)).await
    }

    pub async fn move_relative_steps(&self, dx_steps: i64, dy_steps: i64, duration_ms: u64) -> Result<(), PlotterError> {
        self.move_relative(steps_to_mm(dx_steps), steps_to_mm(dy_steps), duration_ms)
            .await
    }
}
