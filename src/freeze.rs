//! Sustained-stillness detection, independent of the hysteresis counters.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::landmarks::Landmark;
use std::time::{Duration, Instant};

/// Seconds of near-zero movement before a freeze confirms.
const FREEZE_SECS: u64 = 40;
/// Per-landmark Euclidean movement (normalized) tolerated during a freeze.
const FREEZE_MOVEMENT_TOLERANCE: f32 = 0.03;

/// Tracks how long every landmark has stayed within a small movement
/// tolerance of its last stable position. The caller injects `now` so the
/// clock can be simulated.
pub struct FreezeDetector {
    freeze_start: Option<Instant>,
    last_positions: Vec<(f32, f32)>,
}

impl FreezeDetector {
    pub fn new() -> Self {
        Self {
            freeze_start: None,
            last_positions: Vec::new(),
        }
    }

    /// Feed one smoothed frame; returns true when a freeze interval of
    /// `FREEZE_SECS` completes. On confirmation the interval re-arms, so a
    /// continuing freeze fires once per further interval.
    pub fn observe(&mut self, landmarks: &[Landmark], now: Instant) -> bool {
        let start = match self.freeze_start {
            Some(start) => start,
            None => {
                self.rebase(landmarks, now);
                return false;
            }
        };

        if self.moved(landmarks) {
            self.rebase(landmarks, now);
            return false;
        }

        if now.saturating_duration_since(start) > Duration::from_secs(FREEZE_SECS) {
            // Keep the stable positions; only the interval restarts.
            self.freeze_start = Some(now);
            return true;
        }

        false
    }

    fn moved(&self, landmarks: &[Landmark]) -> bool {
        landmarks
            .iter()
            .zip(self.last_positions.iter())
            .any(|(lm, (px, py))| {
                let dist = ((lm.x - px).powi(2) + (lm.y - py).powi(2)).sqrt();
                dist > FREEZE_MOVEMENT_TOLERANCE
            })
    }

    fn rebase(&mut self, landmarks: &[Landmark], now: Instant) {
        self.freeze_start = Some(now);
        self.last_positions = landmarks.iter().map(|lm| (lm.x, lm.y)).collect();
    }
}
