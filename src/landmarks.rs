//! Body landmark types and the smoothing filter.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of keypoints per pose (COCO order).
pub const NUM_LANDMARKS: usize = 17;

pub const NOSE: usize = 0;
pub const LEFT_WRIST: usize = 9;
pub const RIGHT_WRIST: usize = 10;

/// Default number of recent frames averaged to denoise landmark positions.
pub const SMOOTHING_WINDOW: usize = 5;

/// One normalized body keypoint, `(x, y)` in `[0,1] x [0,1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Ordered keypoint set for one frame; length is fixed for the lifetime
/// of a stream.
pub type LandmarkSet = Vec<Landmark>;

/// Mean pixel position of all landmarks, or `None` for an empty set.
pub fn pixel_centroid(landmarks: &[Landmark], width: u32, height: u32) -> Option<(f32, f32)> {
    if landmarks.is_empty() {
        return None;
    }
    let n = landmarks.len() as f32;
    let cx = landmarks.iter().map(|lm| lm.x * width as f32).sum::<f32>() / n;
    let cy = landmarks.iter().map(|lm| lm.y * height as f32).sum::<f32>() / n;
    Some((cx, cy))
}

/// Rolling window over the most recent landmark sets of one stream.
/// Smoothing is a per-index arithmetic mean across the window; eviction
/// is strict FIFO once the window is full.
pub struct LandmarkSmoother {
    window: usize,
    buffer: VecDeque<LandmarkSet>,
}

impl LandmarkSmoother {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            buffer: VecDeque::with_capacity(window),
        }
    }

    /// Append the newest set and return the smoothed result.
    pub fn smooth(&mut self, new_set: LandmarkSet) -> LandmarkSet {
        if self.buffer.len() >= self.window {
            self.buffer.pop_front();
        }
        self.buffer.push_back(new_set);

        let count = self.buffer.len() as f32;
        let len = self.buffer.back().map(|s| s.len()).unwrap_or(0);
        let mut smoothed = Vec::with_capacity(len);
        for idx in 0..len {
            let sum_x: f32 = self.buffer.iter().map(|s| s[idx].x).sum();
            let sum_y: f32 = self.buffer.iter().map(|s| s[idx].y).sum();
            smoothed.push(Landmark::new(sum_x / count, sum_y / count));
        }
        smoothed
    }
}
