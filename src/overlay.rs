//! Cosmetic frame overlays: landmark trails and the skeleton.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::landmarks::{Landmark, NUM_LANDMARKS};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use std::collections::VecDeque;

/// Samples kept per landmark trail; the oldest point drops off first.
const TRAIL_LEN: usize = 20;

const TRAIL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BONE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const JOINT_COLOR: Rgb<u8> = Rgb([0, 128, 255]);

/// Keypoint index pairs joined by skeleton bones (COCO order).
const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

/// Trailing pixel positions per landmark for one stream.
pub struct TrailRenderer {
    trails: Vec<VecDeque<(f32, f32)>>,
}

impl TrailRenderer {
    pub fn new() -> Self {
        Self {
            trails: (0..NUM_LANDMARKS)
                .map(|_| VecDeque::with_capacity(TRAIL_LEN))
                .collect(),
        }
    }

    /// Record this frame's positions and draw every trail.
    pub fn push_and_draw(&mut self, frame: &mut RgbImage, landmarks: &[Landmark]) {
        let (w, h) = frame.dimensions();
        for (trail, lm) in self.trails.iter_mut().zip(landmarks.iter()) {
            if trail.len() >= TRAIL_LEN {
                trail.pop_front();
            }
            trail.push_back((lm.x * w as f32, lm.y * h as f32));

            for pair in trail.iter().zip(trail.iter().skip(1)) {
                draw_line_segment_mut(frame, *pair.0, *pair.1, TRAIL_COLOR);
            }
        }
    }

    #[cfg(test)]
    fn trail_len(&self, idx: usize) -> usize {
        self.trails[idx].len()
    }
}

/// Draw skeleton bones and joint dots over the frame.
pub fn draw_skeleton(frame: &mut RgbImage, landmarks: &[Landmark]) {
    let (w, h) = frame.dimensions();
    let px = |lm: &Landmark| (lm.x * w as f32, lm.y * h as f32);

    for (a, b) in SKELETON {
        if a < landmarks.len() && b < landmarks.len() {
            draw_line_segment_mut(frame, px(&landmarks[a]), px(&landmarks[b]), BONE_COLOR);
        }
    }
    for lm in landmarks {
        let (x, y) = px(lm);
        draw_filled_circle_mut(frame, (x as i32, y as i32), 3, JOINT_COLOR);
    }
}
