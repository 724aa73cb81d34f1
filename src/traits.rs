//! Guardian hub boundary traits.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::landmarks::LandmarkSet;
use anyhow::Error;
use image::RgbImage;

/// A lazy sequence of raw video frames (camera or recorded stream).
/// `Ok(None)` signals normal end of stream; an `Err` terminates the
/// stream the same way. A source cannot be restarted; open a new one.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, Error>;
}

/// Turns one raw frame into a fixed-length set of normalized body
/// landmarks, or `None` when no pose is visible this frame.
pub trait PoseEstimator {
    fn estimate(&mut self, frame: &RgbImage) -> Result<Option<LandmarkSet>, Error>;
}
