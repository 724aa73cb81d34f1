//! YOLOv8-pose ONNX adapter behind the `PoseEstimator` boundary.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::landmarks::{Landmark, LandmarkSet, NUM_LANDMARKS};
use crate::traits::PoseEstimator;
use anyhow::{Context, Error};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{s, Array4};
use ort::{GraphOptimizationLevel, Session};
use std::path::Path;

/// Model input edge length; YOLOv8-pose exports at 640x640.
const INPUT_SIZE: u32 = 640;
/// Minimum person confidence for a candidate to count as a detected pose.
const CONF_THRESHOLD: f32 = 0.25;
/// Letterbox padding value, matching the Ultralytics export.
const PAD_VALUE: f32 = 144.0 / 255.0;

/// Candidate layout in the `[1, 4 + 1 + 3 * NUM_LANDMARKS, N]` output:
/// cx, cy, w, h, person confidence, then (x, y, conf) per keypoint.
const KPT_OFFSET: usize = 5;
const KPT_STEP: usize = 3;

/// Runs a YOLOv8-pose ONNX model over single frames and reports the
/// highest-confidence person as a normalized landmark set.
pub struct OnnxPoseEstimator {
    session: Session,
}

impl OnnxPoseEstimator {
    pub fn load(model_path: &Path) -> Result<Self, Error> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .with_context(|| format!("could not load pose model {}", model_path.display()))?;
        info!("Pose model loaded from {}", model_path.display());
        Ok(Self { session })
    }

    /// Fit-and-pad the frame into the square model input, preserving
    /// aspect ratio. Returns the tensor and the scale ratio used.
    fn letterbox(frame: &RgbImage) -> (Array4<f32>, f32) {
        let (w0, h0) = frame.dimensions();
        let size = INPUT_SIZE as f32;
        let ratio = (size / w0 as f32).min(size / h0 as f32);
        let w_new = (w0 as f32 * ratio).round() as u32;
        let h_new = (h0 as f32 * ratio).round() as u32;
        let resized = image::imageops::resize(frame, w_new, h_new, FilterType::Triangle);

        let mut input = Array4::<f32>::from_elem(
            (1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
            PAD_VALUE,
        );
        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            input[[0, 0, y as usize, x as usize]] = r as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = g as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = b as f32 / 255.0;
        }
        (input, ratio)
    }
}

impl PoseEstimator for OnnxPoseEstimator {
    fn estimate(&mut self, frame: &RgbImage) -> Result<Option<LandmarkSet>, Error> {
        let (w0, h0) = frame.dimensions();
        let (input, ratio) = Self::letterbox(frame);

        let outputs = self.session.run(ort::inputs!["images" => input.view()]?)?;
        let preds = outputs["output0"]
            .try_extract_tensor::<f32>()?
            .into_dimensionality::<ndarray::Ix3>()
            .context("unexpected pose model output rank")?;
        let preds = preds.slice(s![0, .., ..]);

        let expected_rows = KPT_OFFSET + KPT_STEP * NUM_LANDMARKS;
        if preds.shape()[0] != expected_rows {
            anyhow::bail!(
                "unexpected pose model output: {} rows, expected {}",
                preds.shape()[0],
                expected_rows
            );
        }

        // Highest-confidence person candidate; no pose when none clears
        // the threshold.
        let mut best: Option<(usize, f32)> = None;
        for i in 0..preds.shape()[1] {
            let conf = preds[[4, i]];
            if conf >= CONF_THRESHOLD && best.map_or(true, |(_, c)| conf > c) {
                best = Some((i, conf));
            }
        }
        let (best_idx, _) = match best {
            Some(best) => best,
            None => return Ok(None),
        };

        let mut set = Vec::with_capacity(NUM_LANDMARKS);
        for k in 0..NUM_LANDMARKS {
            let kx = preds[[KPT_OFFSET + KPT_STEP * k, best_idx]] / ratio;
            let ky = preds[[KPT_OFFSET + KPT_STEP * k + 1, best_idx]] / ratio;
            set.push(Landmark::new(
                (kx / w0 as f32).clamp(0.0, 1.0),
                (ky / h0 as f32).clamp(0.0, 1.0),
            ));
        }
        Ok(Some(set))
    }
}
