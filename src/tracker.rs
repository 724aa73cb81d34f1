//! Per-stream frame loop: smoothing, classification, freeze tracking,
//! escalation and overlay rendering.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::detectors::{DetectorState, EscalationPolicy, FrameContext, SuspiciousReason};
use crate::freeze::FreezeDetector;
use crate::landmarks::{pixel_centroid, LandmarkSet, LandmarkSmoother, NOSE, SMOOTHING_WINDOW};
use crate::overlay::{draw_skeleton, TrailRenderer};
use crate::snapshot::{PendingEvent, SnapshotPipeline};
use crate::traits::{FrameSource, PoseEstimator};
use image::RgbImage;
use std::time::Instant;

/// Cross-frame state for one stream. Previous-frame values advance only on
/// frames with a detected pose, so centroid speed spans no-pose gaps.
struct TrackingContext {
    prev_centroid: Option<(f32, f32)>,
    prev_instant: Option<Instant>,
    prev_nose_y: Option<f32>,
}

impl TrackingContext {
    fn new() -> Self {
        Self {
            prev_centroid: None,
            prev_instant: None,
            prev_nose_y: None,
        }
    }
}

/// Owns every piece of per-stream detection state and runs one pipeline
/// iteration per frame. Never share a tracker between streams.
pub struct PoseTracker {
    smoother: LandmarkSmoother,
    detectors: DetectorState,
    freeze: FreezeDetector,
    snapshots: SnapshotPipeline,
    trails: TrailRenderer,
    ctx: TrackingContext,
    policy: EscalationPolicy,
}

impl PoseTracker {
    pub fn new(snapshots: SnapshotPipeline, policy: EscalationPolicy) -> Self {
        Self {
            smoother: LandmarkSmoother::new(SMOOTHING_WINDOW),
            detectors: DetectorState::new(),
            freeze: FreezeDetector::new(),
            snapshots,
            trails: TrailRenderer::new(),
            ctx: TrackingContext::new(),
            policy,
        }
    }

    pub fn pending(&self) -> PendingEvent {
        self.snapshots.pending()
    }

    /// Run one pipeline iteration: smooth, classify, count, check freeze,
    /// maybe snapshot, render. Mutates the frame with the overlays and
    /// returns the behaviors confirmed this frame. A frame without a pose
    /// skips everything except being emitted.
    pub fn process_frame(
        &mut self,
        frame: &mut RgbImage,
        pose: Option<LandmarkSet>,
        now: Instant,
    ) -> Vec<SuspiciousReason> {
        let raw = match pose {
            Some(raw) => raw,
            None => return Vec::new(),
        };

        let smoothed = self.smoother.smooth(raw);
        let (width, height) = frame.dimensions();
        let curr_centroid = pixel_centroid(&smoothed, width, height);
        let dt = self
            .ctx
            .prev_instant
            .map(|prev| now.saturating_duration_since(prev).as_secs_f32())
            .unwrap_or(0.0);

        let frame_ctx = FrameContext {
            prev_centroid: self.ctx.prev_centroid,
            curr_centroid,
            dt,
            prev_nose_y: self.ctx.prev_nose_y,
        };
        let mut confirmed = self.detectors.update(&smoothed, &frame_ctx);

        if self.freeze.observe(&smoothed, now) {
            confirmed.push(SuspiciousReason::FreezeDetected);
        }

        match self.policy {
            EscalationPolicy::FirstMatch => {
                if let Some(reason) = confirmed.first() {
                    self.snapshots.handle_event(frame, *reason, now);
                }
            }
            EscalationPolicy::AllMatches => {
                for reason in &confirmed {
                    self.snapshots.handle_event(frame, *reason, now);
                }
            }
        }

        self.trails.push_and_draw(frame, &smoothed);
        draw_skeleton(frame, &smoothed);

        self.ctx.prev_nose_y = Some(smoothed[NOSE].y);
        self.ctx.prev_centroid = curr_centroid;
        self.ctx.prev_instant = Some(now);

        confirmed
    }
}

/// Pull-based annotated-frame producer over one stream: READ -> ESTIMATE ->
/// process -> EMIT. The iterator ends (CLOSED) when the source is exhausted
/// or fails; per-stream state goes with it.
pub struct TrackedStream<S, P> {
    source: S,
    estimator: P,
    tracker: PoseTracker,
}

impl<S: FrameSource, P: PoseEstimator> TrackedStream<S, P> {
    pub fn new(source: S, estimator: P, tracker: PoseTracker) -> Self {
        Self {
            source,
            estimator,
            tracker,
        }
    }

    pub fn pending(&self) -> PendingEvent {
        self.tracker.pending()
    }
}

impl<S: FrameSource, P: PoseEstimator> Iterator for TrackedStream<S, P> {
    type Item = RgbImage;

    fn next(&mut self) -> Option<RgbImage> {
        let mut frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Frame source exhausted; closing stream.");
                return None;
            }
            Err(e) => {
                error!("Frame read failed; closing stream: {}", e);
                return None;
            }
        };

        // A failed estimate is treated like a frame without a pose.
        let pose = match self.estimator.estimate(&frame) {
            Ok(pose) => pose,
            Err(e) => {
                warn!("Pose estimation failed for this frame: {}", e);
                None
            }
        };

        self.tracker.process_frame(&mut frame, pose, Instant::now());
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Landmark, LEFT_WRIST, NUM_LANDMARKS, RIGHT_WRIST};
    use anyhow::Error;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_pipeline(tag: &str) -> (SnapshotPipeline, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "guardian_tracker_test_{}_{}",
            std::process::id(),
            tag
        ));
        let _ = fs::remove_dir_all(&dir);
        let pipeline =
            SnapshotPipeline::new(dir.clone(), PathBuf::from("/nonexistent.yaml"), None).unwrap();
        (pipeline, dir)
    }

    /// Standing pose with both wrists raised above 30% frame height.
    fn wrists_high_pose() -> LandmarkSet {
        let mut set = vec![Landmark::new(0.5, 0.5); NUM_LANDMARKS];
        set[NOSE] = Landmark::new(0.5, 0.2);
        set[LEFT_WRIST] = Landmark::new(0.2, 0.25);
        set[RIGHT_WRIST] = Landmark::new(0.8, 0.25);
        set
    }

    #[test]
    fn wrists_above_threshold_confirm_exactly_one_hand_raise() {
        let (pipeline, dir) = test_pipeline("hand_raise");
        let mut tracker = PoseTracker::new(pipeline, EscalationPolicy::FirstMatch);
        let mut frame = RgbImage::new(320, 240);
        let base = Instant::now();

        let mut events = Vec::new();
        for i in 0..5u64 {
            let confirmed = tracker.process_frame(
                &mut frame,
                Some(wrists_high_pose()),
                base + Duration::from_millis(100 * i),
            );
            events.push(confirmed);
        }

        // Counter exceeds 3 on the fourth true frame; nothing else fires.
        let fired: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_empty())
            .collect();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 3);
        assert_eq!(*fired[0].1, vec![SuspiciousReason::FastHandRaise]);

        // Exactly one snapshot was persisted and the flag is pending.
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
        assert!(tracker.pending().is_set());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn frames_without_a_pose_confirm_nothing() {
        let (pipeline, dir) = test_pipeline("no_pose");
        let mut tracker = PoseTracker::new(pipeline, EscalationPolicy::FirstMatch);
        let mut frame = RgbImage::new(320, 240);

        for _ in 0..10 {
            assert!(tracker
                .process_frame(&mut frame, None, Instant::now())
                .is_empty());
        }
        assert!(!tracker.pending().is_set());

        let _ = fs::remove_dir_all(&dir);
    }

    struct VecSource {
        frames: Vec<RgbImage>,
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, Error> {
            if self.frames.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.frames.remove(0)))
        }
    }

    struct FixedPose;

    impl PoseEstimator for FixedPose {
        fn estimate(&mut self, _frame: &RgbImage) -> Result<Option<LandmarkSet>, Error> {
            Ok(Some(wrists_high_pose()))
        }
    }

    #[test]
    fn stream_closes_when_the_source_runs_dry() {
        let (pipeline, dir) = test_pipeline("stream_close");
        let source = VecSource {
            frames: (0..5).map(|_| RgbImage::new(64, 48)).collect(),
        };
        let stream = TrackedStream::new(
            source,
            FixedPose,
            PoseTracker::new(pipeline, EscalationPolicy::FirstMatch),
        );

        assert_eq!(stream.count(), 5);
        let _ = fs::remove_dir_all(&dir);
    }
}
