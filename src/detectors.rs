//! Behavior classifiers and the hysteresis counters that confirm them.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::landmarks::{Landmark, LEFT_WRIST, NOSE, RIGHT_WRIST};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wrist height (normalized) above which a raised hand is flagged.
const HAND_RAISE_HEIGHT: f32 = 0.3;
/// Nose height (normalized) below which the head counts as dropped.
const FALL_HEAD_DROP_THRESHOLD: f32 = 0.9;
/// Centroid speed in pixels per second that counts as running.
const RUNNING_SPEED_THRESHOLD: f32 = 150.0;
/// Wrist-to-nose distance (normalized, per axis) that counts as covering.
const FACE_COVER_DISTANCE: f32 = 0.05;
/// Nose height change (normalized) between frames that counts as a jump.
const JUMP_NOSE_DELTA: f32 = 0.08;

/// Reason tag for a confirmed suspicious event. The string form is the
/// stable vocabulary used in snapshot file names and alert payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspiciousReason {
    FastHandRaise,
    FallDetected,
    RunningDetected,
    HandsUpLong,
    FaceCovered,
    JumpingDetected,
    FreezeDetected,
}

impl SuspiciousReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspiciousReason::FastHandRaise => "fast_hand_raise",
            SuspiciousReason::FallDetected => "fall_detected",
            SuspiciousReason::RunningDetected => "running_detected",
            SuspiciousReason::HandsUpLong => "hands_up_long",
            SuspiciousReason::FaceCovered => "face_covered",
            SuspiciousReason::JumpingDetected => "jumping_detected",
            SuspiciousReason::FreezeDetected => "freeze_detected",
        }
    }
}

impl fmt::Display for SuspiciousReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which of the behaviors confirmed in one frame get escalated to the
/// snapshot pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationPolicy {
    /// Only the first confirmed behavior in evaluation order.
    FirstMatch,
    /// Every behavior confirmed this frame.
    AllMatches,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        EscalationPolicy::FirstMatch
    }
}

/// Cross-frame context the stateless classifiers are allowed to see.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameContext {
    pub prev_centroid: Option<(f32, f32)>,
    pub curr_centroid: Option<(f32, f32)>,
    /// Seconds since the previous pose-bearing frame.
    pub dt: f32,
    pub prev_nose_y: Option<f32>,
}

fn fast_hand_raise(landmarks: &[Landmark], _ctx: &FrameContext) -> bool {
    landmarks[LEFT_WRIST].y < HAND_RAISE_HEIGHT || landmarks[RIGHT_WRIST].y < HAND_RAISE_HEIGHT
}

fn fall(landmarks: &[Landmark], _ctx: &FrameContext) -> bool {
    landmarks[NOSE].y > FALL_HEAD_DROP_THRESHOLD
}

fn running(_landmarks: &[Landmark], ctx: &FrameContext) -> bool {
    let (prev, curr) = match (ctx.prev_centroid, ctx.curr_centroid) {
        (Some(prev), Some(curr)) => (prev, curr),
        _ => return false,
    };
    if ctx.dt <= 0.0 {
        return false;
    }
    let dist = ((curr.0 - prev.0).powi(2) + (curr.1 - prev.1).powi(2)).sqrt();
    dist / ctx.dt > RUNNING_SPEED_THRESHOLD
}

fn hands_up_long(landmarks: &[Landmark], _ctx: &FrameContext) -> bool {
    let nose_y = landmarks[NOSE].y;
    landmarks[LEFT_WRIST].y < nose_y && landmarks[RIGHT_WRIST].y < nose_y
}

fn face_covered(landmarks: &[Landmark], _ctx: &FrameContext) -> bool {
    let nose = landmarks[NOSE];
    [landmarks[LEFT_WRIST], landmarks[RIGHT_WRIST]]
        .iter()
        .any(|wrist| {
            (nose.x - wrist.x).abs() < FACE_COVER_DISTANCE
                && (nose.y - wrist.y).abs() < FACE_COVER_DISTANCE
        })
}

fn jumping(landmarks: &[Landmark], ctx: &FrameContext) -> bool {
    match ctx.prev_nose_y {
        Some(prev) => (landmarks[NOSE].y - prev).abs() > JUMP_NOSE_DELTA,
        None => false,
    }
}

/// One entry of the behavior table: a pure predicate plus the counter
/// value it must strictly exceed to confirm.
pub struct BehaviorSpec {
    pub reason: SuspiciousReason,
    pub threshold: u32,
    pub classify: fn(&[Landmark], &FrameContext) -> bool,
}

/// Evaluation order is also the first-match escalation order.
pub const BEHAVIORS: [BehaviorSpec; 6] = [
    BehaviorSpec {
        reason: SuspiciousReason::FastHandRaise,
        threshold: 3,
        classify: fast_hand_raise,
    },
    BehaviorSpec {
        reason: SuspiciousReason::FallDetected,
        threshold: 3,
        classify: fall,
    },
    BehaviorSpec {
        reason: SuspiciousReason::RunningDetected,
        threshold: 3,
        classify: running,
    },
    BehaviorSpec {
        reason: SuspiciousReason::HandsUpLong,
        threshold: 5,
        classify: hands_up_long,
    },
    BehaviorSpec {
        reason: SuspiciousReason::FaceCovered,
        threshold: 4,
        classify: face_covered,
    },
    BehaviorSpec {
        reason: SuspiciousReason::JumpingDetected,
        threshold: 3,
        classify: jumping,
    },
];

/// Per-behavior hysteresis counters for one stream. A counter gains one
/// per true frame and loses one (never below zero) per false frame, so a
/// single missed frame does not erase accumulated evidence.
pub struct DetectorState {
    counters: [u32; BEHAVIORS.len()],
}

impl DetectorState {
    pub fn new() -> Self {
        Self {
            counters: [0; BEHAVIORS.len()],
        }
    }

    /// Run every classifier over one smoothed frame and return the
    /// behaviors confirmed this frame, in evaluation order. A confirmed
    /// counter resets to zero.
    pub fn update(&mut self, landmarks: &[Landmark], ctx: &FrameContext) -> Vec<SuspiciousReason> {
        let mut confirmed = Vec::new();
        for (spec, counter) in BEHAVIORS.iter().zip(self.counters.iter_mut()) {
            if (spec.classify)(landmarks, ctx) {
                *counter += 1;
            } else {
                *counter = counter.saturating_sub(1);
            }
            if *counter > spec.threshold {
                confirmed.push(spec.reason);
                *counter = 0;
            }
        }
        confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LandmarkSet, NUM_LANDMARKS};

    /// A neutral standing pose: nose high, wrists at the hips.
    fn neutral_pose() -> LandmarkSet {
        let mut set = vec![Landmark::new(0.5, 0.5); NUM_LANDMARKS];
        set[NOSE] = Landmark::new(0.5, 0.2);
        set[LEFT_WRIST] = Landmark::new(0.3, 0.6);
        set[RIGHT_WRIST] = Landmark::new(0.7, 0.6);
        set
    }

    fn raised_wrist_pose() -> LandmarkSet {
        let mut set = neutral_pose();
        set[LEFT_WRIST] = Landmark::new(0.3, 0.25);
        set
    }

    #[test]
    fn classifier_boundaries() {
        let ctx = FrameContext::default();

        assert!(fast_hand_raise(&raised_wrist_pose(), &ctx));
        assert!(!fast_hand_raise(&neutral_pose(), &ctx));

        let mut fallen = neutral_pose();
        fallen[NOSE] = Landmark::new(0.5, 0.95);
        assert!(fall(&fallen, &ctx));
        assert!(!fall(&neutral_pose(), &ctx));

        let mut covering = neutral_pose();
        covering[RIGHT_WRIST] = Landmark::new(0.52, 0.22);
        assert!(face_covered(&covering, &ctx));
        assert!(!face_covered(&neutral_pose(), &ctx));

        let mut hands_up = neutral_pose();
        hands_up[LEFT_WRIST] = Landmark::new(0.3, 0.1);
        hands_up[RIGHT_WRIST] = Landmark::new(0.7, 0.1);
        assert!(hands_up_long(&hands_up, &ctx));
        // One wrist up is not enough.
        assert!(!hands_up_long(&raised_wrist_pose(), &ctx));
    }

    #[test]
    fn running_requires_both_centroids_and_elapsed_time() {
        let pose = neutral_pose();
        let fast = FrameContext {
            prev_centroid: Some((100.0, 100.0)),
            curr_centroid: Some((300.0, 100.0)),
            dt: 1.0,
            prev_nose_y: None,
        };
        assert!(running(&pose, &fast));

        let slow = FrameContext {
            curr_centroid: Some((110.0, 100.0)),
            ..fast
        };
        assert!(!running(&pose, &slow));

        let no_prev = FrameContext {
            prev_centroid: None,
            ..fast
        };
        assert!(!running(&pose, &no_prev));

        let zero_dt = FrameContext { dt: 0.0, ..fast };
        assert!(!running(&pose, &zero_dt));
    }

    #[test]
    fn jumping_requires_previous_nose_height() {
        let pose = neutral_pose();
        let ctx = FrameContext {
            prev_nose_y: Some(0.35),
            ..FrameContext::default()
        };
        assert!(jumping(&pose, &ctx));
        let small = FrameContext {
            prev_nose_y: Some(0.25),
            ..FrameContext::default()
        };
        assert!(!jumping(&pose, &small));
        assert!(!jumping(&pose, &FrameContext::default()));
    }

    #[test]
    fn counter_confirms_exactly_once_after_threshold_plus_one_frames() {
        let mut state = DetectorState::new();
        let ctx = FrameContext::default();
        let threshold = BEHAVIORS[0].threshold;

        let mut fired_at = None;
        for frame in 0..threshold + 1 {
            let confirmed = state.update(&raised_wrist_pose(), &ctx);
            if !confirmed.is_empty() {
                assert_eq!(confirmed, vec![SuspiciousReason::FastHandRaise]);
                assert!(fired_at.is_none());
                fired_at = Some(frame);
            }
        }
        // Fires on the (threshold + 1)-th true frame, counter back at zero.
        assert_eq!(fired_at, Some(threshold));
        assert_eq!(state.counters[0], 0);

        // Behavior gone: counters stay at zero, nothing more fires.
        for _ in 0..3 {
            assert!(state.update(&neutral_pose(), &ctx).is_empty());
        }
        assert_eq!(state.counters[0], 0);
    }

    #[test]
    fn alternating_frames_never_confirm() {
        let mut state = DetectorState::new();
        let ctx = FrameContext::default();
        for _ in 0..20 {
            assert!(state.update(&raised_wrist_pose(), &ctx).is_empty());
            assert!(state.update(&neutral_pose(), &ctx).is_empty());
        }
        assert!(state.counters[0] <= 1);
    }
}
