//! Event throttle and snapshot persistence.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config;
use crate::detectors::SuspiciousReason;
use crate::notify::AlertNotifier;
use ab_glyph::{FontRef, PxScale};
use chrono::Local;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum time between two persisted snapshots of one stream.
const SNAPSHOT_COOLDOWN: Duration = Duration::from_secs(5);

static FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

const WATERMARK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const WATERMARK_SCALE: f32 = 22.0;

/// Externally visible unacknowledged-event signal for one stream. Set by
/// the snapshot pipeline, cleared only by an explicit acknowledgement.
#[derive(Clone)]
pub struct PendingEvent(Arc<AtomicBool>);

impl PendingEvent {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn acknowledge(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Consumes confirmed events for one stream: rate-limits persistence,
/// burns the watermark, writes the snapshot, raises the pending flag and
/// hands the event to the notifier when alerting is enabled.
pub struct SnapshotPipeline {
    snapshot_dir: PathBuf,
    config_path: PathBuf,
    last_save: Option<Instant>,
    pending: PendingEvent,
    notifier: Option<AlertNotifier>,
}

impl SnapshotPipeline {
    pub fn new(
        snapshot_dir: PathBuf,
        config_path: PathBuf,
        notifier: Option<AlertNotifier>,
    ) -> io::Result<Self> {
        fs::create_dir_all(&snapshot_dir)?;
        Ok(Self {
            snapshot_dir,
            config_path,
            last_save: None,
            pending: PendingEvent::new(),
            notifier,
        })
    }

    /// Shared handle to this stream's pending-event flag.
    pub fn pending(&self) -> PendingEvent {
        self.pending.clone()
    }

    /// Offer one confirmed event. Events inside the cooldown window are
    /// dropped, not queued.
    pub fn handle_event(&mut self, frame: &RgbImage, reason: SuspiciousReason, now: Instant) {
        if let Some(last) = self.last_save {
            if now.saturating_duration_since(last) <= SNAPSHOT_COOLDOWN {
                debug!("Dropping {} event inside the snapshot cooldown", reason);
                return;
            }
        }
        self.last_save = Some(now);

        let wall_clock = Local::now();
        let mut snapshot = frame.clone();
        burn_watermark(
            &mut snapshot,
            &format!(
                "{} | {}",
                reason.as_str().to_uppercase(),
                wall_clock.format("%Y-%m-%d %H:%M:%S")
            ),
        );

        let save_path = self.snapshot_dir.join(format!(
            "{}_{}.jpg",
            reason.as_str(),
            wall_clock.format("%Y%m%d_%H%M%S")
        ));
        match snapshot.save(&save_path) {
            Ok(()) => {
                info!("Snapshot saved: {}", save_path.display());
            }
            Err(e) => {
                // The event is still confirmed; only the durable record is lost.
                error!("Failed to save snapshot {}: {}", save_path.display(), e);
            }
        }

        self.pending.raise();

        if config::alerts_enabled(&self.config_path) {
            if let Some(notifier) = &self.notifier {
                notifier.dispatch(reason, save_path);
            }
        }
    }
}

fn burn_watermark(frame: &mut RgbImage, text: &str) {
    let font = FontRef::try_from_slice(FONT_DATA).expect("embedded font is invalid");
    draw_text_mut(
        frame,
        WATERMARK_COLOR,
        10,
        10,
        PxScale::from(WATERMARK_SCALE),
        &font,
        text,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_snapshot_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("guardian_snapshots_{}_{}", std::process::id(), tag))
    }

    fn snapshot_count(dir: &PathBuf) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn cooldown_drops_the_second_event() {
        let dir = temp_snapshot_dir("cooldown");
        let _ = fs::remove_dir_all(&dir);
        let mut pipeline =
            SnapshotPipeline::new(dir.clone(), PathBuf::from("/nonexistent.yaml"), None).unwrap();
        let pending = pipeline.pending();
        let frame = RgbImage::new(320, 240);
        let base = Instant::now();

        pipeline.handle_event(&frame, SuspiciousReason::FastHandRaise, base);
        assert_eq!(snapshot_count(&dir), 1);
        assert!(pending.is_set());

        // Three seconds later: inside the window, silently dropped.
        pipeline.handle_event(
            &frame,
            SuspiciousReason::FallDetected,
            base + Duration::from_secs(3),
        );
        assert_eq!(snapshot_count(&dir), 1);
        // The flag stays as set by the first event until acknowledged.
        assert!(pending.is_set());
        pending.acknowledge();
        assert!(!pending.is_set());

        // Past the window the next event is persisted again.
        pipeline.handle_event(
            &frame,
            SuspiciousReason::FallDetected,
            base + Duration::from_secs(6),
        );
        assert_eq!(snapshot_count(&dir), 2);
        assert!(pending.is_set());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn watermark_changes_the_frame() {
        let mut frame = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
        burn_watermark(&mut frame, "FALL_DETECTED | 2026-01-01 00:00:00");
        assert!(frame.pixels().any(|p| p.0 != [0, 0, 0]));
    }
}
