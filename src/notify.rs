//! Best-effort alert delivery to an HTTP webhook.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::detectors::SuspiciousReason;
use reqwest::blocking::Client;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts an accepted event's snapshot and reason to a configured webhook.
/// Delivery runs on a detached thread and never feeds back into the
/// detection pipeline; failures are logged and dropped.
#[derive(Clone)]
pub struct AlertNotifier {
    webhook_url: String,
}

impl AlertNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self { webhook_url }
    }

    /// Fire-and-forget dispatch of one event.
    pub fn dispatch(&self, reason: SuspiciousReason, snapshot_path: PathBuf) {
        let url = self.webhook_url.clone();
        thread::spawn(move || match post_alert(&url, reason, &snapshot_path) {
            Ok(()) => {
                info!("Alert ({}) delivered to {}", reason, url);
            }
            Err(e) => {
                error!("Failed to deliver alert ({}) to {}: {}", reason, url, e);
            }
        });
    }
}

fn post_alert(url: &str, reason: SuspiciousReason, snapshot_path: &Path) -> io::Result<()> {
    let snapshot = fs::read(snapshot_path)?;

    let client = Client::builder()
        .timeout(DISPATCH_TIMEOUT)
        .build()
        .map_err(|e| io::Error::other(e.to_string()))?;
    let response = client
        .post(url)
        .header("Content-Type", "image/jpeg")
        .header("X-Guardian-Reason", reason.as_str())
        .header(
            "X-Guardian-Snapshot",
            snapshot_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
        .body(snapshot)
        .send()
        .map_err(|e| io::Error::other(e.to_string()))?;

    if !response.status().is_success() {
        return Err(io::Error::other(format!(
            "webhook returned {}",
            response.status()
        )));
    }

    Ok(())
}
