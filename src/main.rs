//! Guardian hub: watches camera or recorded video streams for suspicious
//! body-pose behavior and raises alerts.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

use anyhow::Error;
use docopt::Docopt;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::thread::sleep;
use std::time::Duration;

mod config;
use crate::config::{Config, StreamConfig};
mod detectors;
mod freeze;
mod landmarks;
mod notify;
use crate::notify::AlertNotifier;
mod overlay;
mod pose;
use crate::pose::OnnxPoseEstimator;
mod snapshot;
use crate::snapshot::{PendingEvent, SnapshotPipeline};
mod source;
use crate::source::{FrameDirSource, MjpegCameraSource};
mod tracker;
use crate::tracker::{PoseTracker, TrackedStream};
mod traits;
use crate::traits::FrameSource;

// A counter representing the amount of active stream threads
static GLOBAL_THREAD_COUNT: AtomicUsize = AtomicUsize::new(0);

const USAGE: &str = "
Guardian hub: watches camera and recorded video streams for suspicious body-pose behavior (falls, running, face covering, prolonged freezes, and more) and raises alerts.

Usage:
  guardian-hub [--config=<path>]
  guardian-hub (--version | -v)
  guardian-hub (--help | -h)

Options:
    --config=<path>     Path to the configuration file [default: guardian.yaml]
    --version, -v       Show version
    --help, -h          Show help
";

#[derive(Debug, Clone, Deserialize)]
struct Args {
    flag_config: String,
}

fn main() -> Result<(), Error> {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let config_path = PathBuf::from(&args.flag_config);
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            println!(
                "Error loading {} ({}), see the example_guardian.yaml for an example configuration.",
                config_path.display(),
                e
            );
            exit(1);
        }
    };
    let notifier = config.alert_webhook.clone().map(AlertNotifier::new);

    for stream in config.streams.clone().into_iter() {
        println!("Starting to watch stream: {:?}", stream.name);

        let config = config.clone();
        let config_path = config_path.clone();
        let notifier = notifier.clone();

        GLOBAL_THREAD_COUNT.fetch_add(1, Ordering::SeqCst);
        thread::spawn(move || {
            if let Err(e) = watch_stream(&stream, &config, &config_path, notifier) {
                error!("Stream {:?} failed: {}", stream.name, e);
            }
            GLOBAL_THREAD_COUNT.fetch_sub(1, Ordering::SeqCst);
        });
    }

    // Terminate when no streams are left running
    while GLOBAL_THREAD_COUNT.load(Ordering::SeqCst) != 0 {
        sleep(Duration::from_millis(1));
    }

    Ok(())
}

/// Build one stream's pipeline and drain it to closure.
fn watch_stream(
    stream: &StreamConfig,
    config: &Config,
    config_path: &Path,
    notifier: Option<AlertNotifier>,
) -> Result<(), Error> {
    let snapshot_dir = Path::new(&config.snapshot_dir)
        .join(stream.name.replace(' ', "_").to_lowercase());
    let snapshots = SnapshotPipeline::new(snapshot_dir, config_path.to_path_buf(), notifier)?;
    let tracker = PoseTracker::new(snapshots, config.escalation_policy);
    let estimator = OnnxPoseEstimator::load(Path::new(&config.model))?;

    if let Some(ip) = &stream.camera_ip {
        let source = MjpegCameraSource::connect(
            ip,
            stream.username.as_deref().unwrap_or(""),
            stream.password.as_deref().unwrap_or(""),
        )?;
        drain_stream(&stream.name, source, estimator, tracker);
    } else if let Some(dir) = &stream.frame_dir {
        let source = FrameDirSource::open(dir)?;
        drain_stream(&stream.name, source, estimator, tracker);
    }

    Ok(())
}

/// Run the frame loop until the source closes, with a side consumer that
/// polls and acknowledges the stream's pending-event flag.
fn drain_stream<S: FrameSource>(name: &str, source: S, estimator: OnnxPoseEstimator, tracker: PoseTracker) {
    let stream = TrackedStream::new(source, estimator, tracker);
    spawn_pending_consumer(name.to_string(), stream.pending());

    println!("[{}] Running...", name);

    let mut frames: u64 = 0;
    for _annotated in stream {
        frames += 1;
        if frames % 500 == 0 {
            debug!("[{}] {} frames processed", name, frames);
        }
    }

    info!("[{}] Stream closed after {} frames.", name, frames);
}

/// External pending-event consumer: poll-and-clear, once per second.
fn spawn_pending_consumer(name: String, pending: PendingEvent) {
    thread::spawn(move || loop {
        if pending.is_set() {
            println!("[{}] Suspicious activity detected.", name);
            pending.acknowledge();
        }
        sleep(Duration::from_secs(1));
    });
}
