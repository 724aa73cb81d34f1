//! Guardian hub configuration file handling.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::detectors::EscalationPolicy;
use anyhow::{bail, Context, Error};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

/// One watched stream: either a live MJPEG camera or a directory of
/// recorded frames.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    #[serde(default)]
    pub camera_ip: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub frame_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the pose model (ONNX).
    pub model: String,
    /// Directory that receives per-stream snapshot subdirectories.
    pub snapshot_dir: String,
    #[serde(default)]
    pub alerts_enabled: bool,
    #[serde(default)]
    pub alert_webhook: Option<String>,
    #[serde(default)]
    pub escalation_policy: EscalationPolicy,
    pub streams: Vec<StreamConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Error> {
        let file = File::open(path)
            .with_context(|| format!("could not open config file {}", path.display()))?;
        let config: Config = serde_yml::from_reader(file)
            .with_context(|| format!("could not parse config file {}", path.display()))?;
        if config.streams.is_empty() {
            bail!("config file {} defines no streams", path.display());
        }
        for stream in &config.streams {
            if stream.camera_ip.is_none() && stream.frame_dir.is_none() {
                bail!(
                    "stream {:?} needs either a camera_ip or a frame_dir",
                    stream.name
                );
            }
        }
        Ok(config)
    }
}

/// Whether alerting is currently enabled. Re-read from disk every time so a
/// config edit takes effect at the next accepted event; any read or parse
/// failure counts as disabled.
pub fn alerts_enabled(path: &Path) -> bool {
    match Config::load(path) {
        Ok(config) => config.alerts_enabled,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "guardian_config_test_{}_{}.yaml",
            std::process::id(),
            contents.len()
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_a_full_config() {
        let path = write_temp_config(
            "model: models/yolov8n-pose.onnx\n\
             snapshot_dir: captures\n\
             alerts_enabled: true\n\
             alert_webhook: http://127.0.0.1:8080/alert\n\
             escalation_policy: all-matches\n\
             streams:\n  \
             - name: front door\n    \
             camera_ip: 192.168.1.20\n    \
             username: admin\n    \
             password: secret\n  \
             - name: replay\n    \
             frame_dir: recordings/replay\n",
        );
        let config = Config::load(&path).unwrap();
        assert!(config.alerts_enabled);
        assert_eq!(config.escalation_policy, EscalationPolicy::AllMatches);
        assert_eq!(config.streams.len(), 2);
        assert!(alerts_enabled(&path));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn rejects_a_stream_without_a_source() {
        let path = write_temp_config(
            "model: m.onnx\n\
             snapshot_dir: captures\n\
             streams:\n\
               - name: broken\n",
        );
        assert!(Config::load(&path).is_err());
        assert!(!alerts_enabled(&path));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_means_alerts_disabled() {
        assert!(!alerts_enabled(Path::new("/nonexistent/guardian.yaml")));
    }
}
