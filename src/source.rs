//! Frame sources: MJPEG IP cameras and directories of recorded frames.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::traits::FrameSource;
use anyhow::{anyhow, bail, Context, Error};
use image::RgbImage;
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use std::fs;
use std::io;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;

/// Pulls JPEG parts from a camera's multipart/x-mixed-replace stream.
/// Assumes the camera supports the MJPEG codec and HTTP Digest auth.
pub struct MjpegCameraSource {
    reader: BufReader<Response>,
    boundary: String,
}

impl MjpegCameraSource {
    pub fn connect(ip: &str, username: &str, password: &str) -> Result<Self, Error> {
        let url = format!("http://{}/cgi-bin/mjpg/video.cgi?subtype=1", ip);
        let url_req = reqwest::Url::try_from(url.as_str())?;

        // First request collects the Digest Auth challenge.
        let client = Client::new();
        let response = client.get(url_req.clone()).send()?;
        if response.status() != 401 {
            bail!(
                "unexpected status from camera MJPEG attempt: {}",
                response.status()
            );
        }

        let www_authenticate = response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let mut pw_client = http_auth::PasswordClient::try_from(www_authenticate)
            .map_err(|e| anyhow!("could not parse camera auth challenge: {}", e))?;
        let authorization = pw_client
            .respond(&http_auth::PasswordParams {
                username,
                password,
                uri: url_req.path(),
                method: reqwest::Method::GET.as_str(),
                body: Some(&[]),
            })
            .map_err(|e| anyhow!("could not answer camera auth challenge: {}", e))?;
        let mut authorization = HeaderValue::try_from(authorization)?;
        authorization.set_sensitive(true);

        let response = client
            .get(url_req)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()?;
        if !response.status().is_success() {
            bail!("failed to authenticate to camera MJPEG: {}", response.status());
        }

        // "--myboundary" is the common default when the header names none.
        let boundary =
            Self::mjpeg_boundary(&response).unwrap_or_else(|| "--myboundary".to_string());
        debug!("Using MJPEG boundary: {}", boundary);

        Ok(Self {
            reader: BufReader::new(response),
            boundary,
        })
    }

    /// Extract the part boundary from Content-Type: multipart/x-mixed-replace.
    fn mjpeg_boundary(resp: &Response) -> Option<String> {
        let ct_str = resp.headers().get(CONTENT_TYPE)?.to_str().ok()?;
        let idx = ct_str.to_lowercase().find("boundary=")?;
        let after = &ct_str[idx + "boundary=".len()..];
        let boundary_str = after.trim_matches(|c: char| c.is_whitespace() || c == ';' || c == '"');
        if boundary_str.is_empty() {
            return None;
        }
        // Boundary lines in the stream are prefixed with "--".
        if boundary_str.starts_with("--") {
            Some(boundary_str.to_string())
        } else {
            Some(format!("--{}", boundary_str))
        }
    }

    /// Reads a line (ends with b'\n'); `None` on EOF without data.
    fn read_ascii_line<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
        let mut buffer = Vec::new();
        let bytes_read = reader.read_until(b'\n', &mut buffer)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        while buffer.ends_with(b"\n") || buffer.ends_with(b"\r") {
            buffer.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buffer).to_string()))
    }
}

impl FrameSource for MjpegCameraSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, Error> {
        loop {
            let line = match Self::read_ascii_line(&mut self.reader)? {
                Some(line) => line,
                None => {
                    debug!("EOF reached on camera MJPEG stream.");
                    return Ok(None);
                }
            };
            if !line.trim().starts_with(&self.boundary) {
                continue;
            }

            // Part headers up to the blank line before the JPEG bytes.
            let mut content_length: Option<usize> = None;
            loop {
                let hdr_line = match Self::read_ascii_line(&mut self.reader)? {
                    Some(line) => line,
                    None => return Ok(None),
                };
                let hdr_trimmed = hdr_line.trim();
                if hdr_trimmed.is_empty() {
                    break;
                }
                if let Some(cl) = hdr_trimmed.strip_prefix("Content-Length:") {
                    content_length = Some(
                        cl.trim()
                            .parse::<usize>()
                            .context("Content-Length not a valid integer")?,
                    );
                }
            }

            let len = match content_length {
                Some(len) => len,
                None => {
                    debug!("No Content-Length header found for this part");
                    continue;
                }
            };
            let mut frame_data = vec![0u8; len];
            self.reader.read_exact(&mut frame_data)?;

            let decoded = image::load_from_memory(&frame_data)
                .context("failed to decode JPEG frame from camera stream")?;
            return Ok(Some(decoded.to_rgb8()));
        }
    }
}

/// Replays a recorded stream from numbered frame files
/// (`frame_<index>.jpg|jpeg|png`) in one directory, in index order.
pub struct FrameDirSource {
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl FrameDirSource {
    pub fn open(dir: &str) -> Result<Self, Error> {
        let re = Regex::new(r"^frame_(\d+)\.(jpg|jpeg|png)$").unwrap();
        let mut indexed: Vec<(u64, PathBuf)> = Vec::new();

        for entry in fs::read_dir(dir).with_context(|| format!("could not read {}", dir))? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(caps) = re.captures(&file_name) {
                if let Some(matched) = caps.get(1) {
                    if let Ok(idx) = matched.as_str().parse::<u64>() {
                        indexed.push((idx, entry.path()));
                    }
                }
            }
        }
        if indexed.is_empty() {
            bail!("no frame files found in {}", dir);
        }
        indexed.sort_by_key(|(idx, _)| *idx);

        Ok(Self {
            frames: indexed.into_iter().map(|(_, path)| path).collect(),
            cursor: 0,
        })
    }
}

impl FrameSource for FrameDirSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, Error> {
        let path = match self.frames.get(self.cursor) {
            Some(path) => path,
            None => return Ok(None),
        };
        self.cursor += 1;
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        Ok(Some(decoded.to_rgb8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn frame_dir_replays_in_index_order() {
        let dir = std::env::temp_dir().join(format!("guardian_frames_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        // Written out of order; index 10 sorts after index 2 numerically.
        for (idx, shade) in [(10u64, 30u8), (1, 10), (2, 20)] {
            let img = RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]));
            img.save(dir.join(format!("frame_{}.png", idx))).unwrap();
        }
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let mut source = FrameDirSource::open(dir.to_str().unwrap()).unwrap();
        let mut shades = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            shades.push(frame.get_pixel(0, 0).0[0]);
        }
        assert_eq!(shades, vec![10, 20, 30]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = std::env::temp_dir().join(format!("guardian_empty_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        assert!(FrameDirSource::open(dir.to_str().unwrap()).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
