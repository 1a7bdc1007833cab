//! Looping recorded-clip source.
//!
//! `ClipSource` replays a recorded clip in a loop, standing in for rooms
//! without a live device. Two on-disk layouts are supported:
//!
//! - an MJPEG file (`.mjpeg`/`.mjpg`): concatenated JPEG frames, split on
//!   SOI/EOI markers at connect time;
//! - a directory of JPEG stills, replayed in filename order.
//!
//! Frames stay encoded in memory and are decoded one at a time on demand.
//! A `stub://` path selects the synthetic backend.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use super::{decode_jpeg, find_jpeg_bounds, FrameSource, SourceStats};
use crate::frame::Frame;
use crate::now_ms;

/// Configuration for a looping clip source.
#[derive(Clone, Debug)]
pub struct ClipConfig {
    /// Local clip path (MJPEG file or stills directory), or stub://.
    pub path: String,
    /// Target frame rate; advisory for the owning tick loop.
    pub target_fps: u32,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            path: "stub://room_loop".to_string(),
            target_fps: 10,
        }
    }
}

pub struct ClipSource {
    config: ClipConfig,
    /// Encoded JPEG frames of the clip, in playback order.
    encoded: Vec<Vec<u8>>,
    cursor: usize,
    connected: bool,
    frame_count: u64,
    synthetic: bool,
}

impl ClipSource {
    pub fn new(config: ClipConfig) -> Result<Self> {
        if config.path.trim().is_empty() {
            return Err(anyhow!("clip path must not be empty"));
        }
        if config.path.contains("://") && !config.path.starts_with("stub://") {
            return Err(anyhow!("clip source only supports local paths (no URL schemes)"));
        }
        let synthetic = config.path.starts_with("stub://");
        Ok(Self {
            config,
            encoded: Vec::new(),
            cursor: 0,
            connected: false,
            frame_count: 0,
            synthetic,
        })
    }

    fn load_mjpeg_file(path: &Path) -> Result<Vec<Vec<u8>>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read clip file {}", path.display()))?;
        let mut frames = Vec::new();
        let mut offset = 0;
        while let Some((start, end)) = find_jpeg_bounds(&bytes[offset..]) {
            frames.push(bytes[offset + start..offset + end].to_vec());
            offset += end;
        }
        if frames.is_empty() {
            return Err(anyhow!("no jpeg frames found in {}", path.display()));
        }
        Ok(frames)
    }

    fn load_stills_dir(path: &Path) -> Result<Vec<Vec<u8>>> {
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .with_context(|| format!("read clip directory {}", path.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|ext| ext.to_str()),
                    Some("jpg" | "jpeg")
                )
            })
            .collect();
        entries.sort();
        let mut frames = Vec::with_capacity(entries.len());
        for entry in entries {
            frames.push(
                std::fs::read(&entry)
                    .with_context(|| format!("read still {}", entry.display()))?,
            );
        }
        if frames.is_empty() {
            return Err(anyhow!("no jpeg stills found in {}", path.display()));
        }
        Ok(frames)
    }
}

impl FrameSource for ClipSource {
    fn connect(&mut self) -> Result<()> {
        if self.synthetic {
            self.connected = true;
            log::info!("ClipSource: connected to {} (synthetic)", self.config.path);
            return Ok(());
        }

        let path = Path::new(&self.config.path);
        self.encoded = if path.is_dir() {
            Self::load_stills_dir(path)?
        } else {
            Self::load_mjpeg_file(path)?
        };
        self.cursor = 0;
        self.connected = true;
        log::info!(
            "ClipSource: loaded {} frames from {}",
            self.encoded.len(),
            self.config.path
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("clip source not connected; call connect() first"));
        }

        if self.synthetic {
            self.frame_count += 1;
            let pixel_count = (320 * 240 * 3) as usize;
            let mut pixels = vec![0u8; pixel_count];
            for (i, pixel) in pixels.iter_mut().enumerate() {
                *pixel = ((i as u64 + self.frame_count) % 256) as u8;
            }
            return Ok(Frame::new(pixels, 320, 240, now_ms()));
        }

        // Loop the clip.
        let encoded = &self.encoded[self.cursor];
        self.cursor = (self.cursor + 1) % self.encoded.len();
        let (pixels, width, height) = decode_jpeg(encoded)?;
        self.frame_count += 1;
        Ok(Frame::new(pixels, width, height, now_ms()))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.path.clone(),
        }
    }

    fn release(&mut self) {
        self.connected = false;
        self.encoded.clear();
        self.encoded.shrink_to_fit();
        self.cursor = 0;
    }
}
