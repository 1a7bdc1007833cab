//! Frame ingestion sources.
//!
//! Sources abstract a continuously playing visual stream and expose the
//! current frame plus its dimensions on demand:
//!
//! - `DeviceSource`: a live capture device reached over HTTP (MJPEG stream
//!   or single-JPEG snapshot endpoint).
//! - `ClipSource`: a looping recorded clip (MJPEG file or a directory of
//!   JPEG stills).
//! - `stub://` synthetic backends on both, for tests and demos.
//!
//! All sources implement `FrameSource`: `connect()`, `next_frame()`,
//! `is_healthy()`, `stats()`, and `release()` for teardown. Access denial
//! on the device path is a recoverable error (`AccessDeniedError`) that the
//! pipeline surfaces with an explicit manual retry; sources never retry on
//! their own.

pub mod clip;
pub mod device;

pub use clip::{ClipConfig, ClipSource};
pub use device::{DeviceConfig, DeviceSource};

use anyhow::{Context, Result};
use std::time::Duration;

use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Capture-device access was denied. Recoverable: the owner may re-attempt
/// acquisition via an explicit retry, never an automatic loop.
#[derive(Clone, Debug)]
pub struct AccessDeniedError {
    pub source: String,
}

impl std::fmt::Display for AccessDeniedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "capture device access denied: {}", self.source)
    }
}
impl std::error::Error for AccessDeniedError {}

/// Statistics common to all sources.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A continuously playing visual stream.
pub trait FrameSource: Send {
    /// Acquire the underlying stream. May fail with `AccessDeniedError`.
    fn connect(&mut self) -> Result<()>;

    /// Capture the current frame.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release the underlying capture handle. Idempotent; called on
    /// teardown. A released source must be `connect()`ed again before use.
    fn release(&mut self);

    /// True when this is the primary live source (drives clip recording).
    fn is_live(&self) -> bool {
        false
    }
}

pub(crate) fn decode_jpeg(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let decoded = image::load_from_memory(bytes).context("decode jpeg frame")?;
    let rgb = decoded.into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok((rgb.into_raw(), width, height))
}

/// Locate one complete JPEG (SOI..EOI) inside a byte stream buffer.
pub(crate) fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_bounds_are_found_mid_buffer() {
        let buffer = [0x00, 0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xD9, 0x00];
        assert_eq!(find_jpeg_bounds(&buffer), Some((1, 7)));
        assert_eq!(find_jpeg_bounds(&buffer[..5]), None);
    }

    #[test]
    fn health_grace_has_a_floor() {
        assert!(health_grace(30) >= Duration::from_secs(2));
        assert_eq!(health_grace(1), Duration::from_secs(6));
    }
}
