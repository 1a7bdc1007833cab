//! Evidence capture.
//!
//! When a detection call is triggered, the pipeline attaches a visual record
//! of the triggering moment to the eventual incident. Two capturers exist:
//!
//! - `SnapshotCapturer`: encodes the current frame into a compact image
//!   buffer, synchronously with respect to the triggering tick.
//! - `ClipRecorder`: for the live source, continuously records encoded
//!   chunks into a bounded ring buffer from the moment the source starts;
//!   on trigger the newest chunk is handed to the caller. The recorder
//!   negotiates an encoding from an ordered fallback list and is stopped
//!   and released when the source is torn down.
//!
//! Capture failure is never an error upward: both capturers degrade to the
//! empty `Evidence` handle, which consumers render as "no evidence".

use std::collections::VecDeque;
use std::io::Cursor;
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::frame::Frame;

/// Encodings tried in order when the recorder negotiates a format.
pub const ENCODING_FALLBACK: &[EvidenceFormat] = &[EvidenceFormat::Jpeg, EvidenceFormat::Png];

const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Bounds on the rolling clip buffer.
pub const MAX_CLIP_CHUNKS: usize = 50;
pub const MAX_CLIP_AGE_SECS: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvidenceFormat {
    Jpeg,
    Png,
}

impl EvidenceFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            EvidenceFormat::Jpeg => "image/jpeg",
            EvidenceFormat::Png => "image/png",
        }
    }
}

/// An owned, encoded visual record. A zero-size buffer is the explicit
/// "empty/unavailable" state and is not an error.
#[derive(Clone, Debug)]
pub struct Evidence {
    bytes: Vec<u8>,
    format: EvidenceFormat,
}

impl Evidence {
    pub fn new(bytes: Vec<u8>, format: EvidenceFormat) -> Self {
        Self { bytes, format }
    }

    pub fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            format: EvidenceFormat::Jpeg,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn format(&self) -> EvidenceFormat {
        self.format
    }
}

fn encode_frame(frame: &Frame, format: EvidenceFormat, quality: u8) -> Option<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let result = match format {
        EvidenceFormat::Jpeg => JpegEncoder::new_with_quality(&mut buf, quality).write_image(
            frame.pixels(),
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        ),
        EvidenceFormat::Png => PngEncoder::new(&mut buf).write_image(
            frame.pixels(),
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        ),
    };
    match result {
        Ok(()) => Some(buf.into_inner()),
        Err(e) => {
            log::warn!("evidence encode failed ({:?}): {}", format, e);
            None
        }
    }
}

/// Single-frame snapshot capturer.
pub struct SnapshotCapturer {
    quality: u8,
}

impl SnapshotCapturer {
    pub fn new() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Capture the frame as an encoded snapshot. Falls back through the
    /// supported encodings; degrades to empty evidence if all fail.
    pub fn capture(&self, frame: &Frame) -> Evidence {
        for &format in ENCODING_FALLBACK {
            if let Some(bytes) = encode_frame(frame, format, self.quality) {
                return Evidence::new(bytes, format);
            }
        }
        log::warn!("snapshot capture failed; attaching empty evidence");
        Evidence::empty()
    }
}

impl Default for SnapshotCapturer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling short-clip recorder for the live source.
///
/// Chunks are encoded eagerly at record time so `take()` is cheap at the
/// trigger instant. The buffer is bounded by chunk count and age; old
/// chunks are evicted on push.
pub struct ClipRecorder {
    chunks: VecDeque<(Instant, Vec<u8>)>,
    negotiated: Option<EvidenceFormat>,
    quality: u8,
    max_chunks: usize,
    max_age: Duration,
    stopped: bool,
}

impl ClipRecorder {
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::with_capacity(MAX_CLIP_CHUNKS),
            negotiated: None,
            quality: DEFAULT_JPEG_QUALITY,
            max_chunks: MAX_CLIP_CHUNKS,
            max_age: Duration::from_secs(MAX_CLIP_AGE_SECS),
            stopped: false,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn memory_bytes(&self) -> usize {
        self.chunks.iter().map(|(_, c)| c.len()).sum()
    }

    /// Format settled by negotiation, if any chunk has been recorded.
    pub fn negotiated_format(&self) -> Option<EvidenceFormat> {
        self.negotiated
    }

    /// Record one frame into the rolling buffer.
    ///
    /// The first successful encode settles the format for the rest of the
    /// recording; negotiation walks `ENCODING_FALLBACK` in order.
    pub fn record(&mut self, frame: &Frame) {
        if self.stopped {
            return;
        }

        let encoded = match self.negotiated {
            Some(format) => encode_frame(frame, format, self.quality),
            None => ENCODING_FALLBACK.iter().find_map(|&format| {
                let bytes = encode_frame(frame, format, self.quality)?;
                self.negotiated = Some(format);
                Some(bytes)
            }),
        };
        let Some(bytes) = encoded else {
            return;
        };

        let now = Instant::now();
        while let Some((at, _)) = self.chunks.front() {
            if now.duration_since(*at) > self.max_age {
                self.chunks.pop_front();
            } else {
                break;
            }
        }
        while self.chunks.len() >= self.max_chunks {
            self.chunks.pop_front();
        }
        self.chunks.push_back((now, bytes));
    }

    /// Hand the recording to the caller: the newest chunk becomes the
    /// evidence, and the buffer is drained. Empty evidence if nothing was
    /// recorded.
    pub fn take(&mut self) -> Evidence {
        let newest = self.chunks.pop_back();
        self.chunks.clear();
        match (newest, self.negotiated) {
            (Some((_, bytes)), Some(format)) => Evidence::new(bytes, format),
            _ => Evidence::empty(),
        }
    }

    /// Stop recording and release the buffer. Called on source teardown.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.chunks.clear();
        self.chunks.shrink_to_fit();
    }
}

impl Default for ClipRecorder {
    fn default() -> Self {
        Self::new()
    }
}
