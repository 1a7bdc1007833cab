//! Live capture device source.
//!
//! `DeviceSource` ingests frames from a capture device exposed over HTTP:
//! either a multipart MJPEG stream or a single-JPEG snapshot endpoint,
//! decided by the response content type at connect time. A `stub://` URL
//! selects a synthetic backend that fabricates frames in-process.
//!
//! HTTP 401/403 at connect time maps to `AccessDeniedError`; the source
//! stays in the unconnected state until the owner explicitly retries.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use super::{
    decode_jpeg, find_jpeg_bounds, frame_interval, health_grace, AccessDeniedError, FrameSource,
    SourceStats, MAX_JPEG_BYTES,
};
use crate::frame::Frame;
use crate::now_ms;

/// Configuration for a live capture device.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// Device URL. Supported schemes: http(s):// for MJPEG or JPEG
    /// snapshots, stub:// for the synthetic backend.
    pub url: String,
    /// Target frame rate; the source decimates to this rate.
    pub target_fps: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            target_fps: 10,
        }
    }
}

pub struct DeviceSource {
    backend: DeviceBackend,
}

enum DeviceBackend {
    Http(HttpDeviceSource),
    Synthetic(SyntheticDeviceSource),
}

impl DeviceSource {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            return Ok(Self {
                backend: DeviceBackend::Synthetic(SyntheticDeviceSource::new(config)),
            });
        }
        let url = Url::parse(&config.url).context("parse device url")?;
        match url.scheme() {
            "http" | "https" => Ok(Self {
                backend: DeviceBackend::Http(HttpDeviceSource::new(config)),
            }),
            other => Err(anyhow!(
                "unsupported device scheme '{}'; expected http(s) or stub",
                other
            )),
        }
    }
}

impl FrameSource for DeviceSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            DeviceBackend::Http(source) => source.connect(),
            DeviceBackend::Synthetic(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            DeviceBackend::Http(source) => source.next_frame(),
            DeviceBackend::Synthetic(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            DeviceBackend::Http(source) => source.is_healthy(),
            DeviceBackend::Synthetic(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            DeviceBackend::Http(source) => source.stats(),
            DeviceBackend::Synthetic(source) => source.stats(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            DeviceBackend::Http(source) => source.release(),
            DeviceBackend::Synthetic(source) => source.release(),
        }
    }

    fn is_live(&self) -> bool {
        true
    }
}

struct HttpDeviceSource {
    config: DeviceConfig,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl HttpDeviceSource {
    fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            stream: None,
            last_frame_at: None,
            connected_at: None,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        let response = match ureq::get(&self.config.url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code @ (401 | 403), _)) => {
                log::warn!("device {} denied access (status {})", self.config.url, code);
                return Err(AccessDeniedError {
                    source: self.config.url.clone(),
                }
                .into());
            }
            Err(e) => return Err(anyhow!("connect to capture device: {}", e)),
        };

        let content_type = response.header("Content-Type").unwrap_or("");
        if content_type.to_lowercase().contains("multipart") {
            let reader = response.into_reader();
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(reader)));
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
        }
        self.connected_at = Some(Instant::now());
        log::info!("DeviceSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("device source not connected; call connect() first"))?;
        let min_interval = frame_interval(self.config.target_fps);

        loop {
            let jpeg_bytes = match stream {
                HttpStream::Mjpeg(stream) => stream.read_next_jpeg(),
                HttpStream::SingleJpeg => fetch_single_jpeg(&self.config.url),
            }?;

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let (pixels, width, height) = decode_jpeg(&jpeg_bytes)?;
            self.frame_count += 1;
            self.last_frame_at = Some(now);
            return Ok(Frame::new(pixels, width, height, now_ms()));
        }
    }

    fn is_healthy(&self) -> bool {
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }

    fn release(&mut self) {
        self.stream = None;
        self.connected_at = None;
        self.last_frame_at = None;
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

// ----------------------------------------------------------------------------
// Synthetic backend (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticDeviceSource {
    config: DeviceConfig,
    connected: bool,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticDeviceSource {
    fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("DeviceSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("device source not connected; call connect() first"));
        }
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixel_count = (640 * 480 * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        Ok(Frame::new(pixels, 640, 480, now_ms()))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }

    fn release(&mut self) {
        self.connected = false;
    }
}
