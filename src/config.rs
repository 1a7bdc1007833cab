use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CAMERA_ID: &str = "cam1";
const DEFAULT_SOURCE_URL: &str = "stub://front_camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_DETECTION_ENDPOINT: &str = "http://127.0.0.1:8000/detection/process";
const DEFAULT_NOTIFY_ENDPOINT: &str = "http://127.0.0.1:8000/notify";
// The two shipped variants throttled at 1000ms and 5000ms; the steady-state
// variant's value is the default and the interval stays configurable.
const DEFAULT_MIN_INTERVAL_MS: u64 = 5000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize, Default)]
struct GuardianConfigFile {
    camera_id: Option<String>,
    source: Option<SourceConfigFile>,
    detection: Option<DetectionConfigFile>,
    overlay: Option<OverlayConfigFile>,
    notify: Option<NotifyConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    endpoint: Option<String>,
    min_interval_ms: Option<u64>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GuardianConfig {
    pub camera_id: String,
    pub source: SourceSettings,
    pub detection: DetectionSettings,
    pub overlay_enabled: bool,
    pub notify_endpoint: String,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub endpoint: String,
    pub min_interval: Duration,
    pub timeout: Duration,
}

impl GuardianConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GUARDIAN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuardianConfigFile) -> Self {
        let camera_id = file
            .camera_id
            .unwrap_or_else(|| DEFAULT_CAMERA_ID.to_string());
        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
        };
        let detection = DetectionSettings {
            endpoint: file
                .detection
                .as_ref()
                .and_then(|detection| detection.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_DETECTION_ENDPOINT.to_string()),
            min_interval: Duration::from_millis(
                file.detection
                    .as_ref()
                    .and_then(|detection| detection.min_interval_ms)
                    .unwrap_or(DEFAULT_MIN_INTERVAL_MS),
            ),
            timeout: Duration::from_millis(
                file.detection
                    .as_ref()
                    .and_then(|detection| detection.timeout_ms)
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
            ),
        };
        let overlay_enabled = file
            .overlay
            .and_then(|overlay| overlay.enabled)
            .unwrap_or(true);
        let notify_endpoint = file
            .notify
            .and_then(|notify| notify.endpoint)
            .unwrap_or_else(|| DEFAULT_NOTIFY_ENDPOINT.to_string());
        Self {
            camera_id,
            source,
            detection,
            overlay_enabled,
            notify_endpoint,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(camera_id) = std::env::var("GUARDIAN_CAMERA_ID") {
            if !camera_id.trim().is_empty() {
                self.camera_id = camera_id;
            }
        }
        if let Ok(url) = std::env::var("GUARDIAN_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(endpoint) = std::env::var("GUARDIAN_DETECTION_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.detection.endpoint = endpoint;
            }
        }
        if let Ok(interval) = std::env::var("GUARDIAN_MIN_INTERVAL_MS") {
            let ms: u64 = interval.parse().map_err(|_| {
                anyhow!("GUARDIAN_MIN_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.detection.min_interval = Duration::from_millis(ms);
        }
        if let Ok(endpoint) = std::env::var("GUARDIAN_NOTIFY_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.notify_endpoint = endpoint;
            }
        }
        if let Ok(overlay) = std::env::var("GUARDIAN_OVERLAY") {
            match overlay.trim() {
                "1" | "true" | "on" => self.overlay_enabled = true,
                "0" | "false" | "off" => self.overlay_enabled = false,
                other => {
                    return Err(anyhow!(
                        "GUARDIAN_OVERLAY must be one of 1/0/true/false/on/off, got '{}'",
                        other
                    ))
                }
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera_id.trim().is_empty() {
            return Err(anyhow!("camera_id must not be empty"));
        }
        if self.detection.min_interval.as_millis() == 0 {
            return Err(anyhow!("detection min_interval must be greater than zero"));
        }
        if self.detection.timeout.as_millis() == 0 {
            return Err(anyhow!("detection timeout must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        Ok(())
    }

    /// True when the configured source is a recorded clip rather than a
    /// live device (local path, no URL scheme).
    pub fn source_is_clip(&self) -> bool {
        let url = &self.source.url;
        !url.starts_with("stub://") && !url.contains("://")
    }
}

fn read_config_file(path: &Path) -> Result<GuardianConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
