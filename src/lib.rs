//! Guardian Agent
//!
//! This crate implements the core pipeline of a live-video safety
//! monitoring client: it watches a camera feed, periodically submits
//! sampled frames to a remote vision-inference service, and converts
//! positive detections into durable, user-actionable incident records
//! with attached visual evidence.
//!
//! # Architecture
//!
//! ```text
//! frame source --(tick)--> pose overlay (optional)
//!                     \--> detection scheduler gate
//!                            \--> evidence capturer
//!                                   \--> inference client (worker thread)
//!                                          \--> event synthesizer
//!                                                 \--> event store
//! ```
//!
//! The tick loop is single-threaded and cooperative; the one remote call
//! runs on a dedicated worker thread behind a single-flight, time-windowed
//! rate limiter. Teardown is deterministic: the source is released, the
//! clip recorder stopped, and any still-in-flight inference result is
//! discarded rather than mutating state.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (HTTP capture device, looping clip, stubs)
//! - `frame` / `pose` / `overlay`: frames, keypoints, skeleton rendering
//! - `scheduler` / `evidence` / `inference` / `synth`: the sampling path
//! - `events` / `cameras` / `notify`: incident store and collaborators
//! - `pipeline`: the owning monitor loop
//! - `config`: guardiand configuration

use std::time::{SystemTime, UNIX_EPOCH};

pub mod cameras;
pub mod config;
pub mod events;
pub mod evidence;
pub mod frame;
pub mod inference;
pub mod ingest;
pub mod notify;
pub mod overlay;
pub mod pipeline;
pub mod pose;
pub mod scheduler;
pub mod synth;

pub use cameras::{CameraDirectory, CameraRecord, CameraStatus};
pub use events::{EventStore, IncidentEvent, IncidentView, Severity, AI_EVENT_PREFIX};
pub use evidence::{ClipRecorder, Evidence, EvidenceFormat, SnapshotCapturer};
pub use frame::{Frame, Keypoint, KeypointSet};
pub use inference::{
    DetectionItem, DetectionOutcome, DetectionService, EmergencyLevel, HttpDetectionService,
};
pub use ingest::{
    AccessDeniedError, ClipConfig, ClipSource, DeviceConfig, DeviceSource, FrameSource,
    SourceStats,
};
pub use notify::{Notifier, NotifyResponse};
pub use overlay::{PoseOverlay, POSE_CONNECTIONS, VISIBILITY_THRESHOLD};
pub use pipeline::{HealthStatus, Monitor, MonitorSettings, MonitorState, TickReport};
pub use pose::{PoseEstimator, StubPoseEstimator};
pub use scheduler::{DetectionScheduler, SchedulerPhase};
pub use synth::{
    canned_actions, classify_incident, derive_actions, derive_severity, EventSynthesizer,
    IncidentCategory,
};

/// Milliseconds since the Unix epoch. Clock skew earlier than the epoch
/// collapses to zero rather than panicking.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
