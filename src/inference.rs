//! Remote inference client.
//!
//! The vision service is an opaque capability reached through one HTTP
//! round trip. The request carries the base64-encoded evidence snapshot
//! plus location and capture-time metadata; the response is a structured
//! detection outcome. Every failure mode (transport error, non-success
//! status, malformed payload) surfaces as `Err` from this boundary and
//! must never panic or leak past it; the pipeline clears its in-flight
//! state on all paths.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire-level emergency level reported per detection item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyLevel {
    #[serde(rename = "high")]
    High,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "low")]
    Low,
    #[default]
    #[serde(rename = "None")]
    None,
}

/// One detection item from the inference response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionItem {
    #[serde(default)]
    pub incident: String,
    #[serde(default)]
    pub emergency_level: EmergencyLevel,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub suggestion: String,
}

/// Structured result of one inference call. Consumed once by the event
/// synthesizer; never retained.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionOutcome {
    #[serde(default)]
    pub detections: Vec<DetectionItem>,
    #[serde(default)]
    pub danger: bool,
}

impl DetectionOutcome {
    /// True when this outcome should synthesize an incident: danger was
    /// flagged, or a non-sentinel detection is present.
    pub fn is_positive(&self) -> bool {
        if self.danger && !self.detections.is_empty() {
            return true;
        }
        self.detections
            .iter()
            .any(|d| !d.incident.is_empty() && d.incident != "None")
    }
}

#[derive(Serialize)]
struct DetectionRequest<'a> {
    base64_image: &'a str,
    location: &'a str,
    time: u64,
}

/// Seam between the pipeline and the remote vision capability.
///
/// Implementations run on the pipeline's inference worker thread and must
/// report failure as `Err`, never by panicking.
pub trait DetectionService: Send {
    fn analyze(&self, image: &[u8], location: &str, time_ms: u64) -> Result<DetectionOutcome>;
}

/// HTTP implementation of the inference contract.
pub struct HttpDetectionService {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpDetectionService {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            endpoint: endpoint.to_string(),
            agent,
        }
    }
}

impl DetectionService for HttpDetectionService {
    fn analyze(&self, image: &[u8], location: &str, time_ms: u64) -> Result<DetectionOutcome> {
        let base64_image = BASE64_STANDARD.encode(image);
        let request = DetectionRequest {
            base64_image: &base64_image,
            location,
            time: time_ms,
        };

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_string(&serde_json::to_string(&request)?)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    anyhow!("inference service returned status {}", code)
                }
                ureq::Error::Transport(t) => anyhow!("inference transport error: {}", t),
            })?;

        let body = response
            .into_string()
            .context("read inference response body")?;
        let outcome: DetectionOutcome =
            serde_json::from_str(&body).context("parse inference response")?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_response() {
        let json = r#"{
            "detections": [
                {
                    "incident": "person fallen",
                    "emergency_level": "high",
                    "summary": "A person has fallen and is not moving.",
                    "suggestion": "Call for help. Stay calm."
                }
            ],
            "danger": true
        }"#;
        let outcome: DetectionOutcome = serde_json::from_str(json).unwrap();
        assert!(outcome.danger);
        assert_eq!(outcome.detections.len(), 1);
        assert_eq!(outcome.detections[0].emergency_level, EmergencyLevel::High);
        assert!(outcome.is_positive());
    }

    #[test]
    fn none_sentinel_is_not_positive() {
        let outcome = DetectionOutcome {
            detections: vec![DetectionItem {
                incident: "None".to_string(),
                ..Default::default()
            }],
            danger: false,
        };
        assert!(!outcome.is_positive());
    }

    #[test]
    fn empty_outcome_is_not_positive() {
        assert!(!DetectionOutcome::default().is_positive());
    }

    #[test]
    fn missing_fields_default() {
        let outcome: DetectionOutcome = serde_json::from_str(r#"{"danger": false}"#).unwrap();
        assert!(outcome.detections.is_empty());
        assert!(!outcome.is_positive());
    }
}
