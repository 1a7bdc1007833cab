//! Notification endpoint client.
//!
//! Thin collaborator around the paging stub: POST `{message}` and read
//! back `{success, error?}`. Delivery failure is reported to the caller
//! and logged; it is never fatal to the pipeline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::events::IncidentEvent;

#[derive(Serialize)]
struct NotifyRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct NotifyResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct Notifier {
    endpoint: String,
    agent: ureq::Agent,
}

impl Notifier {
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

    /// The alert message template the shell sends for an incident.
    pub fn format_alert(event: &IncidentEvent) -> String {
        format!(
            "Guardian Alert: {} detected at {}. Severity: {}. {}",
            event.kind,
            event.location,
            event.severity.as_str().to_uppercase(),
            event.ai_summary.as_deref().unwrap_or(&event.description),
        )
    }

    pub fn send(&self, message: &str) -> Result<NotifyResponse> {
        let request = NotifyRequest { message };
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_string(&serde_json::to_string(&request)?)
            .context("send notification")?;
        let body = response
            .into_string()
            .context("read notification response")?;
        let parsed: NotifyResponse =
            serde_json::from_str(&body).context("parse notification response")?;
        Ok(parsed)
    }

    /// Send an alert for an incident, reporting but not propagating
    /// endpoint-level rejection.
    pub fn notify_incident(&self, event: &IncidentEvent) -> Result<bool> {
        let response = self.send(&Self::format_alert(event))?;
        if !response.success {
            log::warn!(
                "notification rejected for {}: {}",
                event.id,
                response.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(response.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{IncidentEvent, Severity};

    #[test]
    fn alert_message_carries_kind_location_and_severity() {
        let event = IncidentEvent::seeded(
            "ai-1",
            "Person Fall Incident",
            Severity::High,
            0,
            "Kitchen",
            "A person has fallen.",
            "cam2",
            vec![],
        );
        let message = Notifier::format_alert(&event);
        assert_eq!(
            message,
            "Guardian Alert: Person Fall Incident detected at Kitchen. Severity: HIGH. A person has fallen."
        );
    }
}
