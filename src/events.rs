//! Incident events and the event store.
//!
//! `IncidentEvent` is the durable, user-facing record derived from a
//! positive detection. Events enter the store either pre-seeded (demo data
//! for the dashboard shell) or through the event synthesizer; synthesized
//! ids carry the `ai-` prefix with a monotonic counter so the shell can
//! distinguish them. After creation an event is immutable; the only store
//! mutations are append and remove, and removal releases the attached
//! evidence buffer along with the record.

use serde::Serialize;

use crate::evidence::Evidence;

/// Namespace prefix for synthesized event ids.
pub const AI_EVENT_PREFIX: &str = "ai-";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Display color used by the shell's severity indicators.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Low => "#44ff44",
            Severity::Medium => "#ffaa00",
            Severity::High => "#ff8800",
            Severity::Critical => "#ff4444",
        }
    }
}

/// A synthesized or seeded incident record.
#[derive(Clone, Debug)]
pub struct IncidentEvent {
    pub id: String,
    /// Classified incident type, e.g. "Person Fall Incident".
    pub kind: String,
    pub severity: Severity,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub location: String,
    pub description: String,
    pub camera_id: String,
    /// Discrete recommended actions, already derived.
    pub actions: Vec<String>,
    /// Visual record of the triggering moment; empty means "no evidence".
    pub evidence: Evidence,
    pub ai_summary: Option<String>,
    pub ai_suggestion: Option<String>,
}

impl IncidentEvent {
    /// True when this event was synthesized from a detection result.
    pub fn is_synthesized(&self) -> bool {
        self.id.starts_with(AI_EVENT_PREFIX)
    }

    /// A pre-seeded record for the dashboard shell. Carries no evidence.
    #[allow(clippy::too_many_arguments)]
    pub fn seeded(
        id: &str,
        kind: &str,
        severity: Severity,
        timestamp_ms: u64,
        location: &str,
        description: &str,
        camera_id: &str,
        actions: Vec<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            severity,
            timestamp_ms,
            location: location.to_string(),
            description: description.to_string(),
            camera_id: camera_id.to_string(),
            actions,
            evidence: Evidence::empty(),
            ai_summary: None,
            ai_suggestion: None,
        }
    }
}

/// Shell-facing projection of an event (no evidence bytes).
#[derive(Clone, Debug, Serialize)]
pub struct IncidentView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub timestamp_ms: u64,
    pub location: String,
    pub description: String,
    pub camera_id: String,
    pub actions: Vec<String>,
    pub has_evidence: bool,
}

impl From<&IncidentEvent> for IncidentView {
    fn from(ev: &IncidentEvent) -> Self {
        Self {
            id: ev.id.clone(),
            kind: ev.kind.clone(),
            severity: ev.severity,
            timestamp_ms: ev.timestamp_ms,
            location: ev.location.clone(),
            description: ev.description.clone(),
            camera_id: ev.camera_id.clone(),
            actions: ev.actions.clone(),
            has_evidence: !ev.evidence.is_empty(),
        }
    }
}

/// Ordered, deduplicated collection of incidents.
///
/// Append and remove are the only mutations; a stored event is never
/// edited in place. The store also owns the id counter for synthesized
/// events.
pub struct EventStore {
    events: Vec<IncidentEvent>,
    next_ai_id: u64,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_ai_id: 1,
        }
    }

    /// Allocate the next synthesized event id (`ai-1`, `ai-2`, ...).
    pub fn next_ai_id(&mut self) -> String {
        let id = format!("{}{}", AI_EVENT_PREFIX, self.next_ai_id);
        self.next_ai_id += 1;
        id
    }

    /// Append an event. Duplicate ids are rejected to keep the collection
    /// deduplicated; the caller logs and moves on.
    pub fn append(&mut self, event: IncidentEvent) -> bool {
        if self.events.iter().any(|e| e.id == event.id) {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Dismiss an event by id. Dropping the record releases its evidence.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.events.len();
        self.events.retain(|e| e.id != id);
        self.events.len() != before
    }

    /// Read-only ordered view of current incidents.
    pub fn events(&self) -> &[IncidentEvent] {
        &self.events
    }

    pub fn get(&self, id: &str) -> Option<&IncidentEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Shell-facing projections, in insertion order.
    pub fn views(&self) -> Vec<IncidentView> {
        self.events.iter().map(IncidentView::from).collect()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(id: &str) -> IncidentEvent {
        IncidentEvent::seeded(
            id,
            "Person Fall Incident",
            Severity::Critical,
            1,
            "Kitchen",
            "Fall detected - immediate attention required",
            "cam2",
            vec!["Contact emergency services immediately (911)".to_string()],
        )
    }

    #[test]
    fn append_preserves_order_and_dedupes() {
        let mut store = EventStore::new();
        assert!(store.append(seeded("seed-1")));
        assert!(store.append(seeded("seed-2")));
        assert!(!store.append(seeded("seed-1")));

        let ids: Vec<&str> = store.events().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["seed-1", "seed-2"]);

        let views = store.views();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id, "seed-1");
    }

    #[test]
    fn remove_dismisses_by_id() {
        let mut store = EventStore::new();
        store.append(seeded("seed-1"));
        assert!(store.remove("seed-1"));
        assert!(!store.remove("seed-1"));
        assert!(store.is_empty());
    }

    #[test]
    fn ai_ids_are_monotonic_and_namespaced() {
        let mut store = EventStore::new();
        assert_eq!(store.next_ai_id(), "ai-1");
        assert_eq!(store.next_ai_id(), "ai-2");

        let mut ev = seeded("x");
        ev.id = "ai-1".to_string();
        assert!(ev.is_synthesized());
        assert!(!seeded("seed-1").is_synthesized());
    }

    #[test]
    fn view_reports_evidence_presence() {
        let store_event = seeded("seed-1");
        let view = IncidentView::from(&store_event);
        assert!(!view.has_evidence);
        assert_eq!(view.severity, Severity::Critical);
    }

    #[test]
    fn severity_colors_match_shell_palette() {
        assert_eq!(Severity::Low.color(), "#44ff44");
        assert_eq!(Severity::Critical.color(), "#ff4444");
    }
}
