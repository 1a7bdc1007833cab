//! Event synthesis.
//!
//! Turns a positive detection outcome into normalized `IncidentEvent`
//! records: classifies an incident category, maps severity, derives a list
//! of discrete recommended actions, and attaches the evidence reference.
//!
//! Classification is an explicit ordered rule table (keyword → category),
//! evaluated case-insensitively in priority order with the first match
//! winning. It is a heuristic fallback for free-text results, not NLP;
//! every derivation here is pure and deterministic for identical input, so
//! tests assert exact equality.

use regex::Regex;
use std::sync::OnceLock;

use crate::cameras::CameraRecord;
use crate::events::{EventStore, IncidentEvent, Severity};
use crate::evidence::Evidence;
use crate::inference::{DetectionItem, DetectionOutcome, EmergencyLevel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncidentCategory {
    Fall,
    FireSmoke,
    Medical,
    Injury,
    Distress,
    UnusualActivity,
    Other,
}

/// Ordered keyword rules. First matching category wins; never weighted.
const CATEGORY_RULES: &[(&[&str], IncidentCategory, &str)] = &[
    (&["fallen", "fall"], IncidentCategory::Fall, "Person Fall Incident"),
    (&["fire", "smoke"], IncidentCategory::FireSmoke, "Fire/Smoke Detected"),
    (&["medical", "emergency"], IncidentCategory::Medical, "Medical Emergency"),
    (&["injury", "hurt"], IncidentCategory::Injury, "Injury Detected"),
    (&["distress", "help"], IncidentCategory::Distress, "Person in Distress"),
    (
        &["unusual", "suspicious"],
        IncidentCategory::UnusualActivity,
        "Unusual Activity Detected",
    ),
];

/// Canned recommended actions, indexed by category. Used when the
/// inference result carries no suggestion text.
pub fn canned_actions(category: IncidentCategory) -> &'static [&'static str] {
    match category {
        IncidentCategory::Fall => &[
            "Contact emergency services immediately (911)",
            "Do not move the person unless in immediate danger",
            "Check for responsiveness and breathing",
            "Gather medical information if person is conscious",
        ],
        IncidentCategory::Medical | IncidentCategory::Distress => &[
            "Approach the person calmly and assess their condition",
            "Call emergency medical services if needed",
            "Stay with the person until help arrives",
            "Document symptoms and behavior for medical personnel",
        ],
        IncidentCategory::UnusualActivity => &[
            "Contact local law enforcement immediately",
            "Do not approach the unauthorized individual",
            "Ensure all residents are safe and accounted for",
            "Activate additional security measures if available",
        ],
        IncidentCategory::FireSmoke | IncidentCategory::Injury | IncidentCategory::Other => &[
            "Assess the situation carefully",
            "Contact appropriate authorities if needed",
            "Document the incident for follow-up",
        ],
    }
}

fn match_rules(text: &str) -> Option<(IncidentCategory, &'static str)> {
    let lowered = text.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(keywords, _, _)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|&(_, category, label)| (category, label))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| capitalize(&word.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive the incident type and category for one detection item.
///
/// Preference order: the explicit `incident` field (run through the rule
/// table so variants like "person fallen" land on the canonical label,
/// title-cased otherwise), then the keyword rules over the summary, then a
/// sentence-cased prefix of the description ("Safety Alert" when the prefix
/// runs long).
pub fn classify_incident(incident: &str, summary: &str) -> (IncidentCategory, String) {
    let incident = incident.trim();
    if !incident.is_empty() && incident != "None" {
        if let Some((category, label)) = match_rules(incident) {
            return (category, label.to_string());
        }
        return (IncidentCategory::Other, title_case(incident));
    }

    if let Some((category, label)) = match_rules(summary) {
        return (category, label.to_string());
    }

    let first_sentence = summary.split('.').next().unwrap_or("").trim();
    if first_sentence.is_empty() || first_sentence.len() > 50 {
        (IncidentCategory::Other, "Safety Alert".to_string())
    } else {
        (IncidentCategory::Other, capitalize(first_sentence))
    }
}

/// Severity comes straight from the emergency level; absent or "None"
/// defaults to high.
pub fn derive_severity(level: EmergencyLevel) -> Severity {
    match level {
        EmergencyLevel::High | EmergencyLevel::None => Severity::High,
        EmergencyLevel::Medium => Severity::Medium,
        EmergencyLevel::Low => Severity::Low,
    }
}

fn sentence_splitter() -> &'static Regex {
    static SPLIT_RE: OnceLock<Regex> = OnceLock::new();
    SPLIT_RE.get_or_init(|| Regex::new(r"[.!?]+").unwrap())
}

/// Split a free-text suggestion into discrete actions.
///
/// Sentences are split on terminal punctuation, trimmed, capitalized, and
/// empty fragments dropped. A suggestion that yields nothing falls back to
/// the raw string; no suggestion at all falls back to the category's
/// canned list.
pub fn derive_actions(suggestion: &str, category: IncidentCategory) -> Vec<String> {
    let trimmed = suggestion.trim();
    if trimmed.is_empty() {
        return canned_actions(category)
            .iter()
            .map(|s| s.to_string())
            .collect();
    }

    let actions: Vec<String> = sentence_splitter()
        .split(trimmed)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(capitalize)
        .collect();

    if actions.is_empty() {
        vec![trimmed.to_string()]
    } else {
        actions
    }
}

/// The only constructor of synthesized incident events.
pub struct EventSynthesizer;

impl EventSynthesizer {
    pub fn new() -> Self {
        Self
    }

    fn item_qualifies(outcome: &DetectionOutcome, item: &DetectionItem) -> bool {
        let incident = item.incident.trim();
        outcome.danger || (!incident.is_empty() && incident != "None")
    }

    /// Synthesize incidents from one detection outcome and append them to
    /// the store. Negative outcomes produce nothing and leave the store
    /// untouched. Returns the ids of appended events.
    pub fn synthesize(
        &self,
        outcome: &DetectionOutcome,
        camera: &CameraRecord,
        evidence: Evidence,
        now_ms: u64,
        store: &mut EventStore,
    ) -> Vec<String> {
        if !outcome.is_positive() {
            return Vec::new();
        }

        let mut appended = Vec::new();
        for item in &outcome.detections {
            if !Self::item_qualifies(outcome, item) {
                continue;
            }

            let (category, kind) = classify_incident(&item.incident, &item.summary);
            let event = IncidentEvent {
                id: store.next_ai_id(),
                kind,
                severity: derive_severity(item.emergency_level),
                timestamp_ms: now_ms,
                location: camera.location.clone(),
                description: item.summary.clone(),
                camera_id: camera.id.clone(),
                actions: derive_actions(&item.suggestion, category),
                evidence: evidence.clone(),
                ai_summary: Some(item.summary.clone()),
                ai_suggestion: if item.suggestion.trim().is_empty() {
                    None
                } else {
                    Some(item.suggestion.clone())
                },
            };
            let id = event.id.clone();
            if store.append(event) {
                appended.push(id);
            }
        }
        appended
    }
}

impl Default for EventSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}
