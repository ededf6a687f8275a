// Metric definitions and draft-value classification.

use serde::{Deserialize, Serialize};

/// The placeholder operators type while entering a decimal value ("." on the
/// numeric keypad). Never valid for persistence.
pub const PLACEHOLDER: &str = ".";

/// One performance metric tracked for a player during a recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Metric identifier.
    pub id: String,
    /// Display name (e.g., "Sprint time 30m").
    pub name: String,
    /// Measurement unit (e.g., "s", "cm", "reps").
    pub unit: String,
    /// True when a smaller value is the better result (time-based measures).
    pub lower_is_better: bool,
    /// Id of the already-persisted record for this player+metric pair, if
    /// one exists. Threaded through saves so the backend updates in place.
    pub record_id: Option<String>,
}

/// A value/note pair for one metric. Used both for the fetched baseline and
/// for the in-progress draft; values are kept as the raw entered string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub value: String,
    pub note: String,
}

impl MetricEntry {
    pub fn new(value: impl Into<String>, note: impl Into<String>) -> Self {
        MetricEntry {
            value: value.into(),
            note: note.into(),
        }
    }
}

/// Classification of a raw draft value string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    /// Nothing entered. Always acceptable, never persisted.
    Empty,
    /// A parseable number strictly greater than zero.
    Valid,
    /// The `"."` placeholder, or a value that parses to exactly zero.
    Forbidden,
    /// Anything else: unparseable text, negative numbers.
    Invalid,
}

/// Classify a raw draft value. Whitespace is trimmed before classification.
pub fn classify(raw: &str) -> ValueClass {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ValueClass::Empty;
    }
    if trimmed == PLACEHOLDER {
        return ValueClass::Forbidden;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n == 0.0 => ValueClass::Forbidden,
        Ok(n) if n > 0.0 => ValueClass::Valid,
        _ => ValueClass::Invalid,
    }
}

/// Parse a draft value into a number, returning `None` unless the value
/// classifies as `Valid`.
pub fn parse_value(raw: &str) -> Option<f64> {
    match classify(raw) {
        ValueClass::Valid => raw.trim().parse().ok(),
        _ => None,
    }
}

/// Fallback direction heuristic for metric payloads that predate the
/// explicit `lowerIsBetter` flag: a metric whose name mentions "time" is
/// assumed to be one where smaller is better.
pub fn derive_lower_is_better(name: &str) -> bool {
    name.to_lowercase().contains("time")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
