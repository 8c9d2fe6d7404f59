//! Unit/location extraction and property id derivation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Property id used when no unit could be extracted.
pub const DEFAULT_PROPERTY_ID: &str = "P000";

/// Where a request is located.
///
/// `Unspecified` is a distinct variant, never an empty or placeholder string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitLocation {
    /// Normalized (upper-case) unit identifier, without the display prefix.
    Unit(String),
    Unspecified,
}

impl UnitLocation {
    /// Derive the property id: `P` + first three characters of the unit,
    /// right-padded with `0` to length three. Unspecified maps to `P000`.
    pub fn property_id(&self) -> String {
        match self {
            Self::Unit(u) => {
                let head: String = u.chars().take(3).collect();
                format!("P{:0<3}", head)
            }
            Self::Unspecified => DEFAULT_PROPERTY_ID.to_string(),
        }
    }
}

impl std::fmt::Display for UnitLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit(u) => write!(f, "Unit {}", u),
            Self::Unspecified => write!(f, "Unit not specified"),
        }
    }
}

/// Location patterns, tried in order. First match wins.
///
/// Unit tokens must contain a digit (or be a single letter with digits around
/// it) so that prose such as "the unit is leaking" does not match.
static UNIT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    const TOKEN: &str = r"([a-z]?\d+[a-z]?)\b";
    [
        ("apartment", format!(r"(?i)\bapartment\s*(?:no\.?|number)?\s*#?\s*{TOKEN}")),
        ("apt", format!(r"(?i)\bapt\.?\s*#?\s*{TOKEN}")),
        ("unit", format!(r"(?i)\bunit\s*#?\s*{TOKEN}")),
        ("room", format!(r"(?i)\broom\s*#?\s*{TOKEN}")),
        ("suite", format!(r"(?i)\bsuite\s*#?\s*{TOKEN}")),
        ("hash", format!(r"(?i)#\s*{TOKEN}")),
        ("bare", r"(?i)\b(\d{1,4}[a-z])\b".to_string()),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(&pattern).expect("valid unit pattern")))
    .collect()
});

/// Extract the unit referenced in `text`.
pub fn extract_unit(text: &str) -> UnitLocation {
    for (name, regex) in UNIT_PATTERNS.iter() {
        if let Some(caps) = regex.captures(text) {
            if let Some(m) = caps.get(1) {
                tracing::trace!(pattern = name, unit = m.as_str(), "Unit pattern matched");
                return UnitLocation::Unit(m.as_str().to_uppercase());
            }
        }
    }
    UnitLocation::Unspecified
}
