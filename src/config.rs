//! Configuration types.
//!
//! Everything here is built once at startup and shared read-only.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::assignment::AssignmentTable;
use crate::pipeline::rules::PatternMatcher;
use crate::pipeline::types::BusinessHours;
use crate::tickets::sla::{EscalationPolicy, SlaTable};

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Strategy runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum model-backed strategies per message.
    pub max_model_strategies: usize,
    /// Per-strategy time budget.
    pub model_timeout: Duration,
    /// Policy snippets handed to the retrieval strategy.
    pub retrieval_top_k: usize,
    /// LLM temperature for reply drafting.
    pub temperature: f32,
    /// Max tokens for LLM replies.
    pub max_tokens: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_model_strategies: 2,
            model_timeout: Duration::from_secs(8),
            retrieval_top_k: 3,
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_model_strategies: env_parse("TRIAGE_MAX_MODEL_STRATEGIES")
                .unwrap_or(defaults.max_model_strategies),
            model_timeout: env_parse("TRIAGE_MODEL_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.model_timeout),
            ..defaults
        }
    }
}

/// Waiting-zone configuration.
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    /// Minutes an entry stays selectable.
    pub expire_minutes: u32,
    /// Settled (selected/expired) entries kept in memory.
    pub history_limit: usize,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            expire_minutes: 24 * 60,
            history_limit: 100,
        }
    }
}

impl ZoneConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            expire_minutes: env_parse("TRIAGE_SELECTION_EXPIRE_MIN")
                .unwrap_or(defaults.expire_minutes),
            ..defaults
        }
    }
}

/// Process-wide rule tables.
#[derive(Debug, Clone, Default)]
pub struct Rulebook {
    pub matcher: PatternMatcher,
    pub assignments: AssignmentTable,
    pub sla: SlaTable,
    pub escalation: EscalationPolicy,
    pub business_hours: BusinessHours,
}

/// Office hours from `TRIAGE_BUSINESS_OPEN_HOUR`, `TRIAGE_BUSINESS_CLOSE_HOUR`
/// and `TRIAGE_UTC_OFFSET_MINUTES`. Without an explicit offset the host's
/// local offset (`local_offset_minutes`) is used.
fn business_hours_from(
    lookup: impl Fn(&str) -> Option<String>,
    local_offset_minutes: i32,
) -> Result<BusinessHours, ConfigError> {
    let defaults = BusinessHours::default();
    let parse = |key: &str, default: i64, range: std::ops::RangeInclusive<i64>| {
        let Some(raw) = lookup(key) else {
            return Ok(default);
        };
        raw.trim()
            .parse::<i64>()
            .ok()
            .filter(|v| range.contains(v))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a number in {range:?}, got {raw:?}"),
            })
    };
    Ok(BusinessHours {
        open_hour: parse("TRIAGE_BUSINESS_OPEN_HOUR", defaults.open_hour.into(), 0..=23)? as u32,
        close_hour: parse("TRIAGE_BUSINESS_CLOSE_HOUR", defaults.close_hour.into(), 0..=23)? as u32,
        utc_offset_minutes: parse(
            "TRIAGE_UTC_OFFSET_MINUTES",
            local_offset_minutes.into(),
            -14 * 60..=14 * 60,
        )? as i32,
    })
}

impl Rulebook {
    /// Default tables with escalation contacts and office hours taken from the environment.
    pub fn from_env() -> Result<Arc<Self>, ConfigError> {
        let mut rulebook = Self::default();
        let local_offset = chrono::Local::now().offset().local_minus_utc() / 60;
        rulebook.business_hours = business_hours_from(|k| std::env::var(k).ok(), local_offset)?;
        let contacts = [
            ("TRIAGE_SUPERVISOR_EMAIL", &mut rulebook.escalation.supervisor),
            (
                "TRIAGE_CONTRACTOR_COORDINATOR_EMAIL",
                &mut rulebook.escalation.contractor_coordinator,
            ),
            (
                "TRIAGE_EMERGENCY_COORDINATOR_EMAIL",
                &mut rulebook.escalation.emergency_coordinator,
            ),
        ];
        for (key, slot) in contacts {
            if let Ok(value) = std::env::var(key) {
                if !value.contains('@') {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("expected an email address, got {value:?}"),
                    });
                }
                *slot = value;
            }
        }
        Ok(Arc::new(rulebook))
    }
}
