//! Core data types for engagement sessions and the experiment.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One arm of the lead-capture experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Guide,
    Consultation,
    Recommendation,
    Control,
}

impl Variant {
    /// Every variant, in canonical order.
    pub const ALL: [Variant; 4] = [
        Variant::Guide,
        Variant::Consultation,
        Variant::Recommendation,
        Variant::Control,
    ];

    /// Wire identifier used in storage and analytics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Guide => "guide",
            Variant::Consultation => "consultation",
            Variant::Recommendation => "recommendation",
            Variant::Control => "control",
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Variant::Control)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "guide" => Ok(Variant::Guide),
            "consultation" => Ok(Variant::Consultation),
            "recommendation" => Ok(Variant::Recommendation),
            "control" => Ok(Variant::Control),
            other => Err(EngineError::InvalidInput(format!("Unknown variant: {other}"))),
        }
    }
}

/// Snapshot of the engagement metrics observed in one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub time_on_site_seconds: u64,
    pub max_scroll_depth_percent: f64,
    pub page_view_count: u32,
    pub exit_intent_fired: bool,
}

impl Default for SessionMetrics {
    /// A fresh session: the initial page load counts as the first view.
    fn default() -> Self {
        Self {
            time_on_site_seconds: 0,
            max_scroll_depth_percent: 0.0,
            page_view_count: 1,
            exit_intent_fired: false,
        }
    }
}

/// Decision-relevant state of one session, owned by the caller.
///
/// The evaluator never touches storage; whoever holds this value loads
/// `last_shown_at` before evaluating and persists changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementState {
    pub variant: Variant,
    pub has_triggered: bool,
    pub last_shown_at: Option<DateTime<Utc>>,
}

impl EngagementState {
    pub fn new(variant: Variant, last_shown_at: Option<DateTime<Utc>>) -> Self {
        Self {
            variant,
            has_triggered: false,
            last_shown_at,
        }
    }
}

/// Errors that can occur in the engagement engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type EngineResult<T> = Result<T, EngineError>;
