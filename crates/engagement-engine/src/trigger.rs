//! Per-variant trigger rules and the once-per-session trigger latch.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::frequency::cooldown_elapsed;
use crate::types::{EngagementState, SessionMetrics, Variant};

/// Guide: seconds on site before the rule can hold.
pub const GUIDE_MIN_SECONDS: u64 = 60;
/// Guide: scroll depth (percent) before the rule can hold.
pub const GUIDE_MIN_SCROLL: f64 = 50.0;
/// Consultation: seconds on site for the engaged-reader branch.
pub const CONSULTATION_MIN_SECONDS: u64 = 45;
/// Consultation: scroll depth (percent) for the engaged-reader branch.
pub const CONSULTATION_MIN_SCROLL: f64 = 40.0;
/// Recommendation: page views before the rule holds.
pub const RECOMMENDATION_MIN_PAGE_VIEWS: u32 = 2;
/// Recommendation: seconds on site before the rule holds.
pub const RECOMMENDATION_MIN_SECONDS: u64 = 90;

/// Whether `variant`'s rule is satisfied by `metrics`. Control never is.
pub fn rule_satisfied(variant: Variant, metrics: &SessionMetrics) -> bool {
    match variant {
        Variant::Guide => {
            metrics.time_on_site_seconds >= GUIDE_MIN_SECONDS
                && metrics.max_scroll_depth_percent >= GUIDE_MIN_SCROLL
        }
        Variant::Consultation => {
            (metrics.time_on_site_seconds >= CONSULTATION_MIN_SECONDS
                && metrics.max_scroll_depth_percent >= CONSULTATION_MIN_SCROLL)
                || metrics.exit_intent_fired
        }
        Variant::Recommendation => {
            metrics.page_view_count >= RECOMMENDATION_MIN_PAGE_VIEWS
                || metrics.time_on_site_seconds >= RECOMMENDATION_MIN_SECONDS
        }
        Variant::Control => false,
    }
}

/// Human-readable form of a variant's rule.
pub fn rule_description(variant: Variant) -> String {
    match variant {
        Variant::Guide => format!(
            "time_on_site >= {GUIDE_MIN_SECONDS}s AND scroll_depth >= {GUIDE_MIN_SCROLL}%"
        ),
        Variant::Consultation => format!(
            "(time_on_site >= {CONSULTATION_MIN_SECONDS}s AND scroll_depth >= {CONSULTATION_MIN_SCROLL}%) OR exit_intent"
        ),
        Variant::Recommendation => format!(
            "page_views >= {RECOMMENDATION_MIN_PAGE_VIEWS} OR time_on_site >= {RECOMMENDATION_MIN_SECONDS}s"
        ),
        Variant::Control => "never".to_string(),
    }
}

/// Why a popup was not triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    AlreadyTriggered,
    ControlVariant,
    CoolingDown,
    RuleNotMet,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Trigger {
        variant: Variant,
        metrics: SessionMetrics,
    },
    Hold { reason: HoldReason },
}

impl Decision {
    pub fn is_trigger(&self) -> bool {
        matches!(self, Decision::Trigger { .. })
    }
}

/// Decide whether to show the popup for this snapshot. Pure.
pub fn evaluate(
    state: &EngagementState,
    metrics: &SessionMetrics,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Decision {
    let hold = |reason| Decision::Hold { reason };

    if state.has_triggered {
        return hold(HoldReason::AlreadyTriggered);
    }
    if state.variant.is_control() {
        return hold(HoldReason::ControlVariant);
    }
    if !cooldown_elapsed(state.last_shown_at, now, cooldown) {
        return hold(HoldReason::CoolingDown);
    }
    if !rule_satisfied(state.variant, metrics) {
        return hold(HoldReason::RuleNotMet);
    }

    Decision::Trigger {
        variant: state.variant,
        metrics: *metrics,
    }
}

/// Lifecycle of the trigger for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPhase {
    /// No signal has been evaluated yet.
    Idle,
    /// Signals are being evaluated against the rule.
    Evaluating,
    /// The popup was authorized. Terminal.
    Triggered,
}

/// Latching state machine around [`evaluate`].
#[derive(Debug, Clone)]
pub struct TriggerEvaluator {
    state: EngagementState,
    phase: TriggerPhase,
    cooldown: Duration,
}

impl TriggerEvaluator {
    pub fn new(variant: Variant, cooldown: Duration) -> Self {
        Self {
            state: EngagementState::new(variant, None),
            phase: TriggerPhase::Idle,
            cooldown,
        }
    }

    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }

    pub fn state(&self) -> &EngagementState {
        &self.state
    }

    pub fn has_triggered(&self) -> bool {
        self.state.has_triggered
    }

    /// Evaluate against the latest metrics and the freshly read frequency
    /// record. Latches on the first `Trigger`; afterwards always holds.
    pub fn check(
        &mut self,
        metrics: &SessionMetrics,
        last_shown_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Decision {
        if self.phase == TriggerPhase::Triggered {
            return Decision::Hold {
                reason: HoldReason::AlreadyTriggered,
            };
        }

        self.phase = TriggerPhase::Evaluating;
        self.state.last_shown_at = last_shown_at;

        let decision = evaluate(&self.state, metrics, now, self.cooldown);
        if decision.is_trigger() {
            self.state.has_triggered = true;
            self.phase = TriggerPhase::Triggered;
        }
        decision
    }
}
