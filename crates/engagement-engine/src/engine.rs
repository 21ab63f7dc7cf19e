//! The per-session reducer tying signals, assignment, gating and the popup together.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::{AnalyticsEvent, AnalyticsSink, EventName, TracingSink};
use crate::clock::{Clock, SystemClock};
use crate::frequency::{FrequencyGate, DEFAULT_COOLDOWN_HOURS, MAX_COOLDOWN_HOURS};
use crate::presenter::{
    compose_message, ChannelRequest, MessagingChannel, PopupPresenter, PopupStatus, PopupView,
    TracingChannel,
};
use crate::signals::{SignalTracker, SignalUpdate};
use crate::storage::KeyValueStore;
use crate::trigger::{Decision, TriggerEvaluator, TriggerPhase};
use crate::types::{EngagementState, EngineError, EngineResult, SessionMetrics, Variant};
use crate::variant::{VariantAssigner, WeightTable, FALLBACK_VARIANT};

fn default_cooldown_hours() -> i64 {
    DEFAULT_COOLDOWN_HOURS
}

/// Tunables for one deployment of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub weights: WeightTable,
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: WeightTable::default(),
            cooldown_hours: DEFAULT_COOLDOWN_HOURS,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Strict check used by tooling. The engine itself tolerates a bad
    /// table by falling back to a fixed variant.
    pub fn validate(&self) -> EngineResult<()> {
        self.weights.validate()?;
        if !(0..=MAX_COOLDOWN_HOURS).contains(&self.cooldown_hours) {
            return Err(EngineError::Config(format!(
                "cooldown_hours must be between 0 and {MAX_COOLDOWN_HOURS}, got {}",
                self.cooldown_hours
            )));
        }
        Ok(())
    }

    /// The cool-down as a duration. Out-of-range hours use the default.
    pub fn cooldown(&self) -> Duration {
        let hours = if (0..=MAX_COOLDOWN_HOURS).contains(&self.cooldown_hours) {
            self.cooldown_hours
        } else {
            DEFAULT_COOLDOWN_HOURS
        };
        Duration::hours(hours)
    }
}

/// Collaborators the engine talks to.
pub struct EnginePorts {
    /// Lives as long as the visitor's session (tab).
    pub session_store: Box<dyn KeyValueStore>,
    /// Survives across sessions.
    pub persistent_store: Box<dyn KeyValueStore>,
    pub analytics: Box<dyn AnalyticsSink>,
    pub channel: Box<dyn MessagingChannel>,
    pub clock: Box<dyn Clock>,
}

impl EnginePorts {
    /// Ports with logging analytics, a logging channel and the system clock.
    pub fn new(session_store: Box<dyn KeyValueStore>, persistent_store: Box<dyn KeyValueStore>) -> Self {
        Self {
            session_store,
            persistent_store,
            analytics: Box::new(TracingSink),
            channel: Box::new(TracingChannel),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_analytics(mut self, sink: impl AnalyticsSink + 'static) -> Self {
        self.analytics = Box::new(sink);
        self
    }

    pub fn with_channel(mut self, channel: impl MessagingChannel + 'static) -> Self {
        self.channel = Box::new(channel);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }
}

/// Serializable view of a running session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub variant: Variant,
    pub phase: TriggerPhase,
    pub popup: PopupStatus,
    pub metrics: SessionMetrics,
    pub last_shown_at: Option<DateTime<Utc>>,
    pub eligible: bool,
}

/// One visitor session of the lead-capture engine.
pub struct EngagementEngine<R: Rng> {
    session_id: Uuid,
    config: EngineConfig,
    assigner: VariantAssigner<R>,
    variant: Variant,
    tracker: SignalTracker,
    evaluator: TriggerEvaluator,
    gate: FrequencyGate,
    presenter: PopupPresenter,
    session_store: Box<dyn KeyValueStore>,
    analytics: Box<dyn AnalyticsSink>,
    channel: Box<dyn MessagingChannel>,
    clock: Box<dyn Clock>,
}

impl<R: Rng> EngagementEngine<R> {
    /// Start a session. The variant is assigned right away.
    pub fn new(config: EngineConfig, ports: EnginePorts, rng: R) -> Self {
        let EnginePorts {
            mut session_store,
            persistent_store,
            analytics,
            channel,
            clock,
        } = ports;

        let session_id = Uuid::new_v4();
        if let Err(e) = config.weights.validate() {
            tracing::warn!("Invalid weight table ({e}); assigning '{FALLBACK_VARIANT}'");
        }
        let mut assigner = VariantAssigner::new(config.weights.clone(), rng);
        let variant = assigner.assign(session_store.as_mut(), analytics.as_ref(), session_id);
        let cooldown = config.cooldown();

        tracing::info!("Session {session_id} started with variant '{variant}'");

        Self {
            session_id,
            config,
            assigner,
            variant,
            tracker: SignalTracker::new(),
            evaluator: TriggerEvaluator::new(variant, cooldown),
            gate: FrequencyGate::new(persistent_store, cooldown),
            presenter: PopupPresenter::new(),
            session_store,
            analytics,
            channel,
            clock,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The session's variant. Re-reads the assignment, which never changes.
    pub fn variant(&mut self) -> Variant {
        self.assigner
            .assign(self.session_store.as_mut(), self.analytics.as_ref(), self.session_id)
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.tracker.metrics()
    }

    pub fn state(&self) -> &EngagementState {
        self.evaluator.state()
    }

    pub fn phase(&self) -> TriggerPhase {
        self.evaluator.phase()
    }

    pub fn is_showing(&self) -> bool {
        self.presenter.is_showing()
    }

    pub fn popup(&self) -> Option<&PopupView> {
        self.presenter.view()
    }

    pub fn status(&self) -> SessionStatus {
        let now = self.clock.now();
        SessionStatus {
            session_id: self.session_id,
            variant: self.variant,
            phase: self.evaluator.phase(),
            popup: self.presenter.status(),
            metrics: self.tracker.metrics(),
            last_shown_at: self.gate.last_shown_at(),
            eligible: self.gate.is_eligible(now),
        }
    }

    /// Fold one signal into the session and re-run the trigger check.
    ///
    /// Returns the popup to render the one time the trigger fires.
    pub fn apply(&mut self, update: SignalUpdate) -> Option<PopupView> {
        if self.tracker.apply(update) {
            tracing::trace!(?update, "metrics changed");
        }
        self.check_trigger()
    }

    fn check_trigger(&mut self) -> Option<PopupView> {
        if self.evaluator.has_triggered() {
            return None;
        }

        let now = self.clock.now();
        let metrics = self.tracker.metrics();
        let decision = self.evaluator.check(&metrics, self.gate.last_shown_at(), now);

        match decision {
            Decision::Trigger { variant, metrics } => {
                tracing::info!(
                    "Popup triggered for '{variant}' after {}s, {:.0}% scroll, {} view(s)",
                    metrics.time_on_site_seconds,
                    metrics.max_scroll_depth_percent,
                    metrics.page_view_count
                );
                self.analytics.emit(
                    &self
                        .event(EventName::PopupTriggered)
                        .with("time_on_site_seconds", metrics.time_on_site_seconds)
                        .with("max_scroll_depth_percent", metrics.max_scroll_depth_percent)
                        .with("page_view_count", metrics.page_view_count)
                        .with("exit_intent_fired", metrics.exit_intent_fired),
                );
                self.presenter.show(variant)
            }
            Decision::Hold { reason } => {
                tracing::trace!(?reason, "trigger held");
                None
            }
        }
    }

    /// Dismiss the popup without converting. Starts the cooldown.
    pub fn close(&mut self) -> bool {
        let Some(view) = self.presenter.dismiss(false) else {
            return false;
        };

        self.gate.record_shown(self.clock.now());
        self.analytics.emit(&self.event(EventName::PopupClosed));
        tracing::info!("Popup '{}' closed", view.variant);
        true
    }

    /// Convert the lead and hand it to the messaging channel.
    ///
    /// A blank contact is rejected and the popup stays up. When no popup is
    /// showing nothing happens. A channel that fails to open is logged only:
    /// the conversion and the cooldown still count.
    pub fn submit(&mut self, contact: &str) -> EngineResult<Option<ChannelRequest>> {
        if !self.presenter.is_showing() {
            return Ok(None);
        }

        let contact = contact.trim();
        if contact.is_empty() {
            return Err(EngineError::InvalidInput("contact must not be empty".to_string()));
        }

        self.analytics.emit(&self.event(EventName::PopupConversion));

        let Some(view) = self.presenter.dismiss(true) else {
            return Ok(None);
        };
        self.gate.record_shown(self.clock.now());

        let request = ChannelRequest {
            message: compose_message(view.variant, contact, &self.tracker.metrics()),
            contact: contact.to_string(),
        };
        if let Err(e) = self.channel.open(&request) {
            tracing::warn!("Messaging channel did not open: {e}");
        }

        tracing::info!("Lead converted on '{}'", view.variant);
        Ok(Some(request))
    }

    /// When the visitor can see a popup again, `None` if they already can.
    pub fn eligible_at(&self) -> Option<DateTime<Utc>> {
        self.gate.eligible_at(self.clock.now())
    }

    /// Drop the cross-session impression record.
    pub fn clear_frequency_record(&mut self) {
        self.gate.clear();
    }

    fn event(&self, name: EventName) -> AnalyticsEvent {
        AnalyticsEvent::new(name)
            .with("session_id", self.session_id.to_string())
            .with("variant", self.variant.as_str())
    }
}
