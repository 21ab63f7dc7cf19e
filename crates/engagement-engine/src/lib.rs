//! Engagement engine: decides whether, when and which lead-capture popup a visitor sees.

pub mod analytics;
pub mod clock;
pub mod engine;
pub mod frequency;
pub mod presenter;
pub mod signals;
pub mod storage;
pub mod trigger;
pub mod types;
pub mod variant;

pub use analytics::{AnalyticsEvent, AnalyticsSink, EventName, FanoutSink, RecordingSink, TracingSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngagementEngine, EngineConfig, EnginePorts, SessionStatus};
pub use frequency::{FrequencyGate, DEFAULT_COOLDOWN_HOURS, MAX_COOLDOWN_HOURS};
pub use presenter::{
    compose_message, content_for, ChannelRequest, ContentBundle, MessagingChannel, PopupPresenter,
    PopupStatus, PopupView, TracingChannel,
};
pub use signals::{SignalTracker, SignalUpdate};
pub use storage::{FileStore, KeyValueStore, MemoryStore, UnavailableStore};
pub use trigger::{evaluate, rule_description, rule_satisfied, Decision, HoldReason, TriggerEvaluator, TriggerPhase};
pub use types::*;
pub use variant::{VariantAssigner, WeightTable, FALLBACK_VARIANT};
