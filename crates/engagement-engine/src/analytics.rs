//! Fire-and-forget analytics events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four events the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    VariantAssigned,
    PopupTriggered,
    PopupClosed,
    PopupConversion,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::VariantAssigned => "variant_assigned",
            EventName::PopupTriggered => "popup_triggered",
            EventName::PopupClosed => "popup_closed",
            EventName::PopupConversion => "popup_conversion",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named event with a flat parameter map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub name: EventName,
    pub params: BTreeMap<String, Value>,
}

impl AnalyticsEvent {
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Delivery collaborator. Emission never blocks and is never retried.
pub trait AnalyticsSink: Send + Sync {
    fn emit(&self, event: &AnalyticsEvent);
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn emit(&self, event: &AnalyticsEvent) {
        let params = serde_json::to_string(&event.params).unwrap_or_default();
        tracing::info!(event = %event.name, %params, "analytics");
    }
}

/// Buffers events in memory; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of events emitted with the given name.
    pub fn count(&self, name: EventName) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| ev.name == name).count())
            .unwrap_or(0)
    }

    /// Remove and return the buffered events.
    pub fn drain(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl AnalyticsSink for RecordingSink {
    fn emit(&self, event: &AnalyticsEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards each event to every inner sink.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn AnalyticsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AnalyticsSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl AnalyticsSink for FanoutSink {
    fn emit(&self, event: &AnalyticsEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_wire_name() {
        let event = AnalyticsEvent::new(EventName::PopupTriggered).with("variant", "guide");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "popup_triggered");
        assert_eq!(json["params"]["variant"], "guide");
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        let fanout = FanoutSink::new().with_sink(a.clone()).with_sink(b.clone());
        fanout.emit(&AnalyticsEvent::new(EventName::PopupClosed));
        assert_eq!(a.count(EventName::PopupClosed), 1);
        assert_eq!(b.count(EventName::PopupClosed), 1);
    }

    #[test]
    fn test_recording_sink_drain_empties_buffer() {
        let sink = RecordingSink::new();
        sink.emit(&AnalyticsEvent::new(EventName::VariantAssigned));
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.events().is_empty());
    }
}
