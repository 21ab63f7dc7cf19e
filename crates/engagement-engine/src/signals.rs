//! Engagement signal tracking from raw page events.

use serde::{Deserialize, Serialize};

use crate::types::SessionMetrics;

/// A raw page event translated into a typed update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalUpdate {
    /// One second of time on site elapsed.
    Tick,
    /// The document was scrolled.
    Scroll {
        scroll_top: f64,
        viewport_height: f64,
        document_height: f64,
    },
    /// A client-side route change (back/forward or programmatic).
    Navigation,
    /// The pointer left the document at vertical position `y`.
    PointerLeave { y: f64 },
}

/// Maintains the always-current engagement metrics for one session.
#[derive(Debug, Clone, Default)]
pub struct SignalTracker {
    metrics: SessionMetrics,
}

impl SignalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current metric snapshot.
    pub fn metrics(&self) -> SessionMetrics {
        self.metrics
    }

    /// Fold one update into the metrics. Returns true if any metric changed.
    pub fn apply(&mut self, update: SignalUpdate) -> bool {
        match update {
            SignalUpdate::Tick => {
                self.metrics.time_on_site_seconds = self.metrics.time_on_site_seconds.saturating_add(1);
                true
            }
            SignalUpdate::Scroll {
                scroll_top,
                viewport_height,
                document_height,
            } => match scroll_depth_percent(scroll_top, viewport_height, document_height) {
                Some(depth) if depth > self.metrics.max_scroll_depth_percent => {
                    self.metrics.max_scroll_depth_percent = depth;
                    true
                }
                _ => false,
            },
            SignalUpdate::Navigation => {
                self.metrics.page_view_count = self.metrics.page_view_count.saturating_add(1);
                true
            }
            SignalUpdate::PointerLeave { y } => {
                if self.metrics.exit_intent_fired || y.is_nan() || y > 0.0 {
                    return false;
                }
                self.metrics.exit_intent_fired = true;
                true
            }
        }
    }
}

/// Scroll depth as a percentage of the document, clamped to [0, 100].
///
/// Returns `None` when the inputs cannot describe a real document, so the
/// metric simply does not move.
pub fn scroll_depth_percent(scroll_top: f64, viewport_height: f64, document_height: f64) -> Option<f64> {
    if !scroll_top.is_finite() || !viewport_height.is_finite() || !document_height.is_finite() {
        return None;
    }
    if document_height <= 0.0 {
        return None;
    }
    let depth = (scroll_top + viewport_height) / document_height * 100.0;
    Some(depth.clamp(0.0, 100.0))
}
