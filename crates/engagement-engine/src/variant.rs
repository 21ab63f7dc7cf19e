//! Weighted, session-sticky A/B variant assignment.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::{AnalyticsEvent, AnalyticsSink, EventName};
use crate::storage::{KeyValueStore, ASSIGNED_VARIANT_KEY};
use crate::types::{EngineError, EngineResult, Variant};

/// Variant used whenever the weight table cannot be trusted.
pub const FALLBACK_VARIANT: Variant = Variant::Guide;

/// Allowed drift of the weight sum away from 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Assignment probability per variant, walked in canonical variant order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightTable(BTreeMap<Variant, f64>);

impl Default for WeightTable {
    fn default() -> Self {
        Self::from_pairs(&[
            (Variant::Guide, 0.40),
            (Variant::Consultation, 0.30),
            (Variant::Recommendation, 0.20),
            (Variant::Control, 0.10),
        ])
    }
}

impl WeightTable {
    pub fn from_pairs(pairs: &[(Variant, f64)]) -> Self {
        Self(pairs.iter().copied().collect())
    }

    pub fn weight(&self, variant: Variant) -> f64 {
        self.0.get(&variant).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Variant, f64)> + '_ {
        self.0.iter().map(|(v, w)| (*v, *w))
    }

    /// Check that the table is non-empty, every weight is a finite
    /// non-negative number, and the weights sum to 1.0.
    pub fn validate(&self) -> EngineResult<()> {
        if self.0.is_empty() {
            return Err(EngineError::Config("weight table is empty".to_string()));
        }
        for (variant, weight) in &self.0 {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(EngineError::Config(format!(
                    "weight for {variant} must be a non-negative number, got {weight}"
                )));
            }
        }
        let sum: f64 = self.0.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::Config(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }

    /// Map a uniform draw `r` in [0, 1) to a variant.
    ///
    /// The first variant whose cumulative weight reaches `r` wins. Variants
    /// with zero weight are never picked. If accumulation misses every
    /// threshold the first weighted variant is used, and an invalid table
    /// always yields [`FALLBACK_VARIANT`].
    pub fn select(&self, r: f64) -> Variant {
        if self.validate().is_err() {
            return FALLBACK_VARIANT;
        }

        let mut weighted = self.iter().filter(|(_, weight)| *weight > 0.0).peekable();
        let first = weighted.peek().map(|(v, _)| *v).unwrap_or(FALLBACK_VARIANT);

        let mut cumulative = 0.0;
        for (variant, weight) in weighted {
            cumulative += weight;
            if cumulative >= r {
                return variant;
            }
        }

        first
    }
}

/// Picks one variant per session and keeps it for the session's lifetime.
pub struct VariantAssigner<R: Rng> {
    table: WeightTable,
    rng: R,
    assigned: Option<Variant>,
}

impl<R: Rng> VariantAssigner<R> {
    pub fn new(table: WeightTable, rng: R) -> Self {
        Self {
            table,
            rng,
            assigned: None,
        }
    }

    pub fn table(&self) -> &WeightTable {
        &self.table
    }

    /// Return the session's variant, drawing and persisting one on first use.
    ///
    /// `variant_assigned` is emitted only when a fresh draw happens. When the
    /// store is unusable the draw is kept in memory for this assigner only.
    pub fn assign(
        &mut self,
        store: &mut dyn KeyValueStore,
        sink: &dyn AnalyticsSink,
        session_id: Uuid,
    ) -> Variant {
        if let Some(variant) = self.assigned {
            return variant;
        }

        match store.get(ASSIGNED_VARIANT_KEY) {
            Ok(Some(raw)) => match raw.parse::<Variant>() {
                Ok(variant) => {
                    tracing::debug!("Restored assigned variant '{variant}'");
                    self.assigned = Some(variant);
                    return variant;
                }
                Err(e) => tracing::warn!("Discarding stored variant: {e}"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Variant storage unavailable, assignment will not stick: {e}"),
        }

        let r: f64 = self.rng.gen();
        let variant = self.table.select(r);

        if let Err(e) = store.set(ASSIGNED_VARIANT_KEY, variant.as_str()) {
            tracing::warn!("Failed to persist assigned variant: {e}");
        }
        self.assigned = Some(variant);

        tracing::info!("Assigned variant '{variant}' (r = {r:.4})");
        sink.emit(
            &AnalyticsEvent::new(EventName::VariantAssigned)
                .with("session_id", session_id.to_string())
                .with("variant", variant.as_str()),
        );

        variant
    }
}
