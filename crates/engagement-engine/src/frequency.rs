//! Cross-session frequency cap.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::storage::{KeyValueStore, LAST_SHOWN_AT_KEY};

/// Default cool-down between two popup impressions.
pub const DEFAULT_COOLDOWN_HOURS: i64 = 24;

/// Longest accepted cool-down, ten years.
pub const MAX_COOLDOWN_HOURS: i64 = 24 * 365 * 10;

/// True when `now` is at least `cooldown` past `last_shown_at`, or nothing
/// was ever shown.
pub fn cooldown_elapsed(
    last_shown_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> bool {
    match last_shown_at {
        None => true,
        Some(at) => now.signed_duration_since(at) >= cooldown,
    }
}

/// Answers whether the visitor may see a popup at all right now.
///
/// Storage failures fail open: an unreadable record counts as "never shown".
pub struct FrequencyGate {
    store: Box<dyn KeyValueStore>,
    cooldown: Duration,
}

impl FrequencyGate {
    pub fn new(store: Box<dyn KeyValueStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    pub fn with_default_cooldown(store: Box<dyn KeyValueStore>) -> Self {
        Self::new(store, Duration::hours(DEFAULT_COOLDOWN_HOURS))
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// The persisted impression time, if any can be read.
    pub fn last_shown_at(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.get(LAST_SHOWN_AT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Frequency record unreadable, failing open: {e}");
                return None;
            }
        };

        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!("Ignoring malformed {LAST_SHOWN_AT_KEY} '{raw}': {e}");
                None
            }
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        cooldown_elapsed(self.last_shown_at(), now, self.cooldown)
    }

    /// When the visitor becomes eligible again, `None` if already eligible.
    ///
    /// A cool-down reaching past the representable range saturates at
    /// [`DateTime::<Utc>::MAX_UTC`].
    pub fn eligible_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let at = self.last_shown_at()?;
        let next = at
            .checked_add_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (next > now).then_some(next)
    }

    /// Stamp `now` as the latest impression.
    pub fn record_shown(&mut self, now: DateTime<Utc>) {
        let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        match self.store.set(LAST_SHOWN_AT_KEY, &stamp) {
            Ok(()) => tracing::debug!("Recorded popup impression at {stamp}"),
            Err(e) => tracing::warn!("Failed to record popup impression: {e}"),
        }
    }

    /// Forget the impression record.
    pub fn clear(&mut self) {
        if let Err(e) = self.store.remove(LAST_SHOWN_AT_KEY) {
            tracing::warn!("Failed to clear frequency record: {e}");
        }
    }
}
