use chrono::{DateTime, Utc};

/// A single value for a sensor event, as believed at `belief_time`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TimedBelief {
    pub event_start: DateTime<Utc>,
    pub belief_time: DateTime<Utc>,
    pub event_value: f64,
}

/// Result of writing a batch of beliefs.
///
/// `unchanged` counts beliefs whose stored value was already identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SaveOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl SaveOutcome {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }

    pub fn nothing_new(&self) -> bool {
        self.inserted == 0 && self.updated == 0
    }

    pub fn merge(&mut self, other: SaveOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}
