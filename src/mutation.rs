//! In-flight toggle bookkeeping.
//!
//! A toggle moves through `apply -> pending -> confirmed | rolled back`. The
//! intent is created by [`MutationIntent::apply`], parked in the repository
//! while the UPDATE request is outstanding, and consumed by exactly one of
//! [`MutationIntent::confirm`] or [`MutationIntent::roll_back`]. Consuming it
//! by value is what keeps the busy flag and the rollback value together.

use derive_getters::Getters;

use crate::models::{RawSensor, SensorId, SensorReading};

/// Record of a toggle whose UPDATE request has not resolved yet.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct MutationIntent {
    id: SensorId,
    previous: bool,
    attempted: bool,
}

impl MutationIntent {
    /// Flip the entry's active flag and return the intent describing the flip.
    pub fn apply(reading: &mut SensorReading) -> Self {
        let previous = reading.is_active();
        let attempted = !previous;
        reading.set_active(attempted);

        Self {
            id: reading.id().clone(),
            previous,
            attempted,
        }
    }

    /// Put the attempted value back on an entry that was replaced by a
    /// refresh while this intent was pending.
    pub fn reapply(&self, reading: &mut SensorReading) {
        reading.set_active(self.attempted);
    }

    /// The server accepted the update; its representation wins.
    pub fn confirm(self, reading: Option<&mut SensorReading>, server: RawSensor) {
        if let Some(reading) = reading {
            reading.merge(server);
        }
    }

    /// The server rejected the update or could not be reached.
    pub fn roll_back(self, reading: Option<&mut SensorReading>) {
        if let Some(reading) = reading {
            reading.set_active(self.previous);
        }
    }
}
