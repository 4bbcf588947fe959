use derive_getters::Getters;

use crate::models::SensorReading;

/// Which sensors to show by their active flag.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::AsRefStr,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

impl StatusFilter {
    pub fn matches(self, reading: &SensorReading) -> bool {
        match self {
            Self::All => true,
            Self::Active => reading.is_active(),
            Self::Inactive => !reading.is_active(),
        }
    }
}

/// Transient search and filter inputs owned by the presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
pub struct ViewState {
    query: String,
    status: StatusFilter,
}

impl ViewState {
    pub fn new(query: impl Into<String>, status: StatusFilter) -> Self {
        Self {
            query: query.into(),
            status,
        }
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn set_status(&mut self, status: StatusFilter) {
        self.status = status;
    }

    pub fn apply<'a>(&self, snapshot: &'a [SensorReading]) -> Vec<&'a SensorReading> {
        compute(snapshot, &self.query, self.status)
    }
}

/// Derive the visible sensors. Both the status and the text predicate must
/// hold; the snapshot's order is kept as is.
///
/// The query is trimmed and lowercased, then matched as a substring of the
/// lowercased location or id. An empty query matches everything.
pub fn compute<'a>(
    snapshot: &'a [SensorReading],
    query: &str,
    status: StatusFilter,
) -> Vec<&'a SensorReading> {
    let query = query.trim().to_lowercase();
    snapshot
        .iter()
        .filter(|reading| status.matches(reading))
        .filter(|reading| query.is_empty() || matches_query(reading, &query))
        .collect()
}

fn matches_query(reading: &SensorReading, query: &str) -> bool {
    let location = reading.location().as_deref().unwrap_or_default();
    location.to_lowercase().contains(query) || reading.id().as_str().to_lowercase().contains(query)
}
