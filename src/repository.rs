use std::collections::HashMap;

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use tokio::sync::watch;

use crate::{
    error::SyncError,
    models::{RawSensor, SensorId, SensorReading},
    mutation::MutationIntent,
    store::SensorStore,
};

/// Why a refresh was requested. Only affects how the presentation shows
/// progress, never how the fetch behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RefreshMode {
    Initial,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { sensors: usize },
    /// A refresh started later had already been applied; this response was dropped.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum IgnoreReason {
    /// A toggle for the same sensor is still in flight.
    Busy,
    UnknownSensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Confirmed { is_active: bool },
    Ignored(IgnoreReason),
}

/// Transient, user facing notice about a toggle that was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct Notice {
    sensor_id: SensorId,
    message: String,
}

/// Everything the repository owns, published as one value so observers
/// never see a half applied change.
#[derive(Debug, Default, Getters)]
pub struct RepositoryState {
    snapshot: Vec<SensorReading>,
    #[getter(skip)]
    pending: HashMap<SensorId, MutationIntent>,
    #[getter(skip)]
    refreshes_in_flight: usize,
    /// Mode of the most recently started refresh while any is in flight.
    refresh_mode: Option<RefreshMode>,
    /// Last fetch failure; cleared by the next successful refresh.
    error: Option<SyncError>,
    notice: Option<Notice>,
    last_updated: Option<DateTime<Utc>>,
    /// Bumped on every change.
    version: u64,
    #[getter(skip)]
    started_generation: u64,
    #[getter(skip)]
    applied_generation: u64,
}

impl RepositoryState {
    pub fn get(&self, id: &SensorId) -> Option<&SensorReading> {
        self.snapshot.iter().find(|reading| reading.id() == id)
    }

    /// True while a toggle for `id` is waiting on the store.
    pub fn is_busy(&self, id: &SensorId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending(&self, id: &SensorId) -> Option<&MutationIntent> {
        self.pending.get(id)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshes_in_flight > 0
    }

    fn entry_mut(&mut self, id: &SensorId) -> Option<&mut SensorReading> {
        self.snapshot.iter_mut().find(|reading| reading.id() == id)
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    fn begin_refresh(&mut self, mode: RefreshMode) -> u64 {
        self.started_generation += 1;
        self.refreshes_in_flight += 1;
        self.refresh_mode = Some(mode);
        self.touch();
        self.started_generation
    }

    fn finish_refresh(
        &mut self,
        generation: u64,
        fetched: Result<Vec<SensorReading>, SyncError>,
    ) -> Result<RefreshOutcome, SyncError> {
        self.refreshes_in_flight = self.refreshes_in_flight.saturating_sub(1);
        if self.refreshes_in_flight == 0 {
            self.refresh_mode = None;
        }
        self.touch();

        let superseded = generation <= self.applied_generation;
        match fetched {
            Ok(_) if superseded => Ok(RefreshOutcome::Superseded),
            Ok(mut snapshot) => {
                for reading in snapshot.iter_mut() {
                    if let Some(intent) = self.pending.get(reading.id()) {
                        intent.reapply(reading);
                    }
                }
                let sensors = snapshot.len();
                self.snapshot = snapshot;
                self.error = None;
                self.last_updated = Some(Utc::now());
                self.applied_generation = generation;
                Ok(RefreshOutcome::Applied { sensors })
            }
            Err(error) => {
                if !superseded {
                    self.error = Some(error.clone());
                }
                Err(error)
            }
        }
    }

    fn begin_toggle(&mut self, id: &SensorId) -> Result<MutationIntent, IgnoreReason> {
        if self.pending.contains_key(id) {
            return Err(IgnoreReason::Busy);
        }
        let reading = self.entry_mut(id).ok_or(IgnoreReason::UnknownSensor)?;
        let intent = MutationIntent::apply(reading);
        self.pending.insert(id.clone(), intent.clone());
        self.touch();
        Ok(intent)
    }

    fn settle_toggle(
        &mut self,
        intent: MutationIntent,
        response: Result<RawSensor, SyncError>,
    ) -> Result<ToggleOutcome, SyncError> {
        let id = intent.id().clone();
        self.pending.remove(&id);
        self.touch();

        match response {
            Ok(server) => {
                let attempted = *intent.attempted();
                intent.confirm(self.entry_mut(&id), server);
                let is_active = self
                    .get(&id)
                    .map(SensorReading::is_active)
                    .unwrap_or(attempted);
                Ok(ToggleOutcome::Confirmed { is_active })
            }
            Err(error) => {
                intent.roll_back(self.entry_mut(&id));
                self.notice = Some(Notice {
                    sensor_id: id,
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

/// Single source of truth for the sensor snapshot.
///
/// All reads and writes against the remote store go through here. State
/// changes are published on a [`watch`] channel; each change is applied
/// synchronously, so the only suspension points are the store calls.
pub struct SensorRepository<S> {
    store: S,
    state: watch::Sender<RepositoryState>,
}

impl<S: SensorStore> SensorRepository<S> {
    pub fn new(store: S) -> Self {
        let (state, _) = watch::channel(RepositoryState::default());
        Self { store, state }
    }

    /// Receive a notification after every state change.
    pub fn subscribe(&self) -> watch::Receiver<RepositoryState> {
        self.state.subscribe()
    }

    /// Borrow the current state. Don't hold the guard across an `.await`.
    pub fn state(&self) -> watch::Ref<'_, RepositoryState> {
        self.state.borrow()
    }

    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.state.borrow().snapshot.clone()
    }

    pub fn is_busy(&self, id: &SensorId) -> bool {
        self.state.borrow().is_busy(id)
    }

    pub fn dismiss_notice(&self) {
        self.state.send_if_modified(|state| {
            let had_notice = state.notice.take().is_some();
            if had_notice {
                state.touch();
            }
            had_notice
        });
    }

    /// Fetch the whole collection and replace the snapshot.
    ///
    /// On failure the snapshot is left untouched and the error is kept in the
    /// state until a later refresh succeeds. There is no retry here.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self, mode: RefreshMode) -> Result<RefreshOutcome, SyncError> {
        let mut generation = 0;
        self.state
            .send_modify(|state| generation = state.begin_refresh(mode));
        tracing::debug!(generation, "Fetching sensors");

        let fetched = self
            .store
            .list()
            .await
            .map(|payload| payload.into_snapshot())
            .map_err(SyncError::from_list);

        let mut outcome = Ok(RefreshOutcome::Superseded);
        self.state
            .send_modify(|state| outcome = state.finish_refresh(generation, fetched));

        match &outcome {
            Ok(RefreshOutcome::Applied { sensors }) => {
                tracing::info!(generation, sensors, "Sensor snapshot refreshed")
            }
            Ok(RefreshOutcome::Superseded) => {
                tracing::debug!(generation, "Dropping response of a superseded refresh")
            }
            Err(e) => tracing::warn!(generation, error = %e, "Failed to refresh sensors"),
        }
        outcome
    }

    /// Flip a sensor's active flag optimistically and confirm it with the store.
    ///
    /// The flipped value is visible to observers before the UPDATE request is
    /// sent. On success the server's record is merged in; on failure the flag
    /// is restored and a [`Notice`] is published. A toggle for a sensor that is
    /// already in flight, or that isn't in the snapshot, is ignored.
    #[tracing::instrument(skip(self, id), fields(sensor_id = %id))]
    pub async fn toggle_active(&self, id: &SensorId) -> Result<ToggleOutcome, SyncError> {
        let mut begun = Err(IgnoreReason::UnknownSensor);
        self.state.send_if_modified(|state| {
            begun = state.begin_toggle(id);
            begun.is_ok()
        });

        let intent = match begun {
            Ok(intent) => intent,
            Err(reason) => {
                tracing::debug!(%reason, "Ignoring toggle");
                return Ok(ToggleOutcome::Ignored(reason));
            }
        };
        tracing::debug!(attempted = *intent.attempted(), "Applied toggle optimistically");

        let response = self
            .store
            .update_active(id, *intent.attempted())
            .await
            .map_err(|e| SyncError::from_update(id, e));

        let mut outcome = Ok(ToggleOutcome::Ignored(IgnoreReason::Busy));
        self.state
            .send_modify(|state| outcome = state.settle_toggle(intent, response));

        match &outcome {
            Ok(ToggleOutcome::Confirmed { is_active }) => {
                tracing::info!(is_active, "Sensor state confirmed")
            }
            Ok(ToggleOutcome::Ignored(_)) => {}
            Err(e) => tracing::warn!(error = %e, "Sensor state update failed, rolled back"),
        }
        outcome
    }
}
