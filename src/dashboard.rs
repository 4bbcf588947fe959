use tokio::sync::watch;

use crate::{
    error::SyncError,
    filter::{StatusFilter, ViewState},
    models::{SensorId, SensorReading},
    repository::{RefreshMode, RefreshOutcome, RepositoryState, SensorRepository, ToggleOutcome},
    store::SensorStore,
};

/// What the presentation layer talks to: the repository plus the transient
/// search and filter inputs, with the filtered projection derived on demand.
pub struct Dashboard<S> {
    repository: SensorRepository<S>,
    view: watch::Sender<ViewState>,
}

impl<S: SensorStore> Dashboard<S> {
    pub fn new(repository: SensorRepository<S>) -> Self {
        let (view, _) = watch::channel(ViewState::default());
        Self { repository, view }
    }

    pub fn repository(&self) -> &SensorRepository<S> {
        &self.repository
    }

    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.repository.snapshot()
    }

    /// Sensors matching the current query and status filter, most recent first.
    pub fn projection(&self) -> Vec<SensorReading> {
        let view = self.view.borrow();
        let state = self.repository.state();
        view.apply(state.snapshot()).into_iter().cloned().collect()
    }

    pub fn is_busy(&self, id: &SensorId) -> bool {
        self.repository.is_busy(id)
    }

    pub fn is_refreshing(&self) -> bool {
        self.repository.state().is_refreshing()
    }

    pub fn refresh_mode(&self) -> Option<RefreshMode> {
        *self.repository.state().refresh_mode()
    }

    /// The last fetch failure, kept until a refresh succeeds.
    pub fn error(&self) -> Option<SyncError> {
        self.repository.state().error().clone()
    }

    pub fn dismiss_notice(&self) {
        self.repository.dismiss_notice();
    }

    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.view.send_if_modified(|view| {
            if *view.query() == query {
                return false;
            }
            view.set_query(query);
            true
        });
    }

    pub fn set_status_filter(&self, status: StatusFilter) {
        self.view.send_if_modified(|view| {
            if *view.status() == status {
                return false;
            }
            view.set_status(status);
            true
        });
    }

    pub async fn refresh(&self, mode: RefreshMode) -> Result<RefreshOutcome, SyncError> {
        self.repository.refresh(mode).await
    }

    pub async fn toggle_active(&self, id: &SensorId) -> Result<ToggleOutcome, SyncError> {
        self.repository.toggle_active(id).await
    }

    /// Change notifications for anything that affects what is rendered.
    pub fn subscribe(&self) -> DashboardChanges {
        DashboardChanges {
            state: self.repository.subscribe(),
            view: self.view.subscribe(),
        }
    }
}

/// Wakes up whenever the repository state or the view inputs change.
pub struct DashboardChanges {
    state: watch::Receiver<RepositoryState>,
    view: watch::Receiver<ViewState>,
}

impl DashboardChanges {
    /// Wait for the next change. Returns `false` once the dashboard is gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            result = self.state.changed() => result.is_ok(),
            result = self.view.changed() => result.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::store::MockSensorStore;

    async fn dashboard() -> Dashboard<MockSensorStore> {
        let mut store = MockSensorStore::new();
        store.expect_list().returning(|| {
            Ok(serde_json::from_value(json!([
                { "id": "1", "location": "North Field", "isActive": true, "timestamp": "2024-01-02" },
                { "id": "2", "location": "Greenhouse", "isActive": false, "timestamp": "2024-01-01" },
                { "id": "3", "timestamp": "2024-01-03" },
            ]))
            .unwrap())
        });
        store
            .expect_update_active()
            .returning(|id, is_active| {
                Ok(serde_json::from_value(json!({ "id": id.as_str(), "isActive": is_active })).unwrap())
            });
        let dashboard = Dashboard::new(SensorRepository::new(store));
        dashboard.refresh(RefreshMode::Initial).await.unwrap();
        dashboard
    }

    fn ids(readings: &[SensorReading]) -> Vec<&str> {
        readings.iter().map(|r| r.id().as_str()).collect()
    }

    #[tokio::test]
    async fn projection_follows_view_inputs() {
        let dashboard = dashboard().await;
        assert_eq!(ids(&dashboard.projection()), vec!["3", "1", "2"]);

        dashboard.set_status_filter(StatusFilter::Active);
        assert_eq!(ids(&dashboard.projection()), vec!["3", "1"]);

        dashboard.set_query("north");
        assert_eq!(ids(&dashboard.projection()), vec!["1"]);
        assert_eq!(dashboard.view(), ViewState::new("north", StatusFilter::Active));
    }

    #[tokio::test]
    async fn projection_recomputes_after_toggle() {
        let dashboard = dashboard().await;
        dashboard.set_status_filter(StatusFilter::Inactive);

        dashboard.toggle_active(&SensorId::from("1")).await.unwrap();

        assert_eq!(ids(&dashboard.projection()), vec!["1", "2"]);
        assert_eq!(dashboard.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn view_changes_notify_subscribers() {
        let dashboard = dashboard().await;
        let mut changes = dashboard.subscribe();

        dashboard.set_query("green");

        assert!(changes.changed().await);
    }

    #[tokio::test]
    async fn setting_the_same_input_is_not_a_change() {
        let dashboard = dashboard().await;
        let changes = dashboard.subscribe();

        dashboard.set_query("");
        dashboard.set_status_filter(StatusFilter::All);

        assert!(!changes.view.has_changed().unwrap());
        assert!(!dashboard.is_refreshing());
        assert_eq!(dashboard.refresh_mode(), None);
        assert_eq!(dashboard.error(), None);
    }
}
