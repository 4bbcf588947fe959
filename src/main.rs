use std::{
    fmt::{Debug, Display},
    sync::Arc,
};

use sensor_dashboard::{
    config::Settings,
    dashboard::Dashboard,
    display::{self, SensorCard},
    repository::RefreshMode,
    telemetry, HttpSensorStore, SensorRepository,
};
use tokio::task::JoinError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    let subscriber = telemetry::create_subscriber(
        "sensor_dashboard".to_string(),
        settings.log_targets().as_deref(),
        std::io::stderr,
    );
    telemetry::init_subscriber(subscriber);

    tracing::info!(api_url = %settings.api_url(), "Starting sensor dashboard");

    let store = HttpSensorStore::from_settings(&settings)?;
    let dashboard = Arc::new(Dashboard::new(SensorRepository::new(store)));

    let render_task = tokio::spawn(render_until_closed(dashboard.clone()));
    let loader = dashboard.clone();
    tokio::spawn(async move {
        if let Err(e) = loader.refresh(RefreshMode::Initial).await {
            tracing::warn!(error = %e, "Initial refresh failed, refresh again to retry");
        }
    });

    tokio::select! {
        result = render_task => report_exit("renderer", result),
        result = tokio::signal::ctrl_c() => report_exit("closed by user", Ok(result)),
    };

    Ok(())
}

/// Print the filtered sensor list every time the dashboard changes.
async fn render_until_closed(dashboard: Arc<Dashboard<HttpSensorStore>>) -> anyhow::Result<()> {
    let mut changes = dashboard.subscribe();
    loop {
        render(&dashboard);
        if !changes.changed().await {
            return Ok(());
        }
    }
}

fn render(dashboard: &Dashboard<HttpSensorStore>) {
    let state = dashboard.repository().state();
    let updated = display::timestamp(*state.last_updated());
    match state.refresh_mode() {
        Some(RefreshMode::Initial) => println!("Loading sensors…"),
        Some(RefreshMode::Manual) => println!("Refreshing… (updated {updated})"),
        None => println!("Sensors (updated {updated})"),
    }
    if let Some(error) = state.error() {
        println!("Failed to load: {error}. Refresh to try again.");
    }
    if let Some(notice) = state.notice() {
        println!("Failed to change status of sensor {}: {}", notice.sensor_id(), notice.message());
    }
    drop(state);

    let projection = dashboard.projection();
    if projection.is_empty() {
        println!("No data. Try another filter or refresh.");
    }
    for reading in &projection {
        let busy = dashboard.is_busy(reading.id());
        println!("{}", SensorCard { reading, busy });
    }
}

fn report_exit(task_name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => tracing::info!("{} has exited", task_name),
        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{} failed",
                task_name
            )
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{} task failed to complete",
                task_name
            )
        }
    }
}
