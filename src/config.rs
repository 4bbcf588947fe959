use std::time::Duration;

use derive_getters::Getters;

pub const API_URL: &str = "https://68fc3d5096f6ff19b9f49212.mockapi.io/api/v1/sensor";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const API_URL_VAR: &str = "SENSOR_DASHBOARD_API_URL";
pub const TIMEOUT_SECS_VAR: &str = "SENSOR_DASHBOARD_TIMEOUT_SECS";
pub const LOG_VAR: &str = "SENSOR_DASHBOARD_LOG";

/// Runtime settings, read from the environment with compiled-in defaults.
#[derive(Debug, Clone, Getters)]
pub struct Settings {
    api_url: String,
    request_timeout: Duration,
    log_targets: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: API_URL.to_string(),
            request_timeout: REQUEST_TIMEOUT,
            log_targets: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_url = non_empty_var(API_URL_VAR).unwrap_or(defaults.api_url);
        let request_timeout = non_empty_var(TIMEOUT_SECS_VAR)
            .and_then(|secs| secs.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let log_targets = non_empty_var(LOG_VAR);

        Self {
            api_url,
            request_timeout,
            log_targets,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
