use std::fmt;

use chrono::{DateTime, Local, Utc};

use crate::models::SensorReading;

pub const UNKNOWN: &str = "-";
pub const NO_LOCATION: &str = "—";

pub fn temperature(value: Option<f64>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |celsius| format!("{celsius:.1}"))
}

pub fn percentage(value: Option<f64>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |percent| percent.to_string())
}

pub fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(
        || UNKNOWN.to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// One line of text for a sensor in the dashboard list.
pub struct SensorCard<'a> {
    pub reading: &'a SensorReading,
    pub busy: bool,
}

impl fmt::Display for SensorCard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reading = self.reading;
        write!(
            f,
            "Sensor #{} [{}] {} °C | {} % | soil {} % | {} | {}",
            reading.id(),
            if reading.is_active() { "Active" } else { "Inactive" },
            temperature(*reading.temperature()),
            percentage(*reading.humidity()),
            percentage(*reading.soil_moisture()),
            reading.location().as_deref().unwrap_or(NO_LOCATION),
            timestamp(*reading.recorded_at()),
        )?;
        if self.busy {
            f.write_str(" (Updating status…)")?;
        }
        Ok(())
    }
}
