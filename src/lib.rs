//! Data core of the IoT sensor dashboard.
//!
//! [`repository::SensorRepository`] fetches and normalizes the sensor
//! collection and toggles sensors with optimistic update and rollback.
//! [`filter`] derives the searchable, filterable projection and
//! [`dashboard::Dashboard`] ties both together for a presentation layer.

pub mod config;
pub mod dashboard;
pub mod display;
pub mod error;
pub mod filter;
pub mod models;
pub mod mutation;
pub mod repository;
pub mod store;
pub mod telemetry;

pub use dashboard::Dashboard;
pub use error::{StoreError, SyncError};
pub use filter::StatusFilter;
pub use models::{SensorId, SensorReading};
pub use repository::{RefreshMode, SensorRepository};
pub use store::{HttpSensorStore, SensorStore};
