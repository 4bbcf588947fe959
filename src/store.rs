use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Response, Url};

use crate::{
    config::Settings,
    error::StoreError,
    models::{RawSensor, SensorId, SensorPayload},
};

pub const USER_AGENT: &str = concat!("sensor-dashboard/", env!("CARGO_PKG_VERSION"));

/// The remote collection of sensors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// LIST the whole collection.
    async fn list(&self) -> Result<SensorPayload, StoreError>;

    /// Partial UPDATE of a single sensor's active flag. Returns the server's
    /// representation of the record.
    async fn update_active(&self, id: &SensorId, is_active: bool)
        -> Result<RawSensor, StoreError>;
}

/// [`SensorStore`] backed by a REST collection resource.
#[derive(Debug, Clone)]
pub struct HttpSensorStore {
    client: Client,
    collection: Url,
}

impl HttpSensorStore {
    pub fn new(collection_url: &str, timeout: Duration) -> Result<Self> {
        let collection = Url::parse(collection_url)
            .with_context(|| format!("Invalid sensor collection URL: {collection_url}"))?;
        if collection.cannot_be_a_base() {
            bail!("Sensor collection URL can't hold item paths: {collection_url}");
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, collection })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.api_url(), *settings.request_timeout())
    }

    fn item_url(&self, id: &SensorId) -> Result<Url, StoreError> {
        let mut url = self.collection.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Network(format!("can't build URL for sensor {id}")))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }
}

/// Reject non-2xx responses and read the body of the others.
async fn read_body(response: Response) -> Result<bytes::Bytes, StoreError> {
    let status = response.status();
    if !status.is_success() {
        return Err(StoreError::Status(status.as_u16()));
    }
    Ok(response.bytes().await?)
}

#[async_trait]
impl SensorStore for HttpSensorStore {
    #[tracing::instrument(skip(self), fields(url = %self.collection))]
    async fn list(&self) -> Result<SensorPayload, StoreError> {
        let response = self.client.get(self.collection.clone()).send().await?;
        let body = read_body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    #[tracing::instrument(skip(self))]
    async fn update_active(
        &self,
        id: &SensorId,
        is_active: bool,
    ) -> Result<RawSensor, StoreError> {
        let response = self
            .client
            .put(self.item_url(id)?)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&serde_json::json!({ "isActive": is_active }))
            .send()
            .await?;
        let body = read_body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
