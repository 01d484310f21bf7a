//! [`ConfigTransport`] over the cloud HTTP API

use crate::client::{config_family, HttpClient};
use crate::config::CloudConfig;
use crate::error::CloudResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use wtag_core::{ConfigTransport, SensorRef, TagResult};

/// Loads and saves sensor monitoring configs through [`HttpClient`]
pub struct CloudTransport {
    client: Arc<HttpClient>,
}

impl CloudTransport {
    pub fn new(config: &CloudConfig) -> CloudResult<Self> {
        Ok(Self::with_client(Arc::new(HttpClient::new(config)?)))
    }

    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<HttpClient> {
        &self.client
    }
}

#[async_trait]
impl ConfigTransport for CloudTransport {
    async fn fetch_config(&self, sensor: &SensorRef) -> TagResult<Map<String, Value>> {
        if config_family(sensor.kind).is_none() {
            debug!("{} has no cloud config", sensor);
            return Ok(Map::new());
        }
        Ok(self.client.load_config(sensor.kind, sensor.slave_id).await?)
    }

    async fn persist_config(
        &self,
        sensor: &SensorRef,
        fields: Map<String, Value>,
    ) -> TagResult<()> {
        if fields.is_empty() {
            debug!("Nothing to save for {}", sensor);
            return Ok(());
        }
        Ok(self
            .client
            .save_config(sensor.kind, sensor.slave_id, fields)
            .await?)
    }
}
