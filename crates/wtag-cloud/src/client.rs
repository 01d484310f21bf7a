//! HTTP client for the wireless tag cloud JSON API
//!
//! Monitoring configs are loaded and saved through the
//! `ethClient.asmx/Load{Family}Config` and `Save{Family}Config` methods.
//! Every response arrives wrapped as `{"d": ...}`.

use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};
use url::Url;
use wtag_core::SensorKind;

/// Type marker the cloud adds to every returned object
const TYPE_MARKER: &str = "__type";

/// Cloud config family of a sensor kind, `None` if it has no config
pub fn config_family(kind: SensorKind) -> Option<&'static str> {
    match kind {
        SensorKind::Temp => Some("TempSensor"),
        SensorKind::SecondaryTemp | SensorKind::Humidity | SensorKind::Moisture => {
            Some("CapSensor")
        }
        SensorKind::Light => Some("LightSensor"),
        SensorKind::Motion | SensorKind::Event => Some("MotionSensor"),
        SensorKind::Water => Some("WaterSensor"),
        SensorKind::Battery => Some("LowBattery"),
        SensorKind::OutOfRange => Some("OutOfRange"),
        SensorKind::Signal => None,
    }
}

/// HTTP client for the cloud API
pub struct HttpClient {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: &CloudConfig) -> CloudResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.endpoint_url()?,
            bearer_token: config.bearer_token.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Load the monitoring config of one sensor of tag `slave_id`
    pub async fn load_config(
        &self,
        kind: SensorKind,
        slave_id: u8,
    ) -> CloudResult<Map<String, Value>> {
        let family = Self::family(kind)?;
        debug!("Loading {} config for tag {}", family, slave_id);

        let body = self
            .call(&format!("Load{}Config", family), json!({ "id": slave_id }))
            .await?;

        match body {
            Value::Object(mut config) => {
                config.remove(TYPE_MARKER);
                Ok(config)
            }
            other => Err(CloudError::UnexpectedPayload(format!(
                "expected {} config object, got {}",
                family, other
            ))),
        }
    }

    /// Save (a subset of) the monitoring config of one sensor of tag `slave_id`
    pub async fn save_config(
        &self,
        kind: SensorKind,
        slave_id: u8,
        config: Map<String, Value>,
    ) -> CloudResult<()> {
        let family = Self::family(kind)?;
        debug!(
            "Saving {} {} config fields for tag {}",
            config.len(),
            family,
            slave_id
        );

        self.call(
            &format!("Save{}Config", family),
            json!({ "id": slave_id, "config": config, "applyAll": false }),
        )
        .await?;
        Ok(())
    }

    fn family(kind: SensorKind) -> CloudResult<&'static str> {
        config_family(kind).ok_or_else(|| CloudError::UnsupportedSensor(kind.to_string()))
    }

    /// POST to an `ethClient.asmx` method and unwrap the `d` envelope
    async fn call(&self, method: &str, body: Value) -> CloudResult<Value> {
        let url = self.base_url.join(&format!("ethClient.asmx/{}", method))?;

        let mut request = self.client.post(url).json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        self.handle_response(method, response).await
    }

    /// Generic response handler
    async fn handle_response(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> CloudResult<Value> {
        let status = response.status();

        match status {
            StatusCode::OK => {
                let mut envelope = response.json::<Value>().await?;
                match envelope.get_mut("d") {
                    Some(d) => Ok(d.take()),
                    None => Err(CloudError::UnexpectedPayload(format!(
                        "{} response has no 'd' envelope",
                        method
                    ))),
                }
            }
            StatusCode::UNAUTHORIZED => {
                let message = Self::parse_error(response).await;
                error!("Authentication failed: {}", message);
                Err(CloudError::Auth(message))
            }
            StatusCode::FORBIDDEN => {
                let message = Self::parse_error(response).await;
                warn!("Session rejected calling {}: {}", method, message);
                Err(CloudError::SessionInvalid(message))
            }
            _ if status.is_server_error() => {
                let message = Self::parse_error(response).await;
                error!("Server error {} calling {}: {}", status, method, message);
                Err(CloudError::server(status.as_u16(), message))
            }
            _ => {
                let message = Self::parse_error(response).await;
                Err(CloudError::server(status.as_u16(), message))
            }
        }
    }

    /// Error message from an ASP.NET fault body, or the raw body text
    async fn parse_error(response: reqwest::Response) -> String {
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("Message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                if text.is_empty() {
                    "Unknown error".to_string()
                } else {
                    text
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_family() {
        assert_eq!(config_family(SensorKind::Temp), Some("TempSensor"));
        assert_eq!(config_family(SensorKind::Humidity), Some("CapSensor"));
        assert_eq!(config_family(SensorKind::Event), Some("MotionSensor"));
        assert_eq!(config_family(SensorKind::Signal), None);
        for kind in SensorKind::ALL {
            if kind != SensorKind::Signal {
                assert!(config_family(kind).is_some(), "{}", kind);
            }
        }
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = CloudConfig {
            api_endpoint: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(HttpClient::new(&config).is_err());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let config = CloudConfig {
            api_endpoint: "https://example.com/api".to_string(),
            ..Default::default()
        };
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(
            client
                .base_url()
                .join("ethClient.asmx/LoadTempSensorConfig")
                .unwrap()
                .as_str(),
            "https://example.com/api/ethClient.asmx/LoadTempSensorConfig"
        );
    }

    #[tokio::test]
    async fn test_signal_has_no_config() {
        let client = HttpClient::new(&CloudConfig::default()).unwrap();
        let err = client.load_config(SensorKind::Signal, 1).await.unwrap_err();
        assert!(matches!(err, CloudError::UnsupportedSensor(_)));
    }
}
