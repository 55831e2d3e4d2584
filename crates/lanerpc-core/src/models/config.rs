//! Server configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Default outbound queue bound per WebSocket connection.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    pub port: u16,
    pub healthcheck_endpoint: String,
    pub http: HttpConfig,
    pub websocket: WebsocketConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Largest accepted request body. `None` accepts any size.
    pub max_body_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebsocketConfig {
    pub enabled: bool,
    pub send_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Scrape address for the Prometheus exporter, when it is compiled in.
    pub listen: Option<SocketAddr>,
}

impl RpcConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.healthcheck_endpoint.starts_with('/') {
            return Err(Error::Validation(format!(
                "Healthcheck endpoint '{}' must start with '/'",
                self.healthcheck_endpoint
            )));
        }

        if self.healthcheck_endpoint == "/" {
            return Err(Error::Validation(
                "Healthcheck endpoint cannot be the JSON-RPC path '/'".to_string(),
            ));
        }

        self.http.validate()?;
        self.websocket.validate()?;
        Ok(())
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            healthcheck_endpoint: "/health".to_string(),
            http: HttpConfig::default(),
            websocket: WebsocketConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl HttpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_body_bytes == Some(0) {
            return Err(Error::Validation(
                "HTTP max body size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_bytes: None,
        }
    }
}

impl WebsocketConfig {
    pub fn validate(&self) -> Result<()> {
        if self.send_queue_capacity == 0 {
            return Err(Error::Validation(
                "Websocket send queue capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
        }
    }
}
