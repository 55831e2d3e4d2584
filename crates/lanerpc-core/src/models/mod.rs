pub mod config;

pub use config::{HttpConfig, MetricsConfig, RpcConfig, WebsocketConfig};
