//! # HTTP Gateway
//!
//! Exposes the research controller over HTTP: submit a query, stream its
//! progress as server-sent events, fetch or cancel the task. Every submitted
//! query runs in its own controller with its own stores.

mod auth;
mod events;
mod registry;
mod server;

pub use auth::GatewayAuth;
pub use events::{ErrorResponse, HealthResponse, QueryRequest, QueryResponse};
pub use registry::{SubscriberGuard, TaskChannel, TaskEntry, TaskRegistry};
pub use server::{
    GatewayServer, SharedGateway, router as gateway_router, run as run_gateway, shared_gateway,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Accepted bearer tokens. Empty means no authentication.
    pub auth_tokens: Vec<String>,
    /// Maximum queries running at once (0 = unlimited).
    pub max_running_tasks: usize,
    /// Cancel a run when its last stream subscriber disconnects.
    pub cancel_on_disconnect: bool,
    /// Write finished task records to disk.
    pub persist_tasks: bool,
    /// Where task records go; defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
    /// Finished tasks kept in memory; older ones are served from disk.
    pub retain_finished_tasks: usize,
    /// Live events buffered per task for slow subscribers.
    pub event_buffer: usize,
    /// Interval between SSE keep-alive messages.
    pub keep_alive_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            auth_tokens: Vec::new(),
            max_running_tasks: 16,
            cancel_on_disconnect: true,
            persist_tasks: true,
            data_dir: None,
            retain_finished_tasks: 64,
            event_buffer: 256,
            keep_alive_secs: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert!(config.auth_tokens.is_empty());
        assert!(config.cancel_on_disconnect);
        assert_eq!(config.keep_alive_secs, 15);
        assert_eq!(config.retain_finished_tasks, 64);
    }

    #[test]
    fn test_gateway_config_partial_toml() {
        let config: GatewayConfig = toml::from_str("port = 9090\npersist_tasks = false\n").unwrap();
        assert_eq!(config.port, 9090);
        assert!(!config.persist_tasks);
        assert_eq!(config.event_buffer, 256);
    }
}
