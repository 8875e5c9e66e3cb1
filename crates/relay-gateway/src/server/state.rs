//! Gateway state
//!
//! Application state shared by every socket task.

use relay_common::AppConfig;
use relay_core::MessageRouter;
use std::sync::Arc;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    /// Router shared by all connections
    router: Arc<MessageRouter>,
    /// Application configuration
    config: Arc<AppConfig>,
}

impl GatewayState {
    /// Create a new gateway state
    pub fn new(router: MessageRouter, config: AppConfig) -> Self {
        Self {
            router: Arc::new(router),
            config: Arc::new(config),
        }
    }

    /// Get the message router
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Get the application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("router", &self.router)
            .field("config", &"AppConfig")
            .finish()
    }
}
