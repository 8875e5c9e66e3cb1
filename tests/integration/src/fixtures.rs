//! Test fixtures
//!
//! Configuration and in-memory clients shared by the integration tests.

use relay_common::{
    AppConfig, AppSettings, AuthConfig, DispatcherSettings, Environment, RouterSettings,
    ServerConfig,
};
use relay_core::{ChannelTransport, Connection, MessageError, MessageRouter, OutboundFrame, RouteOutcome};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Secret used to sign test tokens
pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Configuration for a gateway bound to an ephemeral local port
pub fn test_config() -> AppConfig {
    AppConfig {
        app: AppSettings {
            name: "relay-integration".to_string(),
            env: Environment::Development,
        },
        gateway: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        dispatcher: DispatcherSettings::default(),
        router: RouterSettings::default(),
        auth: AuthConfig {
            jwt_secret: Some(TEST_JWT_SECRET.to_string()),
            token_expiry: 3600,
        },
    }
}

/// Client attached to a router through a channel transport
pub struct MemoryClient {
    pub connection: Arc<Connection>,
    transport_key: String,
    rx: mpsc::Receiver<OutboundFrame>,
}

impl MemoryClient {
    /// Open a connection on `router`
    pub fn connect(router: &MessageRouter, transport_key: &str) -> Self {
        let (transport, rx) = ChannelTransport::new(transport_key, 64);
        let connection = router.on_connect(Box::new(transport));
        Self {
            connection,
            transport_key: transport_key.to_string(),
            rx,
        }
    }

    /// Connection id assigned by the router
    pub fn id(&self) -> &str {
        self.connection.id()
    }

    /// Send a JSON frame as the client
    pub fn send(&self, router: &MessageRouter, frame: &Value) -> Result<RouteOutcome, MessageError> {
        router.on_message(&self.transport_key, &frame.to_string())
    }

    /// Close the transport from the client side
    pub fn disconnect(&self, router: &MessageRouter) -> Option<Arc<Connection>> {
        router.on_disconnect(&self.transport_key)
    }

    /// Every frame queued so far, decoded
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                if let Ok(value) = serde_json::from_str(&text) {
                    frames.push(value);
                }
            }
        }
        frames
    }

    /// Wait for the next text frame
    pub async fn next_frame(&mut self) -> Option<Value> {
        loop {
            match self.rx.recv().await? {
                OutboundFrame::Text(text) => return serde_json::from_str(&text).ok(),
                OutboundFrame::Close => return None,
            }
        }
    }
}
