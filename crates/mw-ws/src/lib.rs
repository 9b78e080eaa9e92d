//! Realtime feed client for the marketplace price watcher.
//!
//! Provides a single long-lived WebSocket connection with:
//! - Optional API-key authentication handshake
//! - Automatic reconnection with exponential backoff (capped at 60s)
//! - Subscription registry replayed on every reconnect
//! - Heartbeat monitoring (45s ping, pong timeout detection)
//! - Per-event-type handler dispatch with panic isolation

pub mod connection;
pub mod credentials;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod message;
pub mod subscription;
pub mod transport;

pub use connection::{backoff_delay, ConnectionState, FeedClient, FeedConfig};
pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials};
pub use error::{WsError, WsResult};
pub use handler::{DispatchOutcome, FeedHandler, HandlerRegistry};
pub use heartbeat::HeartbeatMonitor;
pub use message::{
    AuthAck, FeedEvent, FeedMessage, OutboundFrame, SubscriptionAck, SubscriptionParams,
};
pub use subscription::SubscriptionRegistry;
pub use transport::{
    Connector, FrameSink, FrameStream, MockConnector, MockSession, Session, TungsteniteConnector,
    WsInbound, WsOutbound,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket or HTTPS connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
