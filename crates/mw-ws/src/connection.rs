//! Feed connection client.
//!
//! Handles the connection lifecycle, the authentication handshake,
//! subscription replay, reconnection with exponential backoff, and dispatch
//! of inbound frames to registered handlers.

use crate::credentials::CredentialProvider;
use crate::error::{WsError, WsResult};
use crate::handler::{FeedHandler, HandlerRegistry};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::{AuthAck, FeedEvent, FeedMessage, OutboundFrame, SubscriptionParams};
use crate::subscription::SubscriptionRegistry;
use crate::transport::{
    Connector, FrameSink, FrameStream, TungsteniteConnector, WsInbound, WsOutbound,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on the backoff delay.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;

/// Feed client configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket URL.
    pub url: String,
    /// Consecutive failed reconnects before giving up (0 = never give up).
    pub max_reconnect_attempts: u32,
    /// Cap for the exponential backoff delay.
    pub max_backoff_secs: u64,
    /// Bound on opening the transport.
    pub handshake_timeout_ms: u64,
    /// Idle time before a ping is sent (0 disables the heartbeat).
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this.
    pub heartbeat_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 10,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            handshake_timeout_ms: 30_000,
            heartbeat_interval_ms: 45_000,
            heartbeat_timeout_ms: 10_000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Auth frame sent, waiting for the result.
    Authenticating,
    /// Session established (authenticated or not) and frames are flowing.
    Listening,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Reconnect attempts exhausted. Only an explicit `connect()` resumes.
    Failed,
}

impl ConnectionState {
    /// Whether a session is open and frames can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Authenticating | Self::Listening
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Listening => "listening",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    /// Every state, for exporting one-hot gauges.
    pub const ALL: [ConnectionState; 7] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Connected,
        Self::Authenticating,
        Self::Listening,
        Self::Reconnecting,
        Self::Failed,
    ];
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backoff before reconnect attempt `attempt` (1-based): `min(2^attempt, max_secs)` seconds.
pub fn backoff_delay(attempt: u32, max_secs: u64) -> Duration {
    // 2^20 s is far beyond any sensible cap
    let secs = (1u64 << attempt.min(20)).min(max_secs);
    Duration::from_secs(secs)
}

/// Client for the upstream realtime feed.
///
/// One instance owns one physical connection. All methods take `&self`, so
/// the client is shared as `Arc<FeedClient>` between the listener task and
/// callers that subscribe or send.
pub struct FeedClient {
    config: FeedConfig,
    connector: Arc<dyn Connector>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    state_tx: watch::Sender<ConnectionState>,
    authenticated: AtomicBool,
    reconnect_attempt: AtomicU32,
    running: AtomicBool,
    subscriptions: SubscriptionRegistry,
    handlers: HandlerRegistry,
    heartbeat: HeartbeatMonitor,
    /// Write half of the live session.
    sink: TokioMutex<Option<Box<dyn FrameSink>>>,
    /// Read half of the live session, taken by the listener while reading.
    stream: TokioMutex<Option<Box<dyn FrameStream>>>,
    /// Cancels the current listener. Cancelled by `close()`, replaced by
    /// the next `connect()`.
    shutdown: Mutex<CancellationToken>,
}

impl FeedClient {
    /// Client connecting to `config.url` over WebSocket.
    pub fn new(config: FeedConfig) -> Self {
        let connector = Arc::new(TungsteniteConnector::new(config.url.clone()));
        Self::with_connector(config, connector)
    }

    /// Client using a custom transport.
    pub fn with_connector(config: FeedConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            heartbeat: HeartbeatMonitor::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            ),
            config,
            connector,
            credentials: None,
            state_tx,
            authenticated: AtomicBool::new(false),
            reconnect_attempt: AtomicU32::new(0),
            running: AtomicBool::new(false),
            subscriptions: SubscriptionRegistry::new(),
            handlers: HandlerRegistry::new(),
            sink: TokioMutex::new(None),
            stream: TokioMutex::new(None),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Attach a credential provider. Without one, authentication is skipped.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Whether a listener loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current reconnect attempt (0 while healthy).
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Append a handler for `event_type`. No de-duplication.
    pub fn register_handler(&self, event_type: &str, handler: Arc<dyn FeedHandler>) {
        debug!(event_type, "Registering feed handler");
        self.handlers.register(event_type, handler);
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.handler_count(event_type)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Feed state transition");
        }
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    /// Open the connection, authenticate if credentials exist, and replay
    /// every subscription.
    ///
    /// Never fails past this boundary: errors are logged and reported as
    /// `false`. Calling it while connected is a no-op returning `true`.
    pub async fn connect(&self) -> bool {
        if self.is_connected() {
            debug!("Feed already connected");
            return true;
        }

        {
            let mut token = self.shutdown.lock();
            if token.is_cancelled() {
                *token = CancellationToken::new();
            }
        }

        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                error!(url = %self.config.url, error = %e, "Feed connection failed");
                self.set_state(ConnectionState::Disconnected);
                false
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to feed");
        self.set_state(ConnectionState::Connecting);

        let timeout = Duration::from_millis(self.config.handshake_timeout_ms);
        let (mut sink, stream) = tokio::time::timeout(timeout, self.connector.open())
            .await
            .map_err(|_| WsError::HandshakeTimeout(timeout))??;

        self.set_state(ConnectionState::Connected);
        self.reconnect_attempt.store(0, Ordering::SeqCst);
        self.authenticated.store(false, Ordering::SeqCst);
        self.heartbeat.reset();
        info!("Feed connected");

        let api_key = self.credentials.as_ref().and_then(|c| c.api_key());
        if let Some(api_key) = &api_key {
            self.set_state(ConnectionState::Authenticating);
            let auth = OutboundFrame::auth(api_key, Utc::now().timestamp());
            sink.send(WsOutbound::Text(auth.to_text()?)).await?;
            debug!("Auth frame sent");
        } else {
            info!("No API key configured, running unauthenticated");
        }

        let subscriptions = self.subscriptions.snapshot();
        if !subscriptions.is_empty() {
            info!(count = subscriptions.len(), "Restoring subscriptions");
        }
        for (topic, params) in &subscriptions {
            let frame = OutboundFrame::subscribe(topic, params);
            sink.send(WsOutbound::Text(frame.to_text()?)).await?;
            debug!(topic = %topic, "Subscription replayed");
        }

        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);

        if api_key.is_none() {
            self.set_state(ConnectionState::Listening);
        }
        Ok(())
    }

    /// `connect()`, falling back to the reconnection policy on failure.
    pub async fn connect_with_retry(&self) -> bool {
        if self.connect().await {
            return true;
        }
        let token = self.shutdown.lock().clone();
        self.reconnect(&token).await
    }

    /// Run the reconnection policy until connected, exhausted or cancelled.
    async fn reconnect(&self, token: &CancellationToken) -> bool {
        loop {
            if token.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                return false;
            }

            let attempt = self.reconnect_attempt() + 1;
            let max = self.config.max_reconnect_attempts;
            if max > 0 && attempt > max {
                let err = WsError::ReconnectExhausted(max);
                error!(error = %err, "Feed client failed, explicit connect required");
                self.set_state(ConnectionState::Failed);
                return false;
            }
            self.reconnect_attempt.store(attempt, Ordering::SeqCst);
            self.set_state(ConnectionState::Reconnecting);

            let delay = backoff_delay(attempt, self.config.max_backoff_secs);
            warn!(attempt, delay_secs = delay.as_secs(), "Reconnecting to feed");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => {
                    info!("Shutdown requested during backoff");
                    self.set_state(ConnectionState::Disconnected);
                    return false;
                }
            }

            if self.connect().await {
                if token.is_cancelled() {
                    // close() raced with the reconnect
                    self.drop_session().await;
                    self.set_state(ConnectionState::Disconnected);
                    return false;
                }
                info!(attempt, "Feed reconnected");
                return true;
            }
        }
    }

    /// Signal the listener to stop at its next suspension point.
    ///
    /// A listener started after this call exits immediately until the next
    /// `connect()`.
    pub fn signal_shutdown(&self) {
        self.shutdown.lock().cancel();
    }

    /// Stop listening and close the session.
    ///
    /// Subscriptions are kept and replayed by the next `connect()`.
    pub async fn close(&self) {
        self.signal_shutdown();

        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "Close frame not delivered");
            }
        }
        self.stream.lock().await.take();
        self.authenticated.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        info!("Feed connection closed");
    }

    /// Drop a dead session without touching the shutdown token.
    async fn drop_session(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = tokio::time::timeout(Duration::from_secs(1), sink.close()).await;
        }
        self.stream.lock().await.take();
        self.authenticated.store(false, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------------
    // Listening
    // ------------------------------------------------------------------------

    /// Read and dispatch frames until closed, cancelled or failed.
    ///
    /// Connection loss while running enters the reconnection policy; the
    /// loop returns once the client is closed or has moved to `Failed`.
    pub async fn listen(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Feed listener already running");
            return;
        }
        let token = self.shutdown.lock().clone();
        info!("Feed listener started");

        loop {
            if token.is_cancelled() {
                break;
            }

            let stream = self.stream.lock().await.take();
            let result = match stream {
                Some(mut stream) => self.read_loop(stream.as_mut(), &token).await,
                None => Err(WsError::NotConnected),
            };

            match result {
                Ok(()) => break,
                Err(e) => {
                    if token.is_cancelled() {
                        break;
                    }
                    warn!(error = %e, "Feed connection lost");
                    self.drop_session().await;
                    if !self.reconnect(&token).await {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(state = %self.state(), "Feed listener stopped");
    }

    /// Returns `Ok(())` on cancellation, `Err` when the session is lost.
    async fn read_loop(
        &self,
        stream: &mut dyn FrameStream,
        token: &CancellationToken,
    ) -> WsResult<()> {
        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    debug!("Shutdown signal received in listener");
                    return Ok(());
                }

                frame = stream.next_frame() => {
                    match frame {
                        Some(Ok(WsInbound::Text(text))) => {
                            self.heartbeat.record_message();
                            self.handle_text(&text);
                        }
                        Some(Ok(WsInbound::Ping(data))) => {
                            self.heartbeat.record_message();
                            self.send_outbound(WsOutbound::Pong(data)).await?;
                        }
                        Some(Ok(WsInbound::Pong)) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(WsInbound::Close { code, reason })) => {
                            warn!(code, %reason, "Feed closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Feed read error");
                            return Err(e);
                        }
                        None => {
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                    }
                }

                () = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Feed heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_heartbeat() {
                        self.send_outbound(WsOutbound::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let message = match FeedMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, frame_len = text.len(), "Dropping unparseable feed frame");
                return;
            }
        };

        match message {
            FeedMessage::Auth(ack) => self.handle_auth(ack),
            FeedMessage::Subscription(ack) => {
                info!(topic = ?ack.topic, status = ?ack.status, "Subscription acknowledged");
            }
            FeedMessage::Error { message, event } => {
                warn!(%message, "Feed reported an error");
                self.dispatch_event(&event);
            }
            FeedMessage::Event(event) => self.dispatch_event(&event),
            FeedMessage::Unrecognized(value) => {
                debug!(frame = %value, "Dropping unrecognized feed frame");
            }
        }
    }

    fn dispatch_event(&self, event: &FeedEvent) {
        let outcome = self.handlers.dispatch(event);
        if outcome.invoked == 0 {
            debug!(event_type = %event.event_type, "No handler for feed frame, dropped");
        }
    }

    fn handle_auth(&self, ack: AuthAck) {
        if ack.success {
            self.authenticated.store(true, Ordering::SeqCst);
            info!("Feed authenticated");
        } else {
            self.authenticated.store(false, Ordering::SeqCst);
            warn!(
                message = ?ack.message,
                "Feed authentication failed, continuing unauthenticated"
            );
        }
        if self.state() == ConnectionState::Authenticating {
            self.set_state(ConnectionState::Listening);
        }
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    async fn send_outbound(&self, frame: WsOutbound) -> WsResult<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(WsError::NotConnected)?;
        sink.send(frame).await
    }

    async fn send_frame(&self, frame: &OutboundFrame) -> WsResult<()> {
        self.send_outbound(WsOutbound::Text(frame.to_text()?)).await
    }

    /// Subscribe to `topic`. Returns `false` when not connected or the send fails.
    pub async fn subscribe(&self, topic: &str, params: SubscriptionParams) -> bool {
        if !self.is_connected() {
            warn!(topic, state = %self.state(), "Cannot subscribe while disconnected");
            return false;
        }

        match self.send_frame(&OutboundFrame::subscribe(topic, &params)).await {
            Ok(()) => {
                self.subscriptions.insert(topic, params);
                info!(topic, "Subscribed");
                true
            }
            Err(e) => {
                error!(topic, error = %e, "Subscribe failed");
                false
            }
        }
    }

    /// Unsubscribe from `topic`. Returns `false` when not connected or the send fails.
    pub async fn unsubscribe(&self, topic: &str) -> bool {
        if !self.is_connected() {
            warn!(topic, state = %self.state(), "Cannot unsubscribe while disconnected");
            return false;
        }

        match self.send_frame(&OutboundFrame::unsubscribe(topic)).await {
            Ok(()) => {
                self.subscriptions.remove(topic);
                info!(topic, "Unsubscribed");
                true
            }
            Err(e) => {
                error!(topic, error = %e, "Unsubscribe failed");
                false
            }
        }
    }

    /// Send an arbitrary JSON frame. Returns `false` when not connected or the send fails.
    pub async fn send(&self, frame: &serde_json::Value) -> bool {
        if !self.is_connected() {
            warn!(state = %self.state(), "Cannot send while disconnected");
            return false;
        }

        let result = match serde_json::to_string(frame) {
            Ok(text) => self.send_outbound(WsOutbound::Text(text)).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Send failed");
                false
            }
        }
    }
}
