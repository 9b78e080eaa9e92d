//! Transport abstraction for the feed connection.
//!
//! `FeedClient` talks to the upstream through a `Connector`, which opens a
//! session split into a write half (`FrameSink`) and a read half
//! (`FrameStream`). The production implementation wraps tokio-tungstenite;
//! `MockConnector` scripts connection outcomes for tests.

use crate::error::{WsError, WsResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use mw_core::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Outbound transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsOutbound {
    /// JSON text frame.
    Text(String),
    /// Protocol-level ping (heartbeat).
    Ping(Vec<u8>),
    /// Protocol-level pong (reply to a server ping).
    Pong(Vec<u8>),
}

/// Inbound transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsInbound {
    Text(String),
    Ping(Vec<u8>),
    Pong,
    Close { code: u16, reason: String },
}

/// Write half of an open session.
pub trait FrameSink: Send {
    fn send(&mut self, frame: WsOutbound) -> BoxFuture<'_, WsResult<()>>;

    /// Send a close frame. Errors are informational only.
    fn close(&mut self) -> BoxFuture<'_, WsResult<()>>;
}

/// Read half of an open session. `None` means the stream ended.
pub trait FrameStream: Send {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<WsResult<WsInbound>>>;
}

/// An open session: write half and read half.
pub type Session = (Box<dyn FrameSink>, Box<dyn FrameStream>);

/// Opens sessions to the upstream feed.
pub trait Connector: Send + Sync {
    fn open(&self) -> BoxFuture<'_, WsResult<Session>>;
}

// ============================================================================
// tokio-tungstenite
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    url: String,
}

impl TungsteniteConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self) -> BoxFuture<'_, WsResult<Session>> {
        Box::pin(async move {
            // TCP_NODELAY on: feed frames are small and latency sensitive
            let (ws_stream, _response) =
                connect_async_tls_with_config(&self.url, None, true, None).await?;
            let (write, read) = ws_stream.split();
            let sink: Box<dyn FrameSink> = Box::new(TungsteniteSink { write });
            let stream: Box<dyn FrameStream> = Box::new(TungsteniteStream { read });
            Ok((sink, stream))
        })
    }
}

struct TungsteniteSink {
    write: SplitSink<WsStream, Message>,
}

impl FrameSink for TungsteniteSink {
    fn send(&mut self, frame: WsOutbound) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            let msg = match frame {
                WsOutbound::Text(text) => Message::Text(text),
                WsOutbound::Ping(data) => Message::Ping(data),
                WsOutbound::Pong(data) => Message::Pong(data),
            };
            self.write.send(msg).await?;
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            self.write.send(Message::Close(None)).await?;
            Ok(())
        })
    }
}

struct TungsteniteStream {
    read: SplitStream<WsStream>,
}

impl FrameStream for TungsteniteStream {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<WsResult<WsInbound>>> {
        Box::pin(async move {
            loop {
                let frame = match self.read.next().await? {
                    Ok(Message::Text(text)) => WsInbound::Text(text),
                    Ok(Message::Ping(data)) => WsInbound::Ping(data),
                    Ok(Message::Pong(_)) => WsInbound::Pong,
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        WsInbound::Close { code, reason }
                    }
                    Ok(other) => {
                        debug!(kind = ?other, "Ignoring non-text feed frame");
                        continue;
                    }
                    Err(e) => return Some(Err(e.into())),
                };
                return Some(Ok(frame));
            }
        })
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Handle to one session opened through `MockConnector`.
///
/// Lets a test push inbound frames, inspect what the client sent, and drop
/// the connection.
#[derive(Clone)]
pub struct MockSession {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<WsInbound>>>>,
    pings: Arc<AtomicUsize>,
    answer_pings: Arc<AtomicBool>,
    opened_at: tokio::time::Instant,
}

impl MockSession {
    /// Text frames the client sent on this session, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Sent text frames parsed as JSON (non-JSON frames are skipped).
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|t| serde_json::from_str(t).ok())
            .collect()
    }

    /// Deliver a text frame to the client. Returns false once disconnected.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.push(WsInbound::Text(text.into()))
    }

    /// Deliver an arbitrary frame to the client.
    pub fn push(&self, frame: WsInbound) -> bool {
        self.inbound
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// End the read stream, as if the server dropped the connection.
    pub fn disconnect(&self) {
        self.inbound.lock().take();
    }

    /// Keep the session open but stop answering pings, like a stalled peer.
    pub fn stop_answering_pings(&self) {
        self.answer_pings.store(false, Ordering::SeqCst);
    }

    /// Pings the client sent on this session.
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Time (tokio clock) at which the session was opened.
    pub fn opened_at(&self) -> tokio::time::Instant {
        self.opened_at
    }
}

struct MockSink {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<WsInbound>>>>,
    pings: Arc<AtomicUsize>,
    answer_pings: Arc<AtomicBool>,
}

impl FrameSink for MockSink {
    fn send(&mut self, frame: WsOutbound) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            let guard = self.inbound.lock();
            let Some(tx) = guard.as_ref() else {
                return Err(WsError::SendFailed("mock session disconnected".to_string()));
            };
            match frame {
                WsOutbound::Text(text) => self.sent.lock().push(text),
                // Answer pings unless the session is stalled
                WsOutbound::Ping(_) => {
                    self.pings.fetch_add(1, Ordering::SeqCst);
                    if self.answer_pings.load(Ordering::SeqCst) {
                        let _ = tx.send(WsInbound::Pong);
                    }
                }
                WsOutbound::Pong(_) => {}
            }
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            self.inbound.lock().take();
            Ok(())
        })
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<WsInbound>,
}

impl FrameStream for MockStream {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<WsResult<WsInbound>>> {
        Box::pin(async move { self.rx.recv().await.map(Ok) })
    }
}

/// Scripted connector for tests.
///
/// Each `open()` pops the next scripted outcome (`true` = succeed,
/// `false` = fail); once the script is exhausted every open succeeds.
#[derive(Default)]
pub struct MockConnector {
    script: Mutex<VecDeque<bool>>,
    attempts: Mutex<Vec<tokio::time::Instant>>,
    sessions: Mutex<Vec<MockSession>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose opens follow `outcomes` in order.
    pub fn with_script(outcomes: impl IntoIterator<Item = bool>) -> Self {
        let connector = Self::new();
        connector.script.lock().extend(outcomes);
        connector
    }

    /// Number of `open()` calls so far, successful or not.
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Tokio-clock instants of every `open()` call.
    pub fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.attempts.lock().clone()
    }

    /// Successfully opened sessions, oldest first.
    pub fn sessions(&self) -> Vec<MockSession> {
        self.sessions.lock().clone()
    }

    /// Most recently opened session.
    pub fn last_session(&self) -> Option<MockSession> {
        self.sessions.lock().last().cloned()
    }
}

impl Connector for MockConnector {
    fn open(&self) -> BoxFuture<'_, WsResult<Session>> {
        Box::pin(async move {
            let now = tokio::time::Instant::now();
            self.attempts.lock().push(now);

            let succeed = self.script.lock().pop_front().unwrap_or(true);
            if !succeed {
                return Err(WsError::ConnectionFailed(
                    "scripted connect failure".to_string(),
                ));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let session = MockSession {
                sent: Arc::new(Mutex::new(Vec::new())),
                inbound: Arc::new(Mutex::new(Some(tx))),
                pings: Arc::new(AtomicUsize::new(0)),
                answer_pings: Arc::new(AtomicBool::new(true)),
                opened_at: now,
            };
            self.sessions.lock().push(session.clone());

            let sink: Box<dyn FrameSink> = Box::new(MockSink {
                sent: session.sent.clone(),
                inbound: session.inbound.clone(),
                pings: session.pings.clone(),
                answer_pings: session.answer_pings.clone(),
            });
            let stream: Box<dyn FrameStream> = Box::new(MockStream { rx });
            Ok((sink, stream))
        })
    }
}
