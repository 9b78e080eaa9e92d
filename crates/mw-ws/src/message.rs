//! Feed wire messages.
//!
//! Every frame in both directions is a JSON object `{"type": <string>, ...}`.
//! Outbound control frames are a serde-tagged enum; inbound frames are
//! classified into `FeedMessage`, with an explicit `Unrecognized` variant for
//! anything that lacks a string `type`.

use crate::error::{WsError, WsResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Inbound type for authentication results.
pub const TYPE_AUTH: &str = "auth";
/// Inbound type for subscription acknowledgements.
pub const TYPE_SUBSCRIPTION: &str = "subscription";
/// Inbound type for upstream error notices.
pub const TYPE_ERROR: &str = "error";

/// Opaque subscription parameters (e.g. a category filter).
pub type SubscriptionParams = serde_json::Map<String, Value>;

// ============================================================================
// Outbound
// ============================================================================

/// Control frame sent to the upstream feed.
#[derive(Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// `{"type":"auth","apiKey":...,"timestamp":"<unix seconds>"}`
    Auth {
        #[serde(rename = "apiKey")]
        api_key: String,
        timestamp: String,
    },
    /// `{"type":"subscribe","topic":...,"params":{...}?}`
    Subscribe {
        topic: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<SubscriptionParams>,
    },
    /// `{"type":"unsubscribe","topic":...}`
    Unsubscribe { topic: String },
}

impl OutboundFrame {
    pub fn auth(api_key: &str, unix_secs: i64) -> Self {
        Self::Auth {
            api_key: api_key.to_string(),
            timestamp: unix_secs.to_string(),
        }
    }

    /// Empty parameter maps are omitted from the wire frame.
    pub fn subscribe(topic: &str, params: &SubscriptionParams) -> Self {
        Self::Subscribe {
            topic: topic.to_string(),
            params: (!params.is_empty()).then(|| params.clone()),
        }
    }

    pub fn unsubscribe(topic: &str) -> Self {
        Self::Unsubscribe {
            topic: topic.to_string(),
        }
    }

    pub fn to_text(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Debug for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Never print key material
            Self::Auth { timestamp, .. } => f
                .debug_struct("Auth")
                .field("api_key", &"<redacted>")
                .field("timestamp", timestamp)
                .finish(),
            Self::Subscribe { topic, params } => f
                .debug_struct("Subscribe")
                .field("topic", topic)
                .field("params", params)
                .finish(),
            Self::Unsubscribe { topic } => {
                f.debug_struct("Unsubscribe").field("topic", topic).finish()
            }
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Result of the authentication handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAck {
    pub success: bool,
    pub message: Option<String>,
}

/// Subscription acknowledgement (logged only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionAck {
    pub topic: Option<String>,
    pub status: Option<String>,
}

/// Application-level frame dispatched to registered handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    /// Value of the `type` field.
    pub event_type: String,
    /// Value of the `data` field (`Null` when absent).
    pub data: Value,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
}

impl FeedEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            received_at: Utc::now(),
        }
    }

    /// Elements of `data.items`, or an empty slice if the frame has none.
    pub fn items(&self) -> &[Value] {
        self.data
            .get("items")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Auth(AuthAck),
    Subscription(SubscriptionAck),
    /// Upstream error notice. Logged, then dispatched like any event; `data`
    /// falls back to the whole frame when it has no `data` field.
    Error { message: String, event: FeedEvent },
    Event(FeedEvent),
    /// Valid JSON without a string `type` field.
    Unrecognized(Value),
}

impl FeedMessage {
    /// Parse one text frame.
    ///
    /// Only malformed JSON is an error; structurally unexpected frames come
    /// back as `Unrecognized`.
    pub fn parse(text: &str) -> WsResult<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| WsError::ParseError(e.to_string()))?;

        let Some(frame_type) = value.get("type").and_then(|v| v.as_str()) else {
            return Ok(Self::Unrecognized(value));
        };

        let msg = match frame_type {
            TYPE_AUTH => Self::Auth(AuthAck {
                success: lookup_str(&value, "status").is_some_and(|s| s == "success"),
                message: lookup_str(&value, "message").map(str::to_string),
            }),
            TYPE_SUBSCRIPTION => Self::Subscription(SubscriptionAck {
                topic: lookup_str(&value, "topic").map(str::to_string),
                status: lookup_str(&value, "status").map(str::to_string),
            }),
            TYPE_ERROR => Self::Error {
                message: lookup_str(&value, "message")
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
                event: FeedEvent::new(
                    TYPE_ERROR,
                    value.get("data").cloned().unwrap_or_else(|| value.clone()),
                ),
            },
            other => {
                let data = value.get("data").cloned().unwrap_or(Value::Null);
                Self::Event(FeedEvent::new(other, data))
            }
        };

        Ok(msg)
    }
}

/// Look up a string field at the top level first, then under `data`.
fn lookup_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .or_else(|| value.get("data")?.get(key)?.as_str())
}
