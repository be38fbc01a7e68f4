// eventsub-protocol: Twitch EventSub WebSocket message types and decoding.
//
// The wire format nests a `metadata` envelope (id, type, timestamp) around a
// `payload` whose shape depends on `metadata.message_type`. This crate owns
// that nesting: `decode` turns one reassembled text message into a
// `ParseResult`, the same way `rt-protocol` owns the flat `kind`-tagged
// encoding for the timing network's own WebSocket protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frozen v1 message type strings recognized on `metadata.message_type`.
pub mod message_types {
    pub const SESSION_WELCOME: &str = "session_welcome";
    pub const SESSION_KEEPALIVE: &str = "session_keepalive";
    pub const SESSION_RECONNECT: &str = "session_reconnect";
    pub const NOTIFICATION: &str = "notification";
    pub const REVOCATION: &str = "revocation";
}

/// Envelope shared by every message kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub message_id: String,
    pub message_type: String,
    pub message_timestamp: DateTime<Utc>,
}

/// `session_welcome` / the session-bearing half of `session_reconnect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome {
    pub metadata: Metadata,
    pub session_id: String,
    pub keepalive_timeout_seconds: u32,
}

/// `session_reconnect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconnect {
    pub metadata: Metadata,
    pub reconnect_url: Option<String>,
}

/// `notification` / `revocation` — the subscription-type-specific event body
/// is left as an opaque JSON value; decoding it further is the caller's
/// concern (see the crate-level Non-goals).
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub metadata: Metadata,
    pub subscription_type: String,
    pub payload: serde_json::Value,
}

/// A successfully classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SessionWelcome(Welcome),
    SessionKeepalive(Metadata),
    SessionReconnect(Reconnect),
    Notification(EventMessage),
    Revocation(EventMessage),
}

impl Message {
    pub fn metadata(&self) -> &Metadata {
        match self {
            Message::SessionWelcome(w) => &w.metadata,
            Message::SessionKeepalive(m) => m,
            Message::SessionReconnect(r) => &r.metadata,
            Message::Notification(e) | Message::Revocation(e) => &e.metadata,
        }
    }

    /// The frozen `metadata.message_type` string for this variant.
    pub fn type_name(&self) -> &str {
        match self {
            Message::SessionWelcome(_) => message_types::SESSION_WELCOME,
            Message::SessionKeepalive(_) => message_types::SESSION_KEEPALIVE,
            Message::SessionReconnect(_) => message_types::SESSION_RECONNECT,
            Message::Notification(_) => message_types::NOTIFICATION,
            Message::Revocation(_) => message_types::REVOCATION,
        }
    }
}

/// Outcome of decoding one reassembled text message.
///
/// Mirrors `Result<Message, _>` but keeps the three failure shapes distinct
/// so the session loop can emit the right diagnostic for each (see
/// `SessionEvent`).
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    Ok(Message),
    InvalidMessage(String),
    UnknownMessageType(String),
    UnknownSubscriptionType(String),
}

// ---------------------------------------------------------------------------
// Wire envelope (raw, as received) and decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    metadata: Metadata,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    id: String,
    #[serde(default)]
    keepalive_timeout_seconds: Option<u32>,
    #[serde(default)]
    reconnect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSessionPayload {
    session: RawSession,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    #[serde(rename = "type")]
    subscription_type: String,
}

#[derive(Debug, Deserialize)]
struct RawEventPayload {
    subscription: RawSubscription,
}

/// The built-in allowlist of subscription types the shipped parser
/// recognizes without the caller supplying its own. Twitch's catalogue of
/// subscription types grows independently of this crate; anything not in
/// this list surfaces as `ParseResult::UnknownSubscriptionType` rather than
/// being silently accepted.
const KNOWN_SUBSCRIPTION_TYPES: &[&str] = &[
    "channel.follow",
    "channel.subscribe",
    "channel.subscription.gift",
    "channel.subscription.message",
    "channel.cheer",
    "channel.raid",
    "channel.ban",
    "channel.unban",
    "channel.moderator.add",
    "channel.moderator.remove",
    "channel.channel_points_custom_reward_redemption.add",
    "channel.poll.begin",
    "channel.poll.progress",
    "channel.poll.end",
    "channel.prediction.begin",
    "channel.prediction.progress",
    "channel.prediction.lock",
    "channel.prediction.end",
    "channel.chat.message",
    "channel.chat.notification",
    "channel.update",
    "stream.online",
    "stream.offline",
    "user.update",
];

/// Decode one reassembled text message into a `ParseResult`.
///
/// This is the default, ambient decoding this crate ships; see the
/// `eventsub-client` crate's `Parser` trait for how callers may replace it.
pub fn decode(text: &str) -> ParseResult {
    let envelope: RawEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => return ParseResult::InvalidMessage(e.to_string()),
    };

    match envelope.metadata.message_type.as_str() {
        message_types::SESSION_WELCOME => decode_welcome(envelope),
        message_types::SESSION_KEEPALIVE => ParseResult::Ok(Message::SessionKeepalive(envelope.metadata)),
        message_types::SESSION_RECONNECT => decode_reconnect(envelope),
        message_types::NOTIFICATION => decode_event(envelope, Message::Notification),
        message_types::REVOCATION => decode_event(envelope, Message::Revocation),
        other => ParseResult::UnknownMessageType(other.to_owned()),
    }
}

fn decode_welcome(envelope: RawEnvelope) -> ParseResult {
    let payload: RawSessionPayload = match serde_json::from_value(envelope.payload) {
        Ok(p) => p,
        Err(e) => return ParseResult::InvalidMessage(e.to_string()),
    };
    let Some(keepalive_timeout_seconds) = payload.session.keepalive_timeout_seconds else {
        return ParseResult::InvalidMessage(
            "session_welcome payload missing keepalive_timeout_seconds".to_owned(),
        );
    };
    ParseResult::Ok(Message::SessionWelcome(Welcome {
        metadata: envelope.metadata,
        session_id: payload.session.id,
        keepalive_timeout_seconds,
    }))
}

fn decode_reconnect(envelope: RawEnvelope) -> ParseResult {
    let payload: RawSessionPayload = match serde_json::from_value(envelope.payload) {
        Ok(p) => p,
        Err(e) => return ParseResult::InvalidMessage(e.to_string()),
    };
    ParseResult::Ok(Message::SessionReconnect(Reconnect {
        metadata: envelope.metadata,
        reconnect_url: payload.session.reconnect_url,
    }))
}

fn decode_event(
    envelope: RawEnvelope,
    wrap: impl FnOnce(EventMessage) -> Message,
) -> ParseResult {
    let payload: RawEventPayload = match serde_json::from_value(envelope.payload.clone()) {
        Ok(p) => p,
        Err(e) => return ParseResult::InvalidMessage(e.to_string()),
    };
    if !KNOWN_SUBSCRIPTION_TYPES.contains(&payload.subscription.subscription_type.as_str()) {
        return ParseResult::UnknownSubscriptionType(payload.subscription.subscription_type);
    }
    ParseResult::Ok(wrap(EventMessage {
        metadata: envelope.metadata,
        subscription_type: payload.subscription.subscription_type,
        payload: envelope.payload,
    }))
}
