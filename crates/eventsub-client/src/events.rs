//! Outward notifications from the session loop.
//!
//! The loop never returns a value to await on a single inbound message; it
//! runs until `ConnectionLost` fires or cancellation, pushing everything a
//! caller might care about through an `EventSink`. Modeled on the
//! receiver/forwarder `ui_events` enums' shape (one tagged enum per
//! externally visible thing that can happen) but dispatched synchronously
//! rather than over a broadcast channel, since this crate has no UI layer
//! subscribing independently — callers implement `EventSink` directly.

use eventsub_protocol::{EventMessage, Welcome};

/// Something the session loop wants the caller to know about. Delivered
/// synchronously from inside the loop's own task — a slow or panicking
/// handler delays or aborts the next read.
#[derive(Debug, Clone)]
pub enum Event {
    /// The welcome handshake on the *initial* socket completed. Fires
    /// exactly once per session; changeover welcomes never re-fire it.
    Connected(Welcome),
    /// An EventSub notification for a known subscription type arrived.
    NotificationReceived(EventMessage),
    /// Twitch revoked a subscription.
    RevocationReceived(EventMessage),
    /// The session ended. Fires at most once, and is always the last event
    /// the loop emits.
    ConnectionLost(DisconnectReason),
    /// A message arrived whose `metadata.message_type` this parser doesn't
    /// recognize. Diagnostic only — the loop continues.
    UnknownMessageTypeReceived(String),
    /// A `notification`/`revocation` arrived whose subscription type this
    /// parser doesn't recognize. Diagnostic only — the loop continues.
    UnknownSubscriptionTypeReceived(String),
    /// A reassembled text message failed to decode. Diagnostic only — the
    /// loop continues.
    MessageParsingFailed(String),
}

/// Why the session ended. Protocol violations, configuration errors, and
/// connect-time transport failures are not represented here — they surface
/// as a fault from `connect()` instead (see [`crate::error::SessionError`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No message (including keepalives) arrived within the keepalive
    /// timeout plus grace period.
    KeepaliveTimeout,
    /// The peer closed the connection.
    RemoteDisconnected,
}

/// Receives events emitted by the session loop.
///
/// Implementations must not block for long — `emit` is called from inside
/// the loop's own task, and a slow sink delays the next read. A panicking
/// handler propagates; handler authors choose whether to catch it.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// An `EventSink` that discards everything. Useful as a default and in
/// tests that only care about side effects observable some other way.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}
