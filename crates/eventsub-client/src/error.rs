//! Error types for configuration and the running session.

use tokio_tungstenite::tungstenite::Error as WsError;

/// Raised by [`crate::config::ClientConfigBuilder::build`] — before any
/// socket is opened. Keeping validation eager and separate from
/// `SessionError` means a bad config is a `main`-time `?` away from a clean
/// exit, not a surprise three reconnects in.
#[derive(Debug, thiserror::Error)]
pub enum ClientConfigError {
    #[error("connect url must use the ws or wss scheme, got: {0}")]
    InvalidScheme(String),
    #[error("connect url failed to parse: {0}")]
    InvalidUrl(String),
    #[error("keepalive_timeout_seconds must be in [10, 600], got: {0}")]
    KeepaliveOutOfRange(u32),
}

/// Raised from [`crate::session::Client::connect`]. Every variant ends the
/// session; transport loss and watchdog expiry are reported as
/// [`crate::events::Event::ConnectionLost`] instead and do *not* appear
/// here — only faults that abort `connect()` itself do.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("websocket transport: {0}")]
    Transport(#[from] WsError),
    #[error("frame reassembly: {0}")]
    Reassemble(#[from] crate::reassembler::ReassembleError),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("changeover failed: {0}")]
    ChangeoverFailed(String),
}
