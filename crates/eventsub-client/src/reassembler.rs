//! Frame reassembly: turns the next logical message on a socket into a
//! UTF-8 string, answering control frames along the way.
//!
//! `tokio-tungstenite` already reassembles continuation frames below the
//! `Message` abstraction — a `Message::Text` yielded by `.next()` is
//! already a complete logical message. This module is still a distinct,
//! independently testable layer: it owns the BOM-stripping, non-text
//! rejection, ping/pong handling, and close handshake this crate's
//! transport contract requires, over *any* `Stream + Sink` of `Message`
//! (a real socket or, in tests, an in-memory fake).

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

#[derive(Debug, thiserror::Error)]
pub enum ReassembleError {
    #[error("received a non-text data frame")]
    NonTextFrame,
    #[error("transport error: {0}")]
    Transport(#[from] WsError),
}

/// Read the next logical text message from `ws`.
///
/// Returns `Ok(None)` if the peer sent a close frame (a normal-closure
/// reply is sent back before returning). Replies to pings with a pong and
/// keeps waiting. Fails with [`ReassembleError::NonTextFrame`] if a
/// non-text data frame arrives — this transport only ever carries JSON
/// text messages.
///
/// Cancellation-safe by construction: dropping the returned future before
/// it resolves discards no partially-delivered message, since nothing is
/// handed to the caller until a complete message is available.
pub async fn read_message<S>(ws: &mut S) -> Result<Option<String>, ReassembleError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    loop {
        match ws.next().await {
            None => return Ok(None),
            Some(Err(e)) => return Err(ReassembleError::Transport(e)),
            Some(Ok(Message::Text(text))) => return Ok(Some(strip_bom(text.as_str()))),
            Some(Ok(Message::Binary(_))) => return Err(ReassembleError::NonTextFrame),
            Some(Ok(Message::Ping(data))) => {
                let _ = ws.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) => {
                let _ = ws
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    })))
                    .await;
                return Ok(None);
            }
            Some(Ok(Message::Frame(_))) => return Err(ReassembleError::NonTextFrame),
        }
    }
}

fn strip_bom(text: &str) -> String {
    text.strip_prefix('\u{feff}').unwrap_or(text).to_owned()
}
