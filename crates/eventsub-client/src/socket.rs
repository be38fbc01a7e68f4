//! The WebSocket transport seam.
//!
//! The session loop and changeover coordinator never call
//! `tokio_tungstenite::connect_async` directly — they go through a
//! `Connector`, so tests can substitute an in-memory fake stream instead of
//! opening a real socket (see `eventsub_protocol`'s sibling crate's own
//! "no live socket in tests" convention, and the receiver's generic
//! `run_session_loop<S>` which takes `S: Stream + Sink<Message>` for the
//! same reason).

use crate::error::SessionError;
use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;

/// Anything the session loop can read frames from and write control frames
/// to.
pub trait Socket:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send
{
}

impl<T> Socket for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send
{
}

/// Opens a fresh WebSocket connection to a URL.
///
/// One concrete implementation ships with the crate ([`TungsteniteConnector`]);
/// a `Connector` is also the seam the changeover coordinator uses to open
/// the second, briefly-coexisting socket during a handoff.
pub trait Connector: Send + Sync {
    type Socket: Socket;

    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Self::Socket, SessionError>>;
}

/// The production `Connector`: plain `tokio-tungstenite` over TLS, no
/// custom headers or subprotocol negotiation (the EventSub WebSocket
/// transport needs neither — auth happens over the separate REST surface
/// used to register subscriptions).
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

pub type TungsteniteSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

impl Connector for TungsteniteConnector {
    type Socket = TungsteniteSocket;

    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Self::Socket, SessionError>> {
        Box::pin(async move {
            let (ws, _response) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| SessionError::Connect(e.to_string()))?;
            Ok(ws)
        })
    }
}

/// Lets a `Client` be built with a shared, clonable connector handle — used
/// in tests to keep a reference to a `FakeConnector` for scripting after
/// handing a clone to the client.
impl<C: Connector + ?Sized> Connector for std::sync::Arc<C> {
    type Socket = C::Socket;

    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Self::Socket, SessionError>> {
        (**self).connect(url)
    }
}

/// Sends a normal-closure close frame and ignores the outcome — the socket
/// may already be half-torn-down by the time a changeover or shutdown
/// reaches this point, and there is nothing useful to do with a failed
/// close besides proceeding to drop the socket anyway.
pub(crate) async fn close_normally<S: Socket>(ws: &mut S) {
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    let _ = ws
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        })))
        .await;
}
