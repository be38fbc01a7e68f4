//! In-memory `Stream + Sink` fakes standing in for a real WebSocket, so the
//! full session loop (and the changeover coordinator it spawns) can be
//! exercised end to end without opening a socket. Test-only — mirrors the
//! plain-struct fakes already used by `reassembler`'s and `ttl_set`'s own
//! test modules, not a mocking framework.

#![cfg(test)]

use crate::error::SessionError;
use crate::socket::Connector;
use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;

/// A shared, clonable log of everything sent on a [`FakeSocket`], so a test
/// can keep a handle to it after the socket itself has been moved into the
/// session loop and dropped.
#[derive(Clone, Default)]
pub(crate) struct SentLog(Arc<Mutex<Vec<Message>>>);

impl SentLog {
    pub(crate) fn messages(&self) -> Vec<Message> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn was_closed_normally(&self) -> bool {
        self.messages().iter().any(|m| {
            matches!(m, Message::Close(Some(frame))
                if frame.code == tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Normal)
        })
    }
}

/// A scripted socket: yields a fixed sequence of inbound frames, then
/// either ends the stream (`Ready(None)`, simulating the peer hanging up)
/// or hangs forever (`Pending`, simulating a quiet connection so a test can
/// exercise the watchdog).
pub(crate) struct FakeSocket {
    incoming: VecDeque<Result<Message, WsError>>,
    close_after_drain: bool,
    sent: SentLog,
}

impl FakeSocket {
    /// Ends the stream once `messages` is exhausted.
    pub(crate) fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            incoming: messages.into_iter().map(Ok).collect(),
            close_after_drain: true,
            sent: SentLog::default(),
        }
    }

    /// Hangs (never completes the read) once `messages` is exhausted —
    /// for watchdog-timeout scenarios where the peer simply goes quiet.
    pub(crate) fn with_messages_then_silence(messages: Vec<Message>) -> Self {
        Self {
            incoming: messages.into_iter().map(Ok).collect(),
            close_after_drain: false,
            sent: SentLog::default(),
        }
    }

    pub(crate) fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }
}

impl Stream for FakeSocket {
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.incoming.pop_front() {
            Some(item) => Poll::Ready(Some(item)),
            None if self.close_after_drain => Poll::Ready(None),
            None => Poll::Pending,
        }
    }
}

impl Sink<Message> for FakeSocket {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.sent.0.lock().unwrap().push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// A `Connector` scripted ahead of time: each URL is handed a queue of
/// sockets to return, one per `connect()` call, so a test can pre-arm both
/// the initial socket and the one a changeover will open.
#[derive(Default)]
pub(crate) struct FakeConnector {
    sockets: Mutex<HashMap<String, VecDeque<FakeSocket>>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, url: &str, socket: FakeSocket) {
        self.sockets
            .lock()
            .unwrap()
            .entry(url.to_owned())
            .or_default()
            .push_back(socket);
    }
}

impl Connector for FakeConnector {
    type Socket = FakeSocket;

    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Self::Socket, SessionError>> {
        Box::pin(async move {
            self.sockets
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| SessionError::Connect(format!("no scripted socket for {url}")))
        })
    }
}
