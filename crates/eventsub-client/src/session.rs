//! The session loop — the heart of the crate.
//!
//! One `Client::connect` call owns one logical session: it multiplexes the
//! next inbound message on the current socket, the keepalive watchdog, and
//! a pending changeover (if one is in flight) behind a single
//! `tokio::select!`, the same `biased;` + conditionally-polled-`Option`
//! idiom the receiver's own `run_session_loop` uses for its shutdown
//! signal. There is exactly one task mutating session state, so none of
//! `SessionRuntime`'s fields need a lock.

use crate::changeover::{self, Changeover};
use crate::config::{ClientConfig, DEDUP_TTL, KEEPALIVE_GRACE, MAX_MESSAGE_AGE};
use crate::error::SessionError;
use crate::events::{DisconnectReason, Event, EventSink};
use crate::parser::Parser;
use crate::reassembler::{self, ReassembleError};
use crate::socket::{self, Connector, Socket};
use crate::ttl_set::TtlSet;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use eventsub_protocol::{Message, ParseResult};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Mutable state for one logical session. Lives entirely inside
/// `Client::connect`'s call stack — nothing external ever reaches in.
struct SessionRuntime<S: Socket> {
    socket: S,
    keepalive_seconds: u32,
    last_message_at: DateTime<Utc>,
    welcome_received: bool,
    seen_ids: TtlSet,
    pending_changeover: Option<JoinHandle<Result<Changeover<S>, SessionError>>>,
}

/// A running EventSub WebSocket client.
///
/// Construct with [`ClientConfig`] and a [`Connector`] (use
/// [`crate::socket::TungsteniteConnector`] for the real transport; tests
/// substitute their own). `connector` must be cheap to clone — a fresh
/// clone is handed to each detached changeover task.
pub struct Client<C> {
    config: ClientConfig,
    connector: C,
    sink: Arc<dyn EventSink>,
}

impl<C: Connector + Clone + 'static> Client<C> {
    pub fn new(config: ClientConfig, connector: C, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            connector,
            sink,
        }
    }

    /// Connect, then run the session loop until `ConnectionLost` fires or
    /// `cancel` is signalled.
    ///
    /// Returns `Ok(())` on any clean exit — transport loss (after emitting
    /// `ConnectionLost`) or cancellation (silently). Returns `Err` only for
    /// a fault that aborts the session outright: a bad connect, a
    /// protocol violation, or a failed changeover.
    pub async fn connect(&self, mut cancel: watch::Receiver<bool>) -> Result<(), SessionError> {
        info!(url = %self.config.connect_url, "connecting");
        let socket = self.connector.connect(&self.config.connect_url).await?;

        let mut rt = SessionRuntime {
            socket,
            keepalive_seconds: self.config.initial_keepalive_seconds,
            // Initialized to "now" so the watchdog doesn't fire before the
            // first message has a chance to arrive.
            last_message_at: self.config.clock.now(),
            welcome_received: false,
            seen_ids: TtlSet::new(self.config.clock.clone(), DEDUP_TTL),
            pending_changeover: None,
        };

        self.run(&mut rt, &mut cancel).await
    }

    async fn run(
        &self,
        rt: &mut SessionRuntime<C::Socket>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        loop {
            let now = self.config.clock.now();
            let watchdog = tokio::time::sleep(watchdog_remaining(
                rt.last_message_at,
                rt.keepalive_seconds,
                now,
            ));
            tokio::pin!(watchdog);

            tokio::select! {
                biased;

                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        debug!("cancelled, tearing down session");
                        if let Some(handle) = rt.pending_changeover.take() {
                            handle.abort();
                        }
                        return Ok(());
                    }
                }

                join_result = poll_changeover(rt.pending_changeover.as_mut()),
                    if rt.pending_changeover.is_some() =>
                {
                    rt.pending_changeover = None;
                    match join_result {
                        Ok(Ok(changeover)) => self.apply_changeover(rt, changeover).await,
                        Ok(Err(e)) => {
                            error!(error = %e, "changeover failed");
                            return Err(e);
                        }
                        Err(join_err) => {
                            error!(error = %join_err, "changeover task panicked or was dropped");
                            return Err(SessionError::ChangeoverFailed(join_err.to_string()));
                        }
                    }
                }

                read_result = read_next(&mut rt.socket, self.config.parser.as_ref()) => {
                    match self.handle_read(rt, read_result) {
                        ControlFlow::Continue(()) => {}
                        ControlFlow::Break(outcome) => return outcome,
                    }
                }

                () = &mut watchdog => {
                    warn!(
                        keepalive_seconds = rt.keepalive_seconds,
                        "watchdog expired, no traffic within keepalive plus grace period"
                    );
                    self.sink.emit(Event::ConnectionLost(DisconnectReason::KeepaliveTimeout));
                    return Ok(());
                }
            }
        }
    }

    fn handle_read(
        &self,
        rt: &mut SessionRuntime<C::Socket>,
        outcome: Result<Option<ParseResult>, ReassembleError>,
    ) -> ControlFlow<Result<(), SessionError>> {
        match outcome {
            Err(e) => ControlFlow::Break(Err(e.into())),
            Ok(None) => {
                info!("peer closed the connection");
                self.sink
                    .emit(Event::ConnectionLost(DisconnectReason::RemoteDisconnected));
                ControlFlow::Break(Ok(()))
            }
            Ok(Some(ParseResult::InvalidMessage(reason))) => {
                warn!(reason = %reason, "message failed to parse");
                self.sink.emit(Event::MessageParsingFailed(reason));
                ControlFlow::Continue(())
            }
            Ok(Some(ParseResult::UnknownMessageType(name))) => {
                warn!(message_type = %name, "unknown message type");
                self.sink.emit(Event::UnknownMessageTypeReceived(name));
                ControlFlow::Continue(())
            }
            Ok(Some(ParseResult::UnknownSubscriptionType(name))) => {
                warn!(subscription_type = %name, "unknown subscription type");
                self.sink.emit(Event::UnknownSubscriptionTypeReceived(name));
                ControlFlow::Continue(())
            }
            Ok(Some(ParseResult::Ok(message))) => self.handle_message(rt, message),
        }
    }

    fn handle_message(
        &self,
        rt: &mut SessionRuntime<C::Socket>,
        message: Message,
    ) -> ControlFlow<Result<(), SessionError>> {
        let metadata = message.metadata().clone();
        let now = self.config.clock.now();

        if now.signed_duration_since(metadata.message_timestamp) > MAX_MESSAGE_AGE {
            error!(message_id = %metadata.message_id, "stale message, replay-defense violation");
            return ControlFlow::Break(Err(SessionError::ProtocolViolation(format!(
                "message {} is older than the {}-minute replay window",
                metadata.message_id,
                MAX_MESSAGE_AGE.num_minutes()
            ))));
        }

        if !rt.seen_ids.add(metadata.message_id.clone()) {
            debug!(message_id = %metadata.message_id, "duplicate message id, dropping");
            return ControlFlow::Continue(());
        }

        rt.last_message_at = metadata.message_timestamp;

        match message {
            Message::SessionWelcome(welcome) => {
                if rt.welcome_received {
                    error!("received a second session_welcome");
                    return ControlFlow::Break(Err(SessionError::ProtocolViolation(
                        "received a second session_welcome on an established session".to_owned(),
                    )));
                }
                rt.welcome_received = true;
                rt.keepalive_seconds = welcome.keepalive_timeout_seconds;
                info!(session_id = %welcome.session_id, "session established");
                self.sink.emit(Event::Connected(welcome));
                ControlFlow::Continue(())
            }
            other if !rt.welcome_received => {
                error!(message_type = other.type_name(), "first message was not a welcome");
                ControlFlow::Break(Err(SessionError::ProtocolViolation(format!(
                    "expected session_welcome as the first message, got: {}",
                    other.type_name()
                ))))
            }
            Message::Notification(event) => {
                debug!(subscription_type = %event.subscription_type, "notification");
                self.sink.emit(Event::NotificationReceived(event));
                ControlFlow::Continue(())
            }
            Message::Revocation(event) => {
                info!(subscription_type = %event.subscription_type, "revocation");
                self.sink.emit(Event::RevocationReceived(event));
                ControlFlow::Continue(())
            }
            Message::SessionReconnect(reconnect) => {
                let Some(url) = reconnect.reconnect_url else {
                    error!("session_reconnect missing reconnect_url");
                    return ControlFlow::Break(Err(SessionError::ProtocolViolation(
                        "session_reconnect message missing reconnect_url".to_owned(),
                    )));
                };
                info!(reconnect_url = %url, "changeover triggered, opening new socket");
                let connector = self.connector.clone();
                let parser = self.config.parser.clone();
                rt.pending_changeover =
                    Some(tokio::spawn(changeover::perform_changeover(connector, parser, url)));
                ControlFlow::Continue(())
            }
            Message::SessionKeepalive(_) => {
                debug!("keepalive");
                ControlFlow::Continue(())
            }
        }
    }

    async fn apply_changeover(&self, rt: &mut SessionRuntime<C::Socket>, changeover: Changeover<C::Socket>) {
        let mut old_socket = std::mem::replace(&mut rt.socket, changeover.new_socket);
        rt.keepalive_seconds = changeover.welcome.keepalive_timeout_seconds;
        rt.last_message_at = changeover.welcome.metadata.message_timestamp;
        info!(
            session_id = %changeover.welcome.session_id,
            "changeover applied, closing old socket"
        );
        socket::close_normally(&mut old_socket).await;
    }
}

async fn poll_changeover<T>(handle: Option<&mut JoinHandle<T>>) -> Result<T, tokio::task::JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn read_next<S: Socket>(
    socket: &mut S,
    parser: &dyn Parser,
) -> Result<Option<ParseResult>, ReassembleError> {
    match reassembler::read_message(socket).await? {
        None => Ok(None),
        Some(text) => Ok(Some(parser.parse(&text))),
    }
}

fn watchdog_remaining(last_message_at: DateTime<Utc>, keepalive_seconds: u32, now: DateTime<Utc>) -> StdDuration {
    let grace = ChronoDuration::from_std(KEEPALIVE_GRACE).unwrap_or_else(|_| ChronoDuration::zero());
    let deadline = last_message_at + ChronoDuration::seconds(i64::from(keepalive_seconds)) + grace;
    (deadline - now).to_std().unwrap_or(StdDuration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::config::ClientConfigBuilder;
    use crate::testing::{FakeConnector, FakeSocket};
    use std::sync::Mutex as StdMutex;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    #[derive(Default)]
    struct RecordingSink {
        events: StdMutex<Vec<Event>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn envelope(message_id: &str, message_type: &str, timestamp: &str, payload: serde_json::Value) -> String {
        serde_json::json!({
            "metadata": {
                "message_id": message_id,
                "message_type": message_type,
                "message_timestamp": timestamp,
            },
            "payload": payload,
        })
        .to_string()
    }

    fn welcome(message_id: &str, timestamp: &str, session_id: &str, keepalive: u32) -> String {
        envelope(
            message_id,
            "session_welcome",
            timestamp,
            serde_json::json!({"session": {"id": session_id, "keepalive_timeout_seconds": keepalive}}),
        )
    }

    fn notification(message_id: &str, timestamp: &str, subscription_type: &str) -> String {
        envelope(
            message_id,
            "notification",
            timestamp,
            serde_json::json!({"subscription": {"type": subscription_type}, "event": {}}),
        )
    }

    fn reconnect(message_id: &str, timestamp: &str, url: &str) -> String {
        envelope(
            message_id,
            "session_reconnect",
            timestamp,
            serde_json::json!({"session": {"id": "irrelevant", "reconnect_url": url}}),
        )
    }

    const EPOCH: &str = "2023-07-19T14:56:51.000000000Z";

    fn epoch() -> DateTime<Utc> {
        EPOCH.parse().unwrap()
    }

    fn config_for(url: &str, clock: Arc<FakeClock>) -> ClientConfig {
        ClientConfigBuilder::new(url.to_owned())
            .clock(clock)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn s1_happy_path_connect_notify_dedup_disconnect() {
        let clock = Arc::new(FakeClock::new(epoch()));
        let config = config_for("ws://a", clock.clone());
        let connector = Arc::new(FakeConnector::new());
        connector.script(
            "ws://a",
            FakeSocket::with_messages(vec![
                WsMessage::Text(welcome("m1", EPOCH, "s1", 30).into()),
                WsMessage::Text(notification("m2", EPOCH, "channel.follow").into()),
                WsMessage::Text(notification("m2", EPOCH, "channel.follow").into()),
            ]),
        );
        let sink = Arc::new(RecordingSink::default());
        let client = Client::new(config, connector, sink.clone());
        let (_tx, rx) = watch::channel(false);

        client.connect(rx.clone()).await.unwrap();

        let events = sink.events();
        assert!(matches!(events[0], Event::Connected(_)));
        let notifications: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::NotificationReceived(_)))
            .collect();
        assert_eq!(notifications.len(), 1, "duplicate notification id must not be delivered twice");
        assert!(matches!(
            events.last().unwrap(),
            Event::ConnectionLost(DisconnectReason::RemoteDisconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn s2_keepalive_timeout_fires_watchdog() {
        let clock = Arc::new(FakeClock::new(epoch()));
        let config = config_for("ws://a", clock.clone());
        let connector = Arc::new(FakeConnector::new());
        connector.script(
            "ws://a",
            FakeSocket::with_messages_then_silence(vec![WsMessage::Text(
                welcome("m1", EPOCH, "s1", 10).into(),
            )]),
        );
        let sink = Arc::new(RecordingSink::default());
        let client = Client::new(config, connector, sink.clone());
        let (_tx, rx) = watch::channel(false);

        tokio::time::advance(StdDuration::from_secs(1)).await;
        let handle = tokio::spawn(async move { client.connect(rx).await });
        tokio::time::advance(StdDuration::from_secs(13)).await;
        handle.await.unwrap().unwrap();

        let events = sink.events();
        assert!(matches!(events[0], Event::Connected(_)));
        assert!(matches!(
            events.last().unwrap(),
            Event::ConnectionLost(DisconnectReason::KeepaliveTimeout)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn s3_reconnect_migrates_without_reemitting_connected_and_keeps_dedup() {
        let clock = Arc::new(FakeClock::new(epoch()));
        let config = config_for("ws://a", clock.clone());
        let connector = Arc::new(FakeConnector::new());
        connector.script(
            "ws://a",
            FakeSocket::with_messages_then_silence(vec![
                WsMessage::Text(welcome("m1", EPOCH, "s1", 30).into()),
                WsMessage::Text(notification("x", EPOCH, "channel.follow").into()),
                WsMessage::Text(reconnect("m3", EPOCH, "ws://b").into()),
            ]),
        );
        let socket_b = FakeSocket::with_messages_then_silence(vec![
            WsMessage::Text(welcome("m4", EPOCH, "s1", 30).into()),
            WsMessage::Text(notification("x", EPOCH, "channel.follow").into()),
        ]);
        connector.script("ws://b", socket_b);
        let sink = Arc::new(RecordingSink::default());
        let client = Client::new(config, connector, sink.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { client.connect(rx).await });
        // Give the reader task a chance to drain socket A, spawn the
        // changeover, and have it complete against socket B.
        tokio::time::advance(StdDuration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let events = sink.events();
        let connected_count = events.iter().filter(|e| matches!(e, Event::Connected(_))).count();
        assert_eq!(connected_count, 1, "changeover must not re-emit Connected");
        let notification_count = events
            .iter()
            .filter(|e| matches!(e, Event::NotificationReceived(_)))
            .count();
        assert_eq!(notification_count, 1, "duplicate id from the new socket must be suppressed");
    }

    #[tokio::test(start_paused = true)]
    async fn s4_stale_message_is_a_protocol_violation() {
        let clock = Arc::new(FakeClock::new(epoch()));
        let config = config_for("ws://a", clock.clone());
        let connector = Arc::new(FakeConnector::new());
        let stale_timestamp = (epoch() - ChronoDuration::minutes(11))
            .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
        connector.script(
            "ws://a",
            FakeSocket::with_messages_then_silence(vec![
                WsMessage::Text(welcome("m1", EPOCH, "s1", 30).into()),
                WsMessage::Text(notification("m2", &stale_timestamp, "channel.follow").into()),
            ]),
        );
        let sink = Arc::new(RecordingSink::default());
        let client = Client::new(config, connector, sink.clone());
        let (_tx, rx) = watch::channel(false);

        let err = client.connect(rx).await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn s5_non_welcome_first_message_is_a_protocol_violation() {
        let clock = Arc::new(FakeClock::new(epoch()));
        let config = config_for("ws://a", clock.clone());
        let connector = Arc::new(FakeConnector::new());
        connector.script(
            "ws://a",
            FakeSocket::with_messages_then_silence(vec![WsMessage::Text(
                envelope("m1", "session_keepalive", EPOCH, serde_json::json!({})).into(),
            )]),
        );
        let sink = Arc::new(RecordingSink::default());
        let client = Client::new(config, connector, sink.clone());
        let (_tx, rx) = watch::channel(false);

        let err = client.connect(rx).await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation(_)));
        assert!(sink.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn s6_parse_failure_is_a_diagnostic_and_the_loop_continues() {
        let clock = Arc::new(FakeClock::new(epoch()));
        let config = config_for("ws://a", clock.clone());
        let connector = Arc::new(FakeConnector::new());
        connector.script(
            "ws://a",
            FakeSocket::with_messages(vec![
                WsMessage::Text(welcome("m1", EPOCH, "s1", 30).into()),
                WsMessage::Text("not json".into()),
                WsMessage::Text(notification("m2", EPOCH, "channel.follow").into()),
            ]),
        );
        let sink = Arc::new(RecordingSink::default());
        let client = Client::new(config, connector, sink.clone());
        let (_tx, rx) = watch::channel(false);

        client.connect(rx).await.unwrap();

        let events = sink.events();
        assert!(events.iter().any(|e| matches!(e, Event::MessageParsingFailed(_))));
        assert!(events.iter().any(|e| matches!(e, Event::NotificationReceived(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_exits_cleanly_with_no_connection_lost_event() {
        let clock = Arc::new(FakeClock::new(epoch()));
        let config = config_for("ws://a", clock.clone());
        let connector = Arc::new(FakeConnector::new());
        connector.script(
            "ws://a",
            FakeSocket::with_messages_then_silence(vec![WsMessage::Text(
                welcome("m1", EPOCH, "s1", 30).into(),
            )]),
        );
        let sink = Arc::new(RecordingSink::default());
        let client = Client::new(config, connector, sink.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { client.connect(rx).await });
        tokio::time::advance(StdDuration::from_millis(10)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert!(sink.events().iter().all(|e| !matches!(e, Event::ConnectionLost(_))));
    }
}
