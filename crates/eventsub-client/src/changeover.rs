//! The changeover coordinator: seamless migration to a new endpoint.
//!
//! Triggered by a `session_reconnect` message, this runs as a detached
//! `tokio::spawn`ed task — it owns the new socket only until it hands a
//! completed [`Changeover`] back to the session loop via the `JoinHandle`
//! the loop is `select!`ing on. It never touches the old socket, and it
//! never swaps anything in; that commit happens in the loop itself, when
//! the new welcome arrives.

use crate::error::SessionError;
use crate::parser::Parser;
use crate::reassembler;
use crate::socket::Connector;
use eventsub_protocol::{Message, ParseResult, Welcome};
use std::sync::Arc;

/// The result of a successful endpoint migration: a new socket and the
/// welcome that was read from it. Constructing one is only possible by
/// going through [`perform_changeover`], which enforces that the welcome
/// really was the new socket's first message.
pub struct Changeover<S> {
    pub new_socket: S,
    pub welcome: Welcome,
}

/// Open a fresh connection to `reconnect_url`, read its first message, and
/// confirm it is a `session_welcome`.
///
/// Any other outcome — a different message kind, a parse failure, or the
/// new socket closing before a welcome arrives — is a protocol violation:
/// Twitch's own contract for `session_reconnect` guarantees the new socket's
/// first message is always a welcome.
pub async fn perform_changeover<C: Connector + Clone + 'static>(
    connector: C,
    parser: Arc<dyn Parser>,
    reconnect_url: String,
) -> Result<Changeover<C::Socket>, SessionError> {
    let mut socket = connector.connect(&reconnect_url).await?;

    let text = reassembler::read_message(&mut socket).await?;
    let parsed = match text {
        Some(text) => parser.parse(&text),
        None => {
            return Err(SessionError::ChangeoverFailed(
                "new socket closed before sending a welcome".to_owned(),
            ));
        }
    };

    match parsed {
        ParseResult::Ok(Message::SessionWelcome(welcome)) => Ok(Changeover {
            new_socket: socket,
            welcome,
        }),
        ParseResult::Ok(other) => Err(SessionError::ChangeoverFailed(format!(
            "expected session_welcome as the new socket's first message, got: {}",
            other.type_name()
        ))),
        other => Err(SessionError::ChangeoverFailed(format!(
            "new socket's first message did not parse as a welcome: {other:?}"
        ))),
    }
}
