//! A long-lived client for Twitch's EventSub WebSocket push-notification
//! transport.
//!
//! [`session::Client`] owns one logical session end to end: connecting,
//! validating the handshake, answering keepalives via a watchdog, tracking
//! at-most-once delivery, and migrating seamlessly to a new endpoint when
//! Twitch asks for one mid-session. It never re-establishes a session on
//! its own after a loss — that decision, and anything above the wire
//! protocol (subscription management, token refresh), belongs to the
//! caller.
//!
//! ```no_run
//! use eventsub_client::{ClientConfigBuilder, Client, Event, EventSink, TungsteniteConnector};
//! use std::sync::Arc;
//!
//! struct PrintSink;
//! impl EventSink for PrintSink {
//!     fn emit(&self, event: Event) {
//!         println!("{event:?}");
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfigBuilder::default().build()?;
//! let client = Client::new(config, TungsteniteConnector, Arc::new(PrintSink));
//! let (_tx, rx) = tokio::sync::watch::channel(false);
//! client.connect(rx).await?;
//! # Ok(())
//! # }
//! ```

mod changeover;
mod clock;
mod config;
mod error;
mod events;
mod parser;
mod reassembler;
mod session;
mod socket;
#[cfg(test)]
mod testing;
mod ttl_set;

pub use clock::{Clock, SystemClock};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_CONNECT_URL};
pub use error::{ClientConfigError, SessionError};
pub use events::{DisconnectReason, Event, EventSink, NullSink};
pub use parser::{JsonParser, Parser};
pub use reassembler::ReassembleError;
pub use session::Client;
pub use socket::{Connector, Socket, TungsteniteConnector, TungsteniteSocket};

pub use eventsub_protocol::{EventMessage, Message, Metadata, ParseResult, Reconnect, Welcome};
