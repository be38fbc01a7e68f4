//! Client configuration.
//!
//! This crate is a library, not a standalone service, so configuration
//! arrives as a struct built by the caller rather than a TOML file — but
//! validation is still eager and happens once, at construction, the same
//! way the forwarder validates its TOML config before anything connects.

use crate::clock::{Clock, SystemClock};
use crate::error::ClientConfigError;
use crate::parser::{JsonParser, Parser};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// The session loop never imposes a deadline other than the watchdog; its
/// grace period is fixed, not a tuning knob.
pub(crate) const KEEPALIVE_GRACE: StdDuration = StdDuration::from_secs(3);

/// A message older than this relative to the clock is a replay-defense
/// violation, regardless of dedup state.
pub(crate) const MAX_MESSAGE_AGE: ChronoDuration = ChronoDuration::minutes(10);

/// The sliding window within which a repeated `message_id` is suppressed.
pub(crate) const DEDUP_TTL: ChronoDuration = ChronoDuration::minutes(10);

/// Default connect URL, matching Twitch's production EventSub WebSocket
/// endpoint.
pub const DEFAULT_CONNECT_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

const MIN_KEEPALIVE_SECONDS: u32 = 10;
const MAX_KEEPALIVE_SECONDS: u32 = 600;
const DEFAULT_KEEPALIVE_SECONDS: u32 = 600;

/// Validated configuration for a running client. Construct with
/// [`ClientConfigBuilder`]; there is no way to obtain one with an invalid
/// connect URL or an out-of-range keepalive override.
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) connect_url: String,
    pub(crate) initial_keepalive_seconds: u32,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) parser: Arc<dyn Parser>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("connect_url", &self.connect_url)
            .field("initial_keepalive_seconds", &self.initial_keepalive_seconds)
            .finish_non_exhaustive()
    }
}

/// Builder-style constructor inputs. Only `connect_url` is required; the
/// base URL defaults to Twitch's production endpoint.
pub struct ClientConfigBuilder {
    connect_url: String,
    keepalive_timeout_seconds: Option<u32>,
    clock: Arc<dyn Clock>,
    parser: Arc<dyn Parser>,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_URL)
    }
}

impl ClientConfigBuilder {
    pub fn new(connect_url: impl Into<String>) -> Self {
        Self {
            connect_url: connect_url.into(),
            keepalive_timeout_seconds: None,
            clock: Arc::new(SystemClock),
            parser: Arc::new(JsonParser),
        }
    }

    /// Override the keepalive timeout Twitch should use for this session,
    /// in `[10, 600]` seconds. Appended to `connect_url` as
    /// `?keepalive_timeout_seconds=N` and used to size the watchdog until
    /// the welcome reports its own value.
    pub fn keepalive_timeout_seconds(mut self, seconds: u32) -> Self {
        self.keepalive_timeout_seconds = Some(seconds);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
        if !self.connect_url.starts_with("ws://") && !self.connect_url.starts_with("wss://") {
            return Err(ClientConfigError::InvalidScheme(self.connect_url));
        }
        let mut url = url::Url::parse(&self.connect_url)
            .map_err(|_| ClientConfigError::InvalidUrl(self.connect_url.clone()))?;

        let initial_keepalive_seconds = match self.keepalive_timeout_seconds {
            Some(seconds) => {
                if !(MIN_KEEPALIVE_SECONDS..=MAX_KEEPALIVE_SECONDS).contains(&seconds) {
                    return Err(ClientConfigError::KeepaliveOutOfRange(seconds));
                }
                url.query_pairs_mut()
                    .append_pair("keepalive_timeout_seconds", &seconds.to_string());
                seconds
            }
            None => DEFAULT_KEEPALIVE_SECONDS,
        };

        Ok(ClientConfig {
            connect_url: url.into(),
            initial_keepalive_seconds,
            clock: self.clock,
            parser: self.parser,
        })
    }
}
