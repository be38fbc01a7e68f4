//! Pluggable decoding of reassembled text messages.
//!
//! The crate ships a default parser backed by `eventsub_protocol::decode`;
//! callers who need a wider or narrower subscription-type allowlist can
//! supply their own `Parser` to `ClientConfig` instead.

use eventsub_protocol::ParseResult;

/// Turns one reassembled text message into a `ParseResult`.
///
/// Boxed as a trait object (`Arc<dyn Parser>`) in `ClientConfig` rather than
/// threaded through as a generic type parameter, so the session loop's
/// generics stay limited to the socket and event sink types.
pub trait Parser: Send + Sync {
    fn parse(&self, text: &str) -> ParseResult;
}

/// The default parser: `eventsub_protocol::decode` with its built-in
/// subscription-type allowlist.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&self, text: &str) -> ParseResult {
        eventsub_protocol::decode(text)
    }
}
