//! Stream events decoded from the reply wire protocol.
//!
//! Contract:
//! - A reply stream may emit 0..n `TextDelta` events, interleaved with
//!   `Status` events, and terminates with exactly one `Done`.
//! - After `Done`, no further events are emitted.
//! - `Status` text is informational, for caller-side logging only; it has
//!   no rendering contract.

use serde::Deserialize;

use crate::error::{CoreResult, StreamChatError};

/// Marker prefixing a frame line that carries an event record.
/// Lines without it are ignored by the reader.
pub const DATA_PREFIX: &str = "data: ";

/// What the caller receives incrementally.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Partial assistant text (delta). Empty string is allowed but should be rare.
    TextDelta(String),
    /// Informational progress note from the backend (e.g. "Searching web...").
    Status(String),
    /// Normal termination of the reply stream.
    Done,
}

impl StreamEvent {
    /// Returns true if this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Convenience accessor for `TextDelta` contents.
    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            Self::TextDelta(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

// ---- Wire record (minimal) ----
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent {
    Text { text: String },
    Status { text: String },
    Done {},
}

/// Decode one frame line into an event.
///
/// Returns `None` for lines that do not carry the `data: ` marker (comments,
/// blank keep-alives, unknown fields) — those are ignored, not errors.
/// A marked line whose payload fails to parse yields `Decode`; callers skip
/// it and keep the stream alive.
pub fn decode_frame(line: &str) -> Option<CoreResult<StreamEvent>> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?;
    let event = match serde_json::from_str::<WireEvent>(payload) {
        Ok(WireEvent::Text { text }) => StreamEvent::TextDelta(text),
        Ok(WireEvent::Status { text }) => StreamEvent::Status(text),
        Ok(WireEvent::Done {}) => StreamEvent::Done,
        Err(e) => return Some(Err(StreamChatError::Decode(e.to_string()))),
    };
    Some(Ok(event))
}
