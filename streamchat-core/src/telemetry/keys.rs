/// Span/Log attribute keys for turn records.
/// Keep these stable; changing them is a breaking change for dashboards.
pub const KEY_CONVERSATION_ID: &str = "chat.conversation_id";
pub const KEY_DELTAS: &str = "turn.deltas";
pub const KEY_CHARS: &str = "turn.chars";
pub const KEY_LATENCY_MS: &str = "latency.ms";
pub const KEY_OUTCOME: &str = "turn.outcome";

/// Error-related (if applicable)
pub const KEY_ERROR_MESSAGE: &str = "error.message";
