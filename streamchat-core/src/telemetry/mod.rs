//! Telemetry primitives for turn-level observability.
//! By default, no telemetry is emitted unless a sink is installed via `set_telemetry_sink`.

pub mod keys;
pub mod types;

pub use keys::*;
pub use types::*;

use std::sync::Arc;

use once_cell::sync::OnceCell;

/// Implement this to receive telemetry events.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - `record_turn` **may** be called from any thread; implementations should
///   avoid panicking.
/// - Keep overhead minimal; this runs at the end of every turn.
pub trait TelemetrySink: Send + Sync + 'static {
    fn record_turn(&self, log: TurnLog);
}

static TELEMETRY_SINK: OnceCell<Arc<dyn TelemetrySink>> = OnceCell::new();

// In tests, gate emission to only the calling test thread to avoid cross-test interference.
#[cfg(test)]
thread_local! {
    static TEST_CAPTURE: std::cell::Cell<bool> = std::cell::Cell::new(false);
}

/// Install a global telemetry sink. Returns `false` if a sink is already installed.
///
/// Notes:
/// - This is a write-once global for the process lifetime (backed by `OnceCell`).
/// - If you need to clear captured data in tests, clear it in your sink implementation.
pub fn set_telemetry_sink(sink: Arc<dyn TelemetrySink>) -> bool {
    TELEMETRY_SINK.set(sink).is_ok()
}

/// Emit a turn record if a sink is installed. Crate-visible by design.
///
/// In tests, emission is suppressed unless explicitly enabled via `test_set_capture_enabled`.
#[inline]
pub(crate) fn emit_turn(log: TurnLog) {
    #[cfg(test)]
    {
        if !TEST_CAPTURE.with(|c| c.get()) {
            return;
        }
    }
    if let Some(sink) = TELEMETRY_SINK.get() {
        sink.record_turn(log);
    }
}

#[cfg(test)]
/// Test-only helper: enable or disable capture for the current test thread.
///
/// Spawned threads in a test must call this as well if they should emit.
pub fn test_set_capture_enabled(enabled: bool) {
    TEST_CAPTURE.with(|c| c.set(enabled));
}

/// Sink that forwards turn records to `tracing` as one structured payload
/// per turn, keyed by the stable attribute names in [`keys`].
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record_turn(&self, log: TurnLog) {
        let payload = serde_json::json!({
            KEY_CONVERSATION_ID: log.conversation_id,
            KEY_DELTAS: log.deltas,
            KEY_CHARS: log.chars,
            KEY_LATENCY_MS: log.latency_ms,
            KEY_OUTCOME: log.outcome,
            KEY_ERROR_MESSAGE: log.error_message,
        });
        tracing::info!(target: "streamchat::turns", %payload, "turn finished");
    }
}
