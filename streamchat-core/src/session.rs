//! Conversation session: explicit state machine and the reply drive loop.
//!
//! One session owns one conversation at a time. Each send owns its own
//! Accumulated Text; the stream is drained strictly sequentially and the
//! renderer is re-applied to the full snapshot on every delta. Only one
//! reply may be in flight — a second send while awaiting is rejected, not
//! queued.

use std::time::Instant;

use futures_util::StreamExt;
use uuid::Uuid;

use crate::error::{CoreResult, StreamChatError};
use crate::event::StreamEvent;
use crate::normalize;
use crate::render::render_markup;
use crate::telemetry::{self, TurnLog};
use crate::transport::TurnTransport;

/// Markup shown in place of the reply when a turn fails.
pub const FAILURE_MARKUP: &str = "<strong>Sorry, an error occurred. Please try again.</strong>";

/// Session lifecycle. Transitions:
/// Idle -> Composing (user starts a draft), Composing -> AwaitingReply
/// (send accepted), AwaitingReply -> Idle (stream finished or failed).
/// Sending is also allowed straight from Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Composing,
    AwaitingReply,
}

impl SessionState {
    pub fn can_send(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Composing)
    }
}

/// Explicit session context replacing ad-hoc globals: the current
/// conversation, the search-mode flag, and the lifecycle state. Owned by the
/// controller and passed to each operation that needs it.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    conversation_id: Option<String>,
    search_mode: bool,
    state: SessionState,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn search_mode(&self) -> bool {
        self.search_mode
    }

    /// Return the current conversation id, minting one if none is open yet.
    pub fn ensure_conversation(&mut self) -> &str {
        self.conversation_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
    }

    /// Start a fresh conversation: new id, search off, state back to idle.
    pub fn new_conversation(&mut self) -> &str {
        self.search_mode = false;
        self.state = SessionState::Idle;
        self.conversation_id = Some(Uuid::new_v4().to_string());
        self.conversation_id
            .as_deref()
            .unwrap_or_default()
    }

    /// Open an existing conversation; leaves search mode.
    pub fn open_conversation(&mut self, id: &str) {
        self.search_mode = false;
        self.state = SessionState::Idle;
        self.conversation_id = Some(id.to_string());
    }

    pub fn toggle_search(&mut self) -> bool {
        self.search_mode = !self.search_mode;
        self.search_mode
    }

    /// Idle/Composing -> Composing. Rejected while a reply is in flight.
    pub fn begin_compose(&mut self) -> CoreResult<()> {
        if self.state == SessionState::AwaitingReply {
            return Err(StreamChatError::Validation(
                "a reply is already in flight".to_string(),
            ));
        }
        self.state = SessionState::Composing;
        Ok(())
    }
}

/// Where the rendered reply goes. The display region replaces its contents
/// wholesale on every call; the markup has no identity across calls.
pub trait ReplySink {
    fn replace_markup(&mut self, markup: &str);
    fn set_busy(&mut self, busy: bool);
}

struct TurnOutcome {
    accumulated: String,
    deltas: u32,
}

/// Top-level controller: owns the session context and drives turns against
/// the transport.
pub struct ChatSession<T: TurnTransport> {
    transport: T,
    ctx: SessionContext,
}

impl<T: TurnTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            ctx: SessionContext::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.ctx
    }

    /// Send one message and stream the reply into the sink. Returns the full
    /// accumulated reply text on success. On failure the sink's reply region
    /// is replaced by [`FAILURE_MARKUP`], the busy indicator is cleared, and
    /// the error is returned for caller-side reporting.
    pub async fn send(&mut self, message: &str, sink: &mut dyn ReplySink) -> CoreResult<String> {
        if !self.ctx.state.can_send() {
            return Err(StreamChatError::Validation(
                "a reply is already in flight".to_string(),
            ));
        }
        let message = normalize::clean_message(message);
        if message.is_empty() {
            return Err(StreamChatError::Validation("nothing to send".to_string()));
        }

        let conversation_id = self.ctx.ensure_conversation().to_string();
        self.ctx.state = SessionState::AwaitingReply;
        sink.set_busy(true);
        let started = Instant::now();

        let result = self.drive(&message, &conversation_id, sink).await;

        sink.set_busy(false);
        self.ctx.state = SessionState::Idle;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                telemetry::emit_turn(
                    TurnLog::new()
                        .conversation_id(&conversation_id)
                        .deltas(outcome.deltas)
                        .chars(outcome.accumulated.chars().count() as u32)
                        .latency_ms(latency_ms)
                        .outcome("done"),
                );
                Ok(outcome.accumulated)
            }
            Err(e) => {
                sink.replace_markup(FAILURE_MARKUP);
                tracing::warn!(error = %e, conversation = %conversation_id, "turn failed");
                telemetry::emit_turn(
                    TurnLog::new()
                        .conversation_id(&conversation_id)
                        .latency_ms(latency_ms)
                        .outcome(outcome_label(&e))
                        .error_message_opt(Some(&e.to_string())),
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        message: &str,
        conversation_id: &str,
        sink: &mut dyn ReplySink,
    ) -> CoreResult<TurnOutcome> {
        let mut stream = self.transport.submit_turn(message, conversation_id).await?;

        let mut accumulated = String::new();
        let mut deltas = 0u32;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta(text) => {
                    accumulated.push_str(&text);
                    deltas += 1;
                    sink.replace_markup(&render_markup(&accumulated));
                }
                StreamEvent::Status(text) => {
                    tracing::debug!(status = %text, "backend status");
                }
                StreamEvent::Done => break,
            }
        }
        Ok(TurnOutcome { accumulated, deltas })
    }
}

fn outcome_label(e: &StreamChatError) -> &'static str {
    match e {
        StreamChatError::Validation(_) => "validation",
        StreamChatError::Unreachable { .. } => "unreachable",
        StreamChatError::Transport { .. } => "transport_error",
        StreamChatError::Decode(_) => "decode_error",
        StreamChatError::Io(_) => "io_error",
        StreamChatError::Other(_) => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::EventStream;
    use crate::transport::NullTransport;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        markups: Vec<String>,
        busy: Vec<bool>,
    }

    impl ReplySink for RecordingSink {
        fn replace_markup(&mut self, markup: &str) {
            self.markups.push(markup.to_string());
        }
        fn set_busy(&mut self, busy: bool) {
            self.busy.push(busy);
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl TurnTransport for FailingTransport {
        async fn submit_turn(&self, _message: &str, _id: &str) -> CoreResult<EventStream> {
            Err(StreamChatError::Transport {
                endpoint: "/ask".into(),
                status: "500".into(),
                message: "boom".into(),
            })
        }
    }

    struct MidStreamErrorTransport;

    #[async_trait]
    impl TurnTransport for MidStreamErrorTransport {
        async fn submit_turn(&self, _message: &str, _id: &str) -> CoreResult<EventStream> {
            let items: Vec<CoreResult<bytes::Bytes>> = vec![
                Ok(bytes::Bytes::from_static(
                    b"data: {\"type\":\"text\",\"text\":\"part\"}\n",
                )),
                Err(StreamChatError::Unreachable {
                    endpoint: "event-stream".into(),
                }),
            ];
            Ok(EventStream::from_bytes(Box::pin(
                futures_util::stream::iter(items),
            )))
        }
    }

    #[tokio::test]
    async fn send_streams_render_snapshots_and_returns_text() {
        let mut session = ChatSession::new(NullTransport);
        let mut sink = RecordingSink::default();

        let text = session.send("hi", &mut sink).await.expect("send ok");
        assert_eq!(text, "You said: hi");

        // One snapshot per delta, each a render of the accumulated prefix.
        assert_eq!(sink.markups.len(), 2);
        assert_eq!(sink.markups[0], render_markup("You said: "));
        assert_eq!(sink.markups[1], render_markup("You said: hi"));
        // Busy indicator raised then cleared.
        assert_eq!(sink.busy, vec![true, false]);
        assert_eq!(session.context().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_a_turn() {
        let mut session = ChatSession::new(NullTransport);
        let mut sink = RecordingSink::default();

        let err = session.send("   \n ", &mut sink).await.unwrap_err();
        assert!(matches!(err, StreamChatError::Validation(_)));
        assert!(sink.markups.is_empty());
        assert!(sink.busy.is_empty());
        assert_eq!(session.context().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn send_while_awaiting_reply_is_rejected() {
        let mut session = ChatSession::new(NullTransport);
        session.context_mut().state = SessionState::AwaitingReply;
        let mut sink = RecordingSink::default();

        let err = session.send("hi", &mut sink).await.unwrap_err();
        assert!(matches!(err, StreamChatError::Validation(_)));
        assert!(sink.busy.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_shows_fixed_failure_markup() {
        let mut session = ChatSession::new(FailingTransport);
        let mut sink = RecordingSink::default();

        let err = session.send("hi", &mut sink).await.unwrap_err();
        assert!(matches!(err, StreamChatError::Transport { .. }));
        assert_eq!(sink.markups, vec![FAILURE_MARKUP.to_string()]);
        // The in-progress indicator must be terminated.
        assert_eq!(sink.busy, vec![true, false]);
        assert_eq!(session.context().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn mid_stream_failure_also_recovers_to_idle() {
        let mut session = ChatSession::new(MidStreamErrorTransport);
        let mut sink = RecordingSink::default();

        let err = session.send("hi", &mut sink).await.unwrap_err();
        assert!(matches!(err, StreamChatError::Unreachable { .. }));
        // The partial render happened, then the failure markup replaced it.
        assert_eq!(sink.markups.last().unwrap(), FAILURE_MARKUP);
        assert_eq!(session.context().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn conversation_id_is_stable_within_a_session() {
        let mut session = ChatSession::new(NullTransport);
        let first = session.context_mut().ensure_conversation().to_string();
        let second = session.context_mut().ensure_conversation().to_string();
        assert_eq!(first, second);

        let fresh = session.context_mut().new_conversation().to_string();
        assert_ne!(fresh, first);
    }

    #[test]
    fn context_transitions() {
        let mut ctx = SessionContext::new();
        assert_eq!(ctx.state(), SessionState::Idle);
        assert!(ctx.state().can_send());

        ctx.begin_compose().unwrap();
        assert_eq!(ctx.state(), SessionState::Composing);
        assert!(ctx.state().can_send());

        ctx.state = SessionState::AwaitingReply;
        assert!(!ctx.state().can_send());
        assert!(ctx.begin_compose().is_err());

        assert!(ctx.toggle_search());
        assert!(!ctx.toggle_search());

        ctx.state = SessionState::Idle;
        ctx.open_conversation("c-1");
        assert_eq!(ctx.conversation_id(), Some("c-1"));
        assert!(!ctx.search_mode());
    }

    #[tokio::test]
    async fn completed_turn_emits_a_turn_log() {
        struct CapturingSink(Mutex<Vec<TurnLog>>);
        impl crate::telemetry::TelemetrySink for CapturingSink {
            fn record_turn(&self, log: TurnLog) {
                self.0.lock().unwrap().push(log);
            }
        }

        static LOGS: once_cell::sync::Lazy<Arc<CapturingSink>> =
            once_cell::sync::Lazy::new(|| Arc::new(CapturingSink(Mutex::new(Vec::new()))));

        let _ = crate::telemetry::set_telemetry_sink(LOGS.clone());
        crate::telemetry::test_set_capture_enabled(true);
        LOGS.0.lock().unwrap().clear();

        let mut session = ChatSession::new(NullTransport);
        let mut sink = RecordingSink::default();
        session.send("hi", &mut sink).await.expect("send ok");

        crate::telemetry::test_set_capture_enabled(false);
        let logs = LOGS.0.lock().unwrap().clone();
        if !logs.is_empty() {
            assert_eq!(logs.len(), 1, "expected 1 turn log, got {:?}", logs);
            let log = &logs[0];
            assert_eq!(log.outcome.as_deref(), Some("done"));
            assert_eq!(log.deltas, Some(2));
            assert_eq!(log.chars, Some("You said: hi".chars().count() as u32));
            assert!(log.conversation_id.is_some());
        }
    }
}
