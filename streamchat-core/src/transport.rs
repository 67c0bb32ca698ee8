use async_trait::async_trait;

use crate::error::CoreResult;
use crate::reader::EventStream;

/// The single collaborator interface the streaming core depends on: submit
/// one conversation turn and receive the reply as an event stream.
///
/// Implementations must fail fast (before producing any event) when the
/// initiating call does not succeed.
#[async_trait]
pub trait TurnTransport: Send + Sync {
    async fn submit_turn(&self, message: &str, conversation_id: &str) -> CoreResult<EventStream>;
}

/// A canned transport that replies with a fixed event sequence. Useful for
/// tests and offline smoke runs.
pub struct NullTransport;

#[async_trait]
impl TurnTransport for NullTransport {
    async fn submit_turn(&self, message: &str, _conversation_id: &str) -> CoreResult<EventStream> {
        let frames = format!(
            concat!(
                "data: {{\"type\":\"status\",\"text\":\"echoing\"}}\n\n",
                "data: {{\"type\":\"text\",\"text\":\"You said: \"}}\n\n",
                "data: {}\n\n",
                "data: {{\"type\":\"done\"}}\n\n",
            ),
            serde_json::json!({ "type": "text", "text": message })
        );
        let chunks: Vec<CoreResult<bytes::Bytes>> = vec![Ok(bytes::Bytes::from(frames))];
        Ok(EventStream::from_bytes(Box::pin(
            futures_util::stream::iter(chunks),
        )))
    }
}

/// Drain helper used by tests: collect every event until the stream ends.
#[cfg(test)]
pub async fn collect_events(mut stream: EventStream) -> Vec<crate::event::StreamEvent> {
    use futures_util::StreamExt;
    let mut events = Vec::new();
    while let Some(ev) = stream.next().await {
        events.push(ev.expect("canned streams never fail"));
    }
    events
}
