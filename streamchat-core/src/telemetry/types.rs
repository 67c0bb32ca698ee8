use serde::Serialize;

/// Structured record of one completed (or failed) conversation turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnLog {
    pub conversation_id: Option<String>,
    /// Number of text deltas received before the stream ended.
    pub deltas: Option<u32>,
    /// Length of the accumulated reply, in chars.
    pub chars: Option<u32>,
    pub latency_ms: Option<u64>,

    /// "done" for a normal stream end, an error label otherwise.
    pub outcome: Option<String>,
    pub error_message: Option<String>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn conversation_id(mut self, v: &str) -> Self {
        self.conversation_id = Some(v.to_string());
        self
    }
    pub fn deltas(mut self, v: u32) -> Self {
        self.deltas = Some(v);
        self
    }
    pub fn chars(mut self, v: u32) -> Self {
        self.chars = Some(v);
        self
    }
    pub fn latency_ms(mut self, v: u64) -> Self {
        self.latency_ms = Some(v);
        self
    }
    pub fn outcome(mut self, v: &str) -> Self {
        self.outcome = Some(v.to_string());
        self
    }
    pub fn error_message_opt(mut self, v: Option<&str>) -> Self {
        self.error_message = v.map(|s| s.to_string());
        self
    }
}
