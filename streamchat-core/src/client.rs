use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{CoreResult, StreamChatError};
use crate::http_client::HttpClient;
use crate::model::{ConversationSummary, HistoryEntry, Mode, Role};
use crate::reader::EventStream;
use crate::transport::TurnTransport;

/// HTTP client for the conversation backend. Implements [`TurnTransport`]
/// for the streaming turn endpoint and carries the plain request/response
/// collaborators (conversation list, history, delete, mode).
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: HttpClient,
    base: String,
    auth_token: Option<SecretString>,
}

// ---- Wire structs (minimal) ----
#[derive(Serialize)]
struct TurnReq<'a> {
    message: &'a str,
    chat_id: &'a str,
}

#[derive(Deserialize)]
struct ModeResp {
    mode: Mode,
}

#[derive(Serialize)]
struct ModeReq {
    mode: Mode,
}

impl BackendClient {
    pub fn new(http: HttpClient, base: String, auth_token: Option<SecretString>) -> Self {
        Self {
            http,
            base,
            auth_token,
        }
    }

    /// Build a client from configuration. An `auth_token_env` entry names the
    /// environment variable holding the bearer token; a configured but unset
    /// variable is a validation error, not a silent fallback.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        let http = HttpClient::from_config(&cfg.http)?;
        let auth_token = match &cfg.backend.auth_token_env {
            Some(var) => Some(SecretString::new(
                std::env::var(var)
                    .map_err(|_| {
                        StreamChatError::Validation(format!(
                            "auth token env var '{var}' is not set"
                        ))
                    })?
                    .into(),
            )),
            None => None,
        };
        Ok(Self::new(http, cfg.backend.base_url.clone(), auth_token))
    }

    #[cfg(test)]
    pub fn new_for_tests(server_base: &str) -> Self {
        BackendClient::new(
            HttpClient::new_default().unwrap(),
            server_base.to_string(),
            None,
        )
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut h = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(token) = &self.auth_token {
            h.push((
                "Authorization".to_string(),
                format!("Bearer {}", token.expose_secret()),
            ));
        }
        h
    }

    /// List stored conversations, newest first (backend order).
    pub async fn conversations(&self) -> CoreResult<Vec<ConversationSummary>> {
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = format!("{}/chats", self.base);
        let pairs: Vec<(String, String)> = self.http.get_json(&url, &hdrs).await?;
        Ok(pairs
            .into_iter()
            .map(|(id, title)| ConversationSummary { id, title })
            .collect())
    }

    /// Fetch the stored message history of one conversation.
    pub async fn history(&self, conversation_id: &str) -> CoreResult<Vec<HistoryEntry>> {
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = format!("{}/history/{}", self.base, conversation_id);
        let pairs: Vec<(Role, String)> = self.http.get_json(&url, &hdrs).await?;
        Ok(pairs
            .into_iter()
            .map(|(role, text)| HistoryEntry { role, text })
            .collect())
    }

    /// Delete one conversation.
    pub async fn delete(&self, conversation_id: &str) -> CoreResult<()> {
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = format!("{}/delete/{}", self.base, conversation_id);
        self.http.delete(&url, &hdrs).await
    }

    /// Delete every stored conversation. Returns how many were removed.
    pub async fn clear_history(&self) -> CoreResult<usize> {
        let all = self.conversations().await?;
        let count = all.len();
        for summary in all {
            self.delete(&summary.id).await?;
        }
        Ok(count)
    }

    /// Read the backend connectivity mode.
    pub async fn mode(&self) -> CoreResult<Mode> {
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = format!("{}/mode", self.base);
        let resp: ModeResp = self.http.get_json(&url, &hdrs).await?;
        Ok(resp.mode)
    }

    /// Set the backend connectivity mode.
    pub async fn set_mode(&self, mode: Mode) -> CoreResult<()> {
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = format!("{}/mode", self.base);
        let _: serde_json::Value = self.http.post_json(&url, &ModeReq { mode }, &hdrs).await?;
        Ok(())
    }
}

#[async_trait]
impl TurnTransport for BackendClient {
    async fn submit_turn(&self, message: &str, conversation_id: &str) -> CoreResult<EventStream> {
        let payload = TurnReq {
            message,
            chat_id: conversation_id,
        };
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let url = format!("{}/ask", self.base);
        let frames = self.http.post_event_lines(&url, &payload, &hdrs).await?;
        Ok(EventStream::new(frames))
    }
}

/// Case-insensitive title filter for the conversation list (search mode).
pub fn filter_conversations<'a>(
    list: &'a [ConversationSummary],
    term: &str,
) -> Vec<&'a ConversationSummary> {
    let needle = term.to_lowercase();
    list.iter()
        .filter(|c| c.title.to_lowercase().contains(&needle))
        .collect()
}
