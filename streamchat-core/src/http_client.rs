use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::HttpCfg;
use crate::error::{CoreResult, StreamChatError};
use crate::reader::{FrameStream, LineStream};

/// Thin wrapper around reqwest::Client with defaults and helpers.
///
/// The request timeout is applied per call so that plain request/response
/// calls are bounded while a streamed reply can stay open as long as the
/// backend keeps sending.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
    request_timeout: Duration,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::from_config(&HttpCfg::default())
    }

    pub fn from_config(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms));
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| StreamChatError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: "streamchat/0.1".to_string(),
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
        })
    }

    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<R> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .timeout(self.request_timeout)
            .header("User-Agent", &self.user_agent);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|_e| StreamChatError::Unreachable {
            endpoint: url.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(url, status, &text));
        }

        resp.json::<R>().await.map_err(|e| StreamChatError::Transport {
            endpoint: url.to_string(),
            status: status.as_u16().to_string(),
            message: format!("json decode error: {e}"),
        })
    }

    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> CoreResult<R> {
        let mut req = self
            .inner
            .get(url)
            .timeout(self.request_timeout)
            .header("User-Agent", &self.user_agent);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|_e| StreamChatError::Unreachable {
            endpoint: url.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(url, status, &text));
        }

        resp.json::<R>().await.map_err(|e| StreamChatError::Transport {
            endpoint: url.to_string(),
            status: status.as_u16().to_string(),
            message: format!("json decode error: {e}"),
        })
    }

    pub async fn delete(&self, url: &str, headers: &[(&str, &str)]) -> CoreResult<()> {
        let mut req = self
            .inner
            .delete(url)
            .timeout(self.request_timeout)
            .header("User-Agent", &self.user_agent);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|_e| StreamChatError::Unreachable {
            endpoint: url.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(url, status, &text));
        }
        Ok(())
    }

    /// POST JSON and return the response body as a stream of frame lines.
    /// Each yielded item is one raw line (trim not applied) of the framed
    /// reply channel. Fails fast with `Transport` on a non-success status,
    /// before any frame is produced.
    pub async fn post_event_lines<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<FrameStream> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|_| StreamChatError::Unreachable {
            endpoint: url.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_http_error(url, status, &body));
        }

        // Stream body as bytes and split on '\n'
        let endpoint = url.to_string();
        let byte_stream = resp.bytes_stream().map(move |chunk| {
            chunk.map_err(|_e| StreamChatError::Unreachable {
                endpoint: endpoint.clone(),
            })
        });
        let line_stream = LineStream::new(Box::pin(byte_stream));
        Ok(Box::pin(line_stream))
    }
}

fn map_http_error(endpoint: &str, status: StatusCode, body: &str) -> StreamChatError {
    StreamChatError::Transport {
        endpoint: endpoint.to_string(),
        status: status.as_u16().to_string(),
        message: truncate(body, 300),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut t = s[..end].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{DELETE, POST};
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn post_json_success() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(200).json_body(json!({"ok": true}));
        });

        #[derive(serde::Deserialize)]
        struct Resp {
            ok: bool,
        }

        let client = HttpClient::new_default().unwrap();
        let resp: Resp = client
            .post_json(&format!("{}/ask", server.base_url()), &json!({"msg":"hi"}), &[])
            .await
            .unwrap();

        assert!(resp.ok);
        m.assert();
    }

    #[tokio::test]
    async fn non_success_maps_to_transport() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(503).body("down");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                &format!("{}/ask", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            StreamChatError::Transport { status, message, .. } => {
                assert_eq!(status, "503");
                assert_eq!(message, "down");
            }
            other => panic!("expected Transport, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_body_is_truncated() {
        let server = MockServer::start();
        let big = "x".repeat(1000);
        let _m = server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(400).body(big.clone());
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                &format!("{}/ask", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            StreamChatError::Transport { message, .. } => {
                assert!(message.ends_with("..."));
                assert!(message.len() <= 303); // "..." after 300 chars
            }
            other => panic!("expected Transport, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn bad_json_on_success_maps_to_transport() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(200).body("not-json");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                &format!("{}/ask", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
            )
            .await
            .unwrap_err();
        match err {
            StreamChatError::Transport { status, message, .. } => {
                assert_eq!(status, "200");
                assert!(message.starts_with("json decode error"));
            }
            other => panic!("expected Transport, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn network_error_maps_to_unreachable() {
        // Attempt to connect to a likely-closed port to simulate network error quickly.
        let client = HttpClient::new_default().expect("client");
        let url = "http://127.0.0.1:9/ask"; // port 9 (discard) is typically closed
        let err = client
            .post_json::<_, serde_json::Value>(url, &json!({"msg":"hi"}), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StreamChatError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn delete_succeeds_on_2xx() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(DELETE).path("/delete/abc");
            then.status(200).json_body(json!({"status": "ok"}));
        });
        let client = HttpClient::new_default().unwrap();
        client
            .delete(&format!("{}/delete/abc", server.base_url()), &[])
            .await
            .unwrap();
        m.assert();
    }

    #[tokio::test]
    async fn event_lines_fail_fast_on_non_success() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(500).body("boom");
        });
        let client = HttpClient::new_default().unwrap();
        let err = match client
            .post_event_lines(&format!("{}/ask", server.base_url()), &json!({}), &[])
            .await
        {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, StreamChatError::Transport { .. }));
    }

    #[tokio::test]
    async fn event_lines_split_frames() {
        use futures_util::StreamExt;

        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/ask");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: one\n\ndata: two\n");
        });
        let client = HttpClient::new_default().unwrap();
        let lines: Vec<String> = client
            .post_event_lines(&format!("{}/ask", server.base_url()), &json!({}), &[])
            .await
            .unwrap()
            .map(|r| r.unwrap().line)
            .collect()
            .await;
        assert_eq!(lines, vec!["data: one", "", "data: two"]);
    }
}
