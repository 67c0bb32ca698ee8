use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BackendCfg {
    /// Base URL of the conversation backend, e.g. "http://127.0.0.1:5000".
    pub base_url: String,
    /// Name of the environment variable that contains an optional bearer
    /// token. Absent means the backend is unauthenticated.
    #[serde(default)]
    pub auth_token_env: Option<String>,
}

impl Default for BackendCfg {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token_env: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms). Applies to
    /// plain request/response calls; streamed replies are exempted by the
    /// client when it opens the event stream.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendCfg,
    /// HTTP client configuration (timeouts, pooling). Missing in older configs → defaults.
    #[serde(default)]
    pub http: HttpCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::error::CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(crate::error::StreamChatError::from)?;
        let s = std::str::from_utf8(&bytes)
            .map_err(|e| crate::error::StreamChatError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::StreamChatError::Other(e.into()))?,
            Some("toml") => toml::from_str::<Self>(s)
                .map_err(|e| crate::error::StreamChatError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| crate::error::StreamChatError::Other(e.into()))
                .or_else(|_| {
                    toml::from_str::<Self>(s)
                        .map_err(|e| crate::error::StreamChatError::Other(e.into()))
                })?,
        };
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_from_json() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("streamchat.json");
        let json = r#"{
          "backend": {
            "base_url": "http://chat.internal:8080",
            "auth_token_env": "STREAMCHAT_TOKEN"
          }
        }"#;
        fs::write(&file, json).unwrap();
        let cfg = Config::from_path(&file).unwrap();
        assert_eq!(cfg.backend.base_url, "http://chat.internal:8080");
        assert_eq!(
            cfg.backend.auth_token_env.as_deref(),
            Some("STREAMCHAT_TOKEN")
        );
        assert_eq!(cfg.http.connect_timeout_ms, 5_000);
        assert_eq!(cfg.http.request_timeout_ms, 60_000);
        assert_eq!(cfg.http.pool_max_idle_per_host, None);
    }

    #[test]
    fn load_from_toml() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("streamchat.toml");
        let toml = r#"
[backend]
base_url = "http://127.0.0.1:5000"

[http]
connect_timeout_ms = 1000
"#;
        fs::write(&file, toml).unwrap();
        let cfg = Config::from_path(&file).unwrap();
        assert_eq!(cfg.backend.base_url, "http://127.0.0.1:5000");
        assert_eq!(cfg.backend.auth_token_env, None);
        assert_eq!(cfg.http.connect_timeout_ms, 1_000);
        assert_eq!(cfg.http.request_timeout_ms, 60_000);
    }

    #[test]
    fn defaults_are_usable() {
        let cfg = Config::default();
        assert_eq!(cfg.backend.base_url, "http://127.0.0.1:5000");
        assert_eq!(cfg.http.connect_timeout_ms, 5_000);
    }

    #[test]
    fn missing_file_returns_io_error() {
        let missing = std::path::PathBuf::from("/definitely/not/here/streamchat-missing.json");
        let err = Config::from_path(&missing).unwrap_err();
        match err {
            crate::error::StreamChatError::Io(_) => {}
            other => panic!("expected Io error, got: {:?}", other),
        }
    }

    #[test]
    fn bad_utf8_returns_other_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.bin");
        let bytes = vec![0xff, 0xfe, 0xfd, 0x00, 0x80];
        fs::write(&file, bytes).unwrap();
        let err = Config::from_path(&file).unwrap_err();
        match err {
            crate::error::StreamChatError::Other(_) => {}
            other => panic!("expected Other(utf8) error, got: {:?}", other),
        }
    }

    #[test]
    fn bad_json_returns_other_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.json");
        let json = r#"{ "backend": { "base_url": 123 }"#; // missing closing }
        fs::write(&file, json).unwrap();
        let err = Config::from_path(&file).unwrap_err();
        match err {
            crate::error::StreamChatError::Other(_) => {}
            other => panic!("expected Other(json parse) error, got: {:?}", other),
        }
    }

    #[test]
    fn unknown_extension_falls_back_to_json_then_toml() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("streamchat.conf");
        let json = r#"{"backend":{"base_url":"http://a:1"}}"#;
        fs::write(&json_path, json).unwrap();
        let cfg_json_first = Config::from_path(&json_path).unwrap();
        assert_eq!(cfg_json_first.backend.base_url, "http://a:1");

        let toml_path = dir.path().join("streamchat2.conf");
        let toml = r#"
[backend]
base_url = "http://b:2"
"#;
        fs::write(&toml_path, toml).unwrap();
        let cfg_toml_fallback = Config::from_path(&toml_path).unwrap();
        assert_eq!(cfg_toml_fallback.backend.base_url, "http://b:2");
    }
}
